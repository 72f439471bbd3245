//! One-time population of the ingredient catalog.
//!
//! A [`SeedCoordinator`] is created once by whoever assembles the application
//! and shared (behind an `Arc`) with every caller that may trigger seeding.
//! The first caller to claim it runs the seed; everyone else returns at once.

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogLoader, CatalogOrigin, entry_to_ingredient};
use crate::db::Database;
use crate::models::{Language, validate_new_ingredient};
use crate::service::{NutritionLookupProvider, refresh_nutrition};

pub const SEED_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedPhase {
    #[default]
    NotStarted,
    Started,
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SeedOutcome {
    /// A previous attempt through this coordinator already finished.
    AlreadyCompleted,
    /// Another caller is seeding right now.
    Skipped,
    /// The catalog had rows after duplicate cleanup; nothing was inserted.
    AlreadySeeded { duplicates_removed: usize },
    Seeded {
        inserted: usize,
        duplicates_removed: usize,
        origin: CatalogOrigin,
    },
    /// The attempt failed and was rolled back. It is not retried.
    Failed,
}

#[derive(Debug, Default)]
pub struct SeedCoordinator {
    phase: Mutex<SeedPhase>,
}

/// Marks the coordinator completed however the claimant's attempt ends.
struct CompleteOnDrop<'a>(&'a SeedCoordinator);

impl Drop for CompleteOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.lock() = SeedPhase::Completed;
    }
}

impl SeedCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> SeedPhase {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, SeedPhase> {
        // The guarded value is a plain enum, so a poisoned lock is still usable.
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed the catalog unless this coordinator has already done so or is
    /// doing so on another thread. Never returns an error: failures are
    /// logged and reported as [`SeedOutcome::Failed`].
    pub fn seed(
        &self,
        db: &Database,
        language: Language,
        loader: &CatalogLoader,
        verifier: Option<&dyn NutritionLookupProvider>,
    ) -> SeedOutcome {
        {
            let mut phase = self.lock();
            match *phase {
                SeedPhase::Completed => return SeedOutcome::AlreadyCompleted,
                SeedPhase::Started => {
                    debug!("Catalog seeding already in progress, skipping");
                    return SeedOutcome::Skipped;
                }
                SeedPhase::NotStarted => *phase = SeedPhase::Started,
            }
        }

        let _complete = CompleteOnDrop(self);
        match run_seed(db, language, loader, verifier) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Ingredient catalog seeding failed: {e:#}");
                SeedOutcome::Failed
            }
        }
    }
}

fn run_seed(
    db: &Database,
    language: Language,
    loader: &CatalogLoader,
    verifier: Option<&dyn NutritionLookupProvider>,
) -> Result<SeedOutcome> {
    db.with_transaction(|db| {
        let duplicates_removed = db.remove_duplicate_catalog_ingredients()?;
        if duplicates_removed > 0 {
            info!(duplicates_removed, "Removed duplicate catalog ingredients");
        }

        let existing = db.count_ingredients()?;
        if existing > 0 {
            debug!(existing, "Ingredients already present, not seeding");
            return Ok(SeedOutcome::AlreadySeeded { duplicates_removed });
        }

        let catalog = loader.load();
        info!(
            origin = %catalog.origin,
            entries = catalog.entries.len(),
            %language,
            "Seeding ingredient catalog"
        );

        let mut rows = Vec::with_capacity(catalog.entries.len());
        for entry in &catalog.entries {
            let mut ingredient = entry_to_ingredient(entry, language);
            if let Some(provider) = verifier {
                if refresh_nutrition(provider, &ingredient.name, &mut ingredient.nutrition) {
                    debug!(name = %ingredient.name, "Nutrition updated from lookup");
                }
            }
            if let Err(e) = validate_new_ingredient(&ingredient) {
                warn!("Skipping catalog entry '{}': {e:#}", ingredient.name);
                continue;
            }
            rows.push(ingredient);
        }

        let mut inserted = 0;
        for (n, batch) in rows.chunks(SEED_BATCH_SIZE).enumerate() {
            inserted += db.insert_catalog_batch(batch)?;
            debug!(batch = n + 1, inserted, total = rows.len(), "Inserted catalog batch");
        }

        info!(inserted, "Ingredient catalog seeded");
        Ok(SeedOutcome::Seeded {
            inserted,
            duplicates_removed,
            origin: catalog.origin,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewIngredient, NewRecipe, Nutrition, Unit};
    use crate::openfoodfacts::NutritionFacts;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::path::PathBuf;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn catalog_file(dir: &std::path::Path, names: &[&str]) -> PathBuf {
        let entries: Vec<serde_json::Value> = names
            .iter()
            .map(|n| serde_json::json!({ "name_en": n, "calories": 10 }))
            .collect();
        let path = dir.join("ingredients.json");
        std::fs::write(&path, serde_json::to_string(&entries).unwrap()).unwrap();
        path
    }

    fn embedded_count() -> usize {
        CatalogLoader::new().load().entries.len()
    }

    fn duplicate(name: &str) -> NewIngredient {
        NewIngredient {
            name: name.to_string(),
            quantity: 100.0,
            unit: Unit::Gram,
            recipe_id: None,
            nutrition: Nutrition::new(52.0, 0.3, 0.2, 13.8),
            unit_weight: None,
        }
    }

    struct FixedProvider(NutritionFacts);

    impl NutritionLookupProvider for FixedProvider {
        fn lookup_nutrition(&self, _name: &str) -> Result<Option<NutritionFacts>> {
            Ok(Some(self.0))
        }
    }

    struct PanickingProvider;

    impl NutritionLookupProvider for PanickingProvider {
        fn lookup_nutrition(&self, _name: &str) -> Result<Option<NutritionFacts>> {
            panic!("lookup exploded");
        }
    }

    #[test]
    fn test_seed_empty_database() {
        let db = Database::open_in_memory().unwrap();
        let coordinator = SeedCoordinator::new();
        assert_eq!(coordinator.phase(), SeedPhase::NotStarted);

        let outcome = coordinator.seed(&db, Language::English, &CatalogLoader::new(), None);
        let expected = embedded_count();
        assert_eq!(
            outcome,
            SeedOutcome::Seeded {
                inserted: expected,
                duplicates_removed: 0,
                origin: CatalogOrigin::Embedded,
            }
        );
        assert_eq!(db.count_catalog_ingredients().unwrap(), expected as i64);
        assert_eq!(coordinator.phase(), SeedPhase::Completed);
    }

    #[test]
    fn test_seed_uses_language_and_normalizes_pieces() {
        let db = Database::open_in_memory().unwrap();
        SeedCoordinator::new().seed(&db, Language::Polish, &CatalogLoader::new(), None);

        let egg = db.find_catalog_ingredient("Jajko").unwrap().unwrap();
        assert_eq!(egg.unit, Unit::Piece);
        assert_eq!(egg.unit_weight, Some(50.0));
        // 77.5 kcal per 50 g egg
        assert!((egg.nutrition.calories - 155.0).abs() < 0.01);

        let tomato = db.find_catalog_ingredient("Pomidor").unwrap().unwrap();
        assert_eq!(tomato.unit, Unit::Gram);
        assert!(tomato.unit_weight.is_none());
        assert!(db.find_catalog_ingredient("Tomato").unwrap().is_none());
    }

    #[test]
    fn test_second_call_same_coordinator_is_noop() {
        let db = Database::open_in_memory().unwrap();
        let coordinator = SeedCoordinator::new();
        coordinator.seed(&db, Language::English, &CatalogLoader::new(), None);
        let count = db.count_catalog_ingredients().unwrap();

        let outcome = coordinator.seed(&db, Language::English, &CatalogLoader::new(), None);
        assert_eq!(outcome, SeedOutcome::AlreadyCompleted);
        assert_eq!(db.count_catalog_ingredients().unwrap(), count);
    }

    #[test]
    fn test_new_coordinator_on_seeded_database_inserts_nothing() {
        let db = Database::open_in_memory().unwrap();
        SeedCoordinator::new().seed(&db, Language::English, &CatalogLoader::new(), None);
        let count = db.count_catalog_ingredients().unwrap();

        let outcome = SeedCoordinator::new().seed(&db, Language::German, &CatalogLoader::new(), None);
        assert_eq!(outcome, SeedOutcome::AlreadySeeded { duplicates_removed: 0 });
        assert_eq!(db.count_catalog_ingredients().unwrap(), count);
    }

    #[test]
    fn test_recipe_owned_row_alone_blocks_seeding() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db
            .create_recipe(&NewRecipe {
                name: "Soup".to_string(),
                description: String::new(),
                folder_id: None,
            })
            .unwrap();
        let mut carrot = duplicate("Carrot");
        carrot.recipe_id = Some(recipe.id);
        db.insert_ingredient(&carrot).unwrap();

        let outcome = SeedCoordinator::new().seed(&db, Language::English, &CatalogLoader::new(), None);
        assert_eq!(outcome, SeedOutcome::AlreadySeeded { duplicates_removed: 0 });
        assert_eq!(db.count_catalog_ingredients().unwrap(), 0);
        assert_eq!(db.count_ingredients().unwrap(), 1);
    }

    #[test]
    fn test_duplicates_removed_before_existence_check() {
        let db = Database::open_in_memory().unwrap();
        let keep = db.insert_ingredient(&duplicate("Apple")).unwrap();
        db.insert_ingredient(&duplicate("Apple")).unwrap();
        db.insert_ingredient(&duplicate("Apple")).unwrap();

        let outcome = SeedCoordinator::new().seed(&db, Language::English, &CatalogLoader::new(), None);
        assert_eq!(outcome, SeedOutcome::AlreadySeeded { duplicates_removed: 2 });

        let rows = db.list_catalog_ingredients(None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, keep.id);
    }

    #[test]
    fn test_seed_falls_back_to_builtin() {
        let db = Database::open_in_memory().unwrap();
        let loader = CatalogLoader::new().without_embedded();
        let outcome = SeedCoordinator::new().seed(&db, Language::Korean, &loader, None);
        let SeedOutcome::Seeded { inserted, origin, .. } = outcome else {
            panic!("expected Seeded, got {outcome:?}");
        };
        assert_eq!(origin, CatalogOrigin::BuiltIn);
        assert!(inserted > 0);
        // No Korean names in the built-in list, English wins
        assert!(db.find_catalog_ingredient("Tomato").unwrap().is_some());
    }

    #[test]
    fn test_seed_inserts_in_batches() {
        let dir = tempfile::tempdir().unwrap();
        let names: Vec<String> = (0..123).map(|i| format!("Item {i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let loader = CatalogLoader::new()
            .without_embedded()
            .with_package_asset(catalog_file(dir.path(), &refs));

        let db = Database::open_in_memory().unwrap();
        let outcome = SeedCoordinator::new().seed(&db, Language::English, &loader, None);
        assert!(matches!(outcome, SeedOutcome::Seeded { inserted: 123, .. }));
        assert_eq!(db.count_catalog_ingredients().unwrap(), 123);
    }

    #[test]
    fn test_seed_skips_invalid_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingredients.json");
        std::fs::write(
            &path,
            r#"[{"name_en": "Good"}, {"name_en": "Bad", "calories": -5}]"#,
        )
        .unwrap();
        let loader = CatalogLoader::new().without_embedded().with_package_asset(path);

        let db = Database::open_in_memory().unwrap();
        let outcome = SeedCoordinator::new().seed(&db, Language::English, &loader, None);
        assert!(matches!(outcome, SeedOutcome::Seeded { inserted: 1, .. }));
    }

    #[test]
    fn test_failure_rolls_back_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let mut names: Vec<String> = (0..60).map(|i| format!("Item {i}")).collect();
        names[55] = "Boom".to_string();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let loader = CatalogLoader::new()
            .without_embedded()
            .with_package_asset(catalog_file(dir.path(), &refs));

        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute_batch(
                "CREATE TRIGGER fail_on_boom BEFORE INSERT ON ingredients
                 WHEN NEW.name = 'Boom'
                 BEGIN SELECT RAISE(ABORT, 'boom'); END;",
            )
            .unwrap();

        let coordinator = SeedCoordinator::new();
        let outcome = coordinator.seed(&db, Language::English, &loader, None);
        assert_eq!(outcome, SeedOutcome::Failed);
        // The first batch of 50 went in before the failure and was rolled back
        assert_eq!(db.count_catalog_ingredients().unwrap(), 0);
        assert_eq!(coordinator.phase(), SeedPhase::Completed);

        // No retry through the same coordinator
        let again = coordinator.seed(&db, Language::English, &loader, None);
        assert_eq!(again, SeedOutcome::AlreadyCompleted);
    }

    #[test]
    fn test_panic_still_completes() {
        let db = Database::open_in_memory().unwrap();
        let coordinator = SeedCoordinator::new();
        let result = catch_unwind(AssertUnwindSafe(|| {
            coordinator.seed(
                &db,
                Language::English,
                &CatalogLoader::new(),
                Some(&PanickingProvider),
            )
        }));
        assert!(result.is_err());
        assert_eq!(coordinator.phase(), SeedPhase::Completed);
        assert_eq!(db.count_catalog_ingredients().unwrap(), 0);
    }

    #[test]
    fn test_seed_with_verifier_updates_nutrition() {
        let db = Database::open_in_memory().unwrap();
        let provider = FixedProvider(NutritionFacts {
            calories: Some(999.0),
            ..NutritionFacts::default()
        });
        SeedCoordinator::new().seed(
            &db,
            Language::English,
            &CatalogLoader::new(),
            Some(&provider),
        );
        let rows = db.list_catalog_ingredients(None).unwrap();
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|r| (r.nutrition.calories - 999.0).abs() < 1e-9));
    }

    #[test]
    fn test_concurrent_seed_inserts_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("larder.db");
        // Run migrations up front so both threads only race on seeding
        drop(Database::open(&path).unwrap());

        let coordinator = Arc::new(SeedCoordinator::new());
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                let barrier = Arc::clone(&barrier);
                let path = path.clone();
                thread::spawn(move || {
                    let db = Database::open(&path).unwrap();
                    barrier.wait();
                    coordinator.seed(&db, Language::English, &CatalogLoader::new(), None)
                })
            })
            .collect();
        let outcomes: Vec<SeedOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let seeded = outcomes
            .iter()
            .filter(|o| matches!(o, SeedOutcome::Seeded { .. }))
            .count();
        assert_eq!(seeded, 1, "outcomes: {outcomes:?}");
        assert!(outcomes.iter().all(|o| matches!(
            o,
            SeedOutcome::Seeded { .. } | SeedOutcome::Skipped | SeedOutcome::AlreadyCompleted
        )));

        let db = Database::open(&path).unwrap();
        assert_eq!(db.count_catalog_ingredients().unwrap(), embedded_count() as i64);
    }
}
