use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::CatalogLoader;
use crate::db::Database;
use crate::models::{
    ConsolidatedIngredient, Ingredient, Language, NewIngredient, NewRecipe, Nutrition, Plan,
    PlannedMealDetail, RecipeDetail, ShoppingListItem, Unit,
};
use crate::openfoodfacts::{NutritionFacts, apply_nutrition};
use crate::seed::{SeedCoordinator, SeedOutcome};
use crate::shopping::{build_shopping_list, merge_saved_state};

/// Online nutrition source, implemented by the front end (the CLI uses reqwest).
/// Called synchronously.
pub trait NutritionLookupProvider: Send + Sync {
    fn lookup_nutrition(&self, name: &str) -> Result<Option<NutritionFacts>>;
}

/// Look `name` up and fold the result into `nutrition`. Never fails: lookup
/// errors and missing data leave `nutrition` alone and return `false`.
pub fn refresh_nutrition(
    provider: &dyn NutritionLookupProvider,
    name: &str,
    nutrition: &mut Nutrition,
) -> bool {
    match provider.lookup_nutrition(name) {
        Ok(Some(facts)) => apply_nutrition(&facts, nutrition),
        Ok(None) => {
            debug!(name, "No nutrition data found");
            false
        }
        Err(e) => {
            warn!("Nutrition lookup for '{name}' failed: {e:#}");
            false
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedIngredient {
    pub ingredient: Ingredient,
    pub updated: bool,
}

/// An ingredient line parsed from an imported recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedIngredient {
    pub name: String,
    pub quantity: f64,
    pub unit: Unit,
}

pub struct LarderService {
    db: Database,
    seeder: Arc<SeedCoordinator>,
}

impl LarderService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self::with_coordinator(db, Arc::new(SeedCoordinator::new())))
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::with_coordinator(db, Arc::new(SeedCoordinator::new())))
    }

    /// Build a service around an existing connection, sharing `seeder` with
    /// other services that use the same database file.
    #[must_use]
    pub fn with_coordinator(db: Database, seeder: Arc<SeedCoordinator>) -> Self {
        Self { db, seeder }
    }

    #[must_use]
    pub fn db(&self) -> &Database {
        &self.db
    }

    // --- Catalog ---

    pub fn seed_catalog(
        &self,
        language: Language,
        loader: &CatalogLoader,
        verifier: Option<&dyn NutritionLookupProvider>,
    ) -> SeedOutcome {
        self.seeder.seed(&self.db, language, loader, verifier)
    }

    pub fn dedupe_catalog(&self) -> Result<usize> {
        self.db.remove_duplicate_catalog_ingredients()
    }

    /// Check one ingredient against the online source and store any change.
    pub fn verify_ingredient(
        &self,
        provider: &dyn NutritionLookupProvider,
        id: i64,
    ) -> Result<VerifiedIngredient> {
        let ingredient = self.db.get_ingredient(id)?;
        let mut nutrition = ingredient.nutrition;
        if !refresh_nutrition(provider, &ingredient.name, &mut nutrition) {
            return Ok(VerifiedIngredient {
                ingredient,
                updated: false,
            });
        }
        let ingredient = self.db.update_ingredient_nutrition(id, &nutrition)?;
        Ok(VerifiedIngredient {
            ingredient,
            updated: true,
        })
    }

    // --- Recipes ---

    /// Add a catalog ingredient to a recipe, copying its nutrition.
    pub fn add_catalog_ingredient(
        &self,
        recipe_id: i64,
        name: &str,
        quantity: f64,
        unit: Unit,
    ) -> Result<Ingredient> {
        let source = self
            .db
            .find_catalog_ingredient(name)?
            .with_context(|| format!("Ingredient '{name}' is not in the catalog"))?;
        if !source.accepts_unit(unit) {
            bail!(
                "'{}' is measured in {}; it cannot be added in {unit} without a unit weight",
                source.name,
                source.unit
            );
        }
        self.db.insert_ingredient(&NewIngredient::from_catalog(
            &source, recipe_id, quantity, unit,
        ))
    }

    /// Create a recipe from imported lines in one transaction. Lines whose
    /// name matches a catalog ingredient in a compatible unit take its
    /// nutrition; others get zeros.
    pub fn import_recipe(
        &self,
        recipe: &NewRecipe,
        lines: &[ImportedIngredient],
    ) -> Result<RecipeDetail> {
        self.db.with_transaction(|db| {
            let created = db.create_recipe(recipe)?;
            for line in lines {
                let ingredient = match db.find_catalog_ingredient(&line.name)? {
                    Some(source) if source.accepts_unit(line.unit) => {
                        NewIngredient::from_catalog(&source, created.id, line.quantity, line.unit)
                    }
                    found => {
                        if let Some(source) = found {
                            warn!(
                                name = %line.name,
                                "Catalog entry is measured in {}, not {}; importing without nutrition",
                                source.unit,
                                line.unit
                            );
                        } else {
                            debug!(name = %line.name, "No catalog match, importing without nutrition");
                        }
                        NewIngredient {
                            name: line.name.clone(),
                            quantity: line.quantity,
                            unit: line.unit,
                            recipe_id: Some(created.id),
                            nutrition: Nutrition::default(),
                            unit_weight: None,
                        }
                    }
                };
                db.insert_ingredient(&ingredient)?;
            }
            db.get_recipe_detail(created.id)
        })
    }

    // --- Plans ---

    /// A plan with its meals, recipes resolved.
    pub fn plan_meals(&self, plan_id: i64) -> Result<(Plan, Vec<PlannedMealDetail>)> {
        let plan = self.db.get_plan(plan_id)?;
        let meals = self
            .db
            .planned_meals_in_range(plan.start_date, plan.end_date)?
            .into_iter()
            .filter(|m| m.plan_id == plan_id)
            .collect();
        Ok((plan, meals))
    }

    // --- Shopping ---

    /// Consolidated shopping list for every planned meal dated in `[from, to]`.
    pub fn shopping_list(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ConsolidatedIngredient>> {
        let meals = self.db.planned_meals_in_range(from, to)?;
        Ok(build_shopping_list(&meals))
    }

    /// Shopping list for one plan with its saved checked state applied.
    pub fn plan_shopping_list(&self, plan_id: i64) -> Result<Vec<ConsolidatedIngredient>> {
        let (_, meals) = self.plan_meals(plan_id)?;
        let mut entries = build_shopping_list(&meals);
        merge_saved_state(&mut entries, &self.db.get_shopping_items(plan_id)?);
        Ok(entries)
    }

    pub fn set_shopping_item_checked(
        &self,
        plan_id: i64,
        name: &str,
        unit: Unit,
        checked: bool,
    ) -> Result<ShoppingListItem> {
        let mut entry = self
            .plan_shopping_list(plan_id)?
            .into_iter()
            .find(|e| e.name == name && e.unit == unit)
            .with_context(|| {
                format!("'{name}' ({unit}) is not on the shopping list for plan {plan_id}")
            })?;
        entry.checked = checked;
        self.db.upsert_shopping_item(plan_id, &entry)
    }

    /// Persist every current entry of the plan's list, keeping checked flags.
    pub fn save_plan_shopping_list(&self, plan_id: i64) -> Result<Vec<ShoppingListItem>> {
        let entries = self.plan_shopping_list(plan_id)?;
        self.db.with_transaction(|db| {
            entries
                .iter()
                .map(|entry| db.upsert_shopping_item(plan_id, entry))
                .collect()
        })
    }

    pub fn clear_plan_shopping_state(&self, plan_id: i64) -> Result<usize> {
        self.db.get_plan(plan_id)?;
        self.db.clear_shopping_items(plan_id)
    }
}
