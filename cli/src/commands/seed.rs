use anyhow::{Result, bail};
use serde::Serialize;

use crate::config::Config;
use crate::openfoodfacts::OpenFoodFactsClient;
use larder_core::catalog::CatalogLoader;
use larder_core::models::Language;
use larder_core::seed::SeedOutcome;
use larder_core::service::{LarderService, NutritionLookupProvider};

const SEED_FAILED: &str =
    "Seeding the ingredient catalog failed and the attempt was rolled back (see the log above)";

#[derive(Serialize)]
struct SeedReport {
    outcome: &'static str,
    language: String,
    inserted: usize,
    duplicates_removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    origin: Option<String>,
}

impl SeedReport {
    fn new(outcome: &SeedOutcome, language: Language) -> Self {
        let (name, inserted, duplicates_removed, origin) = match outcome {
            SeedOutcome::AlreadyCompleted => ("already_completed", 0, 0, None),
            SeedOutcome::Skipped => ("skipped", 0, 0, None),
            SeedOutcome::AlreadySeeded { duplicates_removed } => {
                ("already_seeded", 0, *duplicates_removed, None)
            }
            SeedOutcome::Seeded {
                inserted,
                duplicates_removed,
                origin,
            } => ("seeded", *inserted, *duplicates_removed, Some(origin.to_string())),
            SeedOutcome::Failed => ("failed", 0, 0, None),
        };
        Self {
            outcome: name,
            language: language.code().to_string(),
            inserted,
            duplicates_removed,
            origin,
        }
    }
}

/// Seed the catalog in the configured language if nothing is stored yet.
/// A no-op once any ingredient exists; failures are logged, not returned.
pub(crate) fn ensure_catalog(
    svc: &LarderService,
    language: Language,
    loader: &CatalogLoader,
) -> SeedOutcome {
    let outcome = svc.seed_catalog(language, loader, None);
    if let SeedOutcome::Seeded { inserted, .. } = &outcome {
        tracing::info!(inserted, %language, "Seeded ingredient catalog on first use");
    }
    outcome
}

pub(crate) fn cmd_seed(
    svc: &LarderService,
    config: &Config,
    language: Option<&str>,
    verify_nutrition: bool,
    json: bool,
) -> Result<()> {
    let language = language.map_or_else(Config::language, Language::from_code);
    let loader = config.catalog_loader();
    let off = if verify_nutrition {
        Some(OpenFoodFactsClient::new()?)
    } else {
        None
    };
    let verifier = off.as_ref().map(|c| c as &dyn NutritionLookupProvider);

    let outcome = svc.seed_catalog(language, &loader, verifier);
    let report = SeedReport::new(&outcome, language);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        match &outcome {
            SeedOutcome::Seeded {
                inserted,
                duplicates_removed,
                origin,
            } => {
                println!("Seeded {inserted} ingredients ({language}) from {origin}");
                if *duplicates_removed > 0 {
                    println!("Removed {duplicates_removed} duplicate ingredients");
                }
            }
            SeedOutcome::AlreadySeeded { duplicates_removed } => {
                println!("Ingredient catalog already populated, nothing to do");
                if *duplicates_removed > 0 {
                    println!("Removed {duplicates_removed} duplicate ingredients");
                }
            }
            SeedOutcome::AlreadyCompleted | SeedOutcome::Skipped => {
                println!("Seeding already handled");
            }
            SeedOutcome::Failed => {}
        }
    }

    if outcome == SeedOutcome::Failed {
        bail!("{SEED_FAILED}");
    }
    Ok(())
}
