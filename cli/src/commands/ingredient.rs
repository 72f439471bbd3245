use anyhow::Result;

use crate::openfoodfacts::OpenFoodFactsClient;
use larder_core::db::Database;
use larder_core::models::{NewIngredient, Nutrition, Unit};
use larder_core::service::LarderService;

use super::helpers::{exit_not_found, parse_unit, print_ingredient_table};

pub(crate) fn cmd_ingredient_list(db: &Database, search: Option<&str>, json: bool) -> Result<()> {
    let ingredients = db.list_catalog_ingredients(search)?;
    if ingredients.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No ingredients found. Run `larder seed` to load the catalog.");
        }
        std::process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredients)?);
    } else {
        print_ingredient_table(&ingredients);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_ingredient_add(
    db: &Database,
    name: &str,
    unit: &str,
    amount: Option<f64>,
    calories: f64,
    protein: Option<f64>,
    fat: Option<f64>,
    carbs: Option<f64>,
    unit_weight: Option<f64>,
    json: bool,
) -> Result<()> {
    let unit = parse_unit(unit)?;
    let default_amount = if unit == Unit::Piece {
        1.0
    } else {
        100.0
    };
    let ingredient = db.insert_ingredient(&NewIngredient {
        name: name.trim().to_string(),
        quantity: amount.unwrap_or(default_amount),
        unit,
        recipe_id: None,
        nutrition: Nutrition::new(
            calories,
            protein.unwrap_or(0.0),
            fat.unwrap_or(0.0),
            carbs.unwrap_or(0.0),
        ),
        unit_weight,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredient)?);
    } else {
        let id = ingredient.id;
        println!("Added ingredient: {} (id: {id})", ingredient.name);
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_verify(svc: &LarderService, id: i64, json: bool) -> Result<()> {
    if svc.db().get_ingredient(id).is_err() {
        exit_not_found(&format!("Ingredient {id} not found"), json);
    }
    let off = OpenFoodFactsClient::new()?;
    let verified = svc.verify_ingredient(&off, id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&verified)?);
    } else if verified.updated {
        let n = verified.ingredient.nutrition;
        println!(
            "Updated {}: {:.0} kcal | P:{:.1}g F:{:.1}g C:{:.1}g",
            verified.ingredient.name, n.calories, n.protein, n.fat, n.carbs
        );
    } else {
        println!("{} is up to date", verified.ingredient.name);
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_dedupe(svc: &LarderService, json: bool) -> Result<()> {
    let removed = svc.dedupe_catalog()?;
    if json {
        println!("{}", serde_json::json!({ "removed": removed }));
    } else if removed == 0 {
        println!("No duplicate ingredients found");
    } else {
        println!("Removed {removed} duplicate ingredients");
    }
    Ok(())
}
