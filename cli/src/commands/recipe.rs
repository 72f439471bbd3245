use anyhow::{Context, Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::db::Database;
use larder_core::models::{NewRecipe, Recipe, Unit, convert_to_unit};
use larder_core::service::{ImportedIngredient, LarderService};

use super::helpers::{exit_not_found, parse_quantity, print_ingredient_table, truncate};

/// Find a recipe by id or, failing that, by name.
pub(super) fn lookup_recipe(db: &Database, query: &str) -> Result<Option<Recipe>> {
    if let Ok(id) = query.trim().parse::<i64>() {
        if let Some(recipe) = db.find_recipe(id)? {
            return Ok(Some(recipe));
        }
    }
    db.find_recipe_by_name(query)
}

pub(super) fn resolve_recipe(db: &Database, query: &str, json: bool) -> Result<Recipe> {
    match lookup_recipe(db, query)? {
        Some(recipe) => Ok(recipe),
        None => exit_not_found(&format!("Recipe '{query}' not found"), json),
    }
}

pub(crate) fn cmd_recipe_create(
    db: &Database,
    name: &str,
    description: Option<String>,
    folder_id: Option<i64>,
    json: bool,
) -> Result<()> {
    let recipe = db.create_recipe(&NewRecipe {
        name: name.to_string(),
        description: description.unwrap_or_default(),
        folder_id,
    })?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let id = recipe.id;
        println!("Created recipe: {} (id: {id})", recipe.name);
        println!("Add ingredients with: larder recipe add-ingredient \"{name}\" <ingredient> <quantity>");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_add_ingredient(
    svc: &LarderService,
    recipe_query: &str,
    ingredient_name: &str,
    quantity_str: &str,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(svc.db(), recipe_query, json)?;
    let Some(source) = svc.db().find_catalog_ingredient(ingredient_name)? else {
        exit_not_found(
            &format!(
                "Ingredient '{ingredient_name}' is not in the catalog. Add it with `larder ingredient add`"
            ),
            json,
        );
    };
    let (quantity, unit) = parse_quantity(quantity_str, source.unit)?;
    let ingredient = svc.add_catalog_ingredient(recipe.id, &source.name, quantity, unit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredient)?);
    } else {
        println!(
            "Added {quantity} {} of {} to {}",
            unit.abbreviation(),
            ingredient.name,
            recipe.name
        );
    }
    Ok(())
}

pub(crate) fn cmd_recipe_remove_ingredient(
    db: &Database,
    recipe_query: &str,
    ingredient_name: &str,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(db, recipe_query, json)?;
    if !db.remove_recipe_ingredient(recipe.id, ingredient_name)? {
        exit_not_found(
            &format!("Ingredient '{ingredient_name}' not found in recipe"),
            json,
        );
    }
    if json {
        println!("{}", serde_json::json!({ "removed": ingredient_name }));
    } else {
        println!("Removed {ingredient_name} from {}", recipe.name);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_show(db: &Database, recipe_query: &str, json: bool) -> Result<()> {
    let recipe = resolve_recipe(db, recipe_query, json)?;
    let detail = db.get_recipe_detail(recipe.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    println!("=== {} === (id: {})", detail.name, detail.id);
    if let Some(folder_id) = detail.folder_id {
        let folder = db.get_folder(folder_id)?;
        println!("  Folder: {}", folder.name);
    }
    if !detail.labels.is_empty() {
        let labels: Vec<&str> = detail.labels.iter().map(|l| l.name.as_str()).collect();
        println!("  Labels: {}", labels.join(", "));
    }
    if !detail.description.is_empty() {
        println!("  {}", detail.description);
    }

    println!("\n  INGREDIENTS:");
    if detail.ingredients.is_empty() {
        println!("    (none)");
    } else {
        print_ingredient_table(&detail.ingredients);
    }

    let n = detail.nutrition;
    println!("\n  TOTAL:");
    println!(
        "    {:.0} kcal | P:{:.0}g F:{:.0}g C:{:.0}g",
        n.calories, n.protein, n.fat, n.carbs
    );
    Ok(())
}

pub(crate) fn cmd_recipe_list(
    db: &Database,
    folder_id: Option<i64>,
    label: Option<&str>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Cal")]
        calories: String,
        #[tabled(rename = "P")]
        protein: String,
        #[tabled(rename = "F")]
        fat: String,
        #[tabled(rename = "C")]
        carbs: String,
    }

    let mut recipes = match label {
        Some(label) => db.recipes_with_label(label)?,
        None => db.list_recipes(folder_id)?,
    };
    if label.is_some() && folder_id.is_some() {
        recipes.retain(|r| r.folder_id == folder_id);
    }

    if recipes.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found");
        }
        std::process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id,
            name: truncate(&r.name, 30),
            calories: format!("{:.0}", r.nutrition.calories),
            protein: format!("{:.0}", r.nutrition.protein),
            fat: format!("{:.0}", r.nutrition.fat),
            carbs: format!("{:.0}", r.nutrition.carbs),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_recipe_delete(db: &Database, recipe_query: &str, json: bool) -> Result<()> {
    let recipe = resolve_recipe(db, recipe_query, json)?;
    db.delete_recipe(recipe.id)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": recipe.id }));
    } else {
        println!("Deleted recipe {} (id: {})", recipe.name, recipe.id);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_move(
    db: &Database,
    recipe_query: &str,
    folder_id: Option<i64>,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(db, recipe_query, json)?;
    let moved = db.set_recipe_folder(recipe.id, folder_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&moved)?);
    } else if let Some(folder_id) = folder_id {
        let folder = db.get_folder(folder_id)?;
        println!("Moved {} to folder {}", moved.name, folder.name);
    } else {
        println!("Moved {} out of its folder", moved.name);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_label(
    db: &Database,
    recipe_query: &str,
    label: &str,
    color: Option<&str>,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(db, recipe_query, json)?;
    let mut attached = db.attach_label(recipe.id, label)?;
    if color.is_some() {
        attached = db.set_label_color(&attached.name, color)?;
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&attached)?);
    } else {
        println!("Labelled {} as {}", recipe.name, attached.name);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_unlabel(
    db: &Database,
    recipe_query: &str,
    label: &str,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(db, recipe_query, json)?;
    if !db.detach_label(recipe.id, label)? {
        exit_not_found(
            &format!("Recipe '{}' has no label '{label}'", recipe.name),
            json,
        );
    }
    if json {
        println!("{}", serde_json::json!({ "removed": label }));
    } else {
        println!("Removed label {label} from {}", recipe.name);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_import(
    svc: &LarderService,
    file: &std::path::Path,
    name_override: Option<String>,
    folder_id: Option<i64>,
    json: bool,
) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let (recipe_data, _report) = cooklang::parse(&input)
        .into_result()
        .map_err(|e| anyhow::anyhow!("Failed to parse Cooklang file: {e}"))?;

    let name = name_override
        .or_else(|| recipe_data.metadata.title().map(String::from))
        .or_else(|| file.file_stem().and_then(|s| s.to_str()).map(String::from))
        .context("Could not determine recipe name. Use --name to specify one")?;

    let converter = cooklang::Converter::default();
    let lines: Vec<ImportedIngredient> = recipe_data
        .group_ingredients(&converter)
        .iter()
        .map(cooklang_ingredient)
        .collect();

    if lines.is_empty() {
        bail!("No ingredients found in recipe");
    }

    let detail = svc.import_recipe(
        &NewRecipe {
            name,
            description: format!("Imported from {}", file.display()),
            folder_id,
        },
        &lines,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        println!(
            "Imported recipe: {} ({} ingredients, {:.0} kcal)",
            detail.name,
            detail.ingredients.len(),
            detail.nutrition.calories
        );
    }
    Ok(())
}

fn cooklang_ingredient(gi: &cooklang::ingredient_list::GroupedIngredient<'_>) -> ImportedIngredient {
    let name = gi.ingredient.display_name().to_string();

    // Only the first quantity of a grouped ingredient is used
    let (raw_qty, unit) = gi.quantity.iter().next().map_or((1.0, None), |qty: &cooklang::Quantity| {
        let value = match qty.value() {
            cooklang::Value::Number(n) => n.value(),
            cooklang::Value::Range { start, .. } => start.value(),
            cooklang::Value::Text(t) => t.trim().parse::<f64>().unwrap_or(1.0),
        };
        (value, qty.unit().map(String::from))
    });

    let (quantity, unit) = match unit {
        Some(unit) => convert_to_unit(raw_qty, &unit).unwrap_or_else(|| {
            tracing::warn!("Unknown unit '{unit}' for {name}, treating {raw_qty} as pieces");
            (raw_qty, Unit::Piece)
        }),
        None => (raw_qty, Unit::Piece),
    };

    ImportedIngredient {
        name,
        quantity,
        unit,
    }
}
