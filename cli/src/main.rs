mod commands;
mod config;
mod logging;
mod openfoodfacts;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use crate::commands::{
    cmd_folder_create, cmd_folder_delete, cmd_folder_list, cmd_ingredient_add,
    cmd_ingredient_dedupe, cmd_ingredient_list, cmd_ingredient_verify, cmd_plan_add_meal,
    cmd_plan_archive, cmd_plan_create, cmd_plan_delete, cmd_plan_list, cmd_plan_remove_meal,
    cmd_plan_show, cmd_recipe_add_ingredient, cmd_recipe_create, cmd_recipe_delete,
    cmd_recipe_import, cmd_recipe_label, cmd_recipe_list, cmd_recipe_move,
    cmd_recipe_remove_ingredient, cmd_recipe_show, cmd_recipe_unlabel, cmd_seed,
    cmd_shopping_check, cmd_shopping_plan, cmd_shopping_range, cmd_shopping_reset,
    cmd_shopping_save, ensure_catalog,
};
use crate::config::Config;
use larder_core::service::LarderService;

#[derive(Parser)]
#[command(
    name = "larder",
    version,
    about = "Plan meals, keep recipes and build shopping lists"
)]
struct Cli {
    /// Show debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill the ingredient catalog (done automatically on first use)
    Seed {
        /// Language for ingredient names (pl, en, de, es, fr, ko; default: from LANG)
        #[arg(short, long)]
        language: Option<String>,
        /// Check each entry against `OpenFoodFacts` while seeding
        #[arg(long)]
        verify_nutrition: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the ingredient catalog
    Ingredient {
        #[command(subcommand)]
        command: IngredientCommands,
    },
    /// Manage recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Organize recipes into folders
    Folder {
        #[command(subcommand)]
        command: FolderCommands,
    },
    /// Manage meal plans
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Build shopping lists from planned meals
    Shopping {
        #[command(subcommand)]
        command: ShoppingCommands,
    },
}

#[derive(Subcommand)]
enum IngredientCommands {
    /// List catalog ingredients
    List {
        /// Filter by name
        #[arg(short, long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an ingredient to the catalog
    Add {
        /// Ingredient name
        name: String,
        /// Unit: g, ml or pcs
        #[arg(short, long, default_value = "g")]
        unit: String,
        /// Reference amount the nutrition is given for (default: 100 g/ml, 1 piece)
        #[arg(long)]
        amount: Option<f64>,
        /// Calories per reference amount
        #[arg(long)]
        calories: f64,
        /// Protein in grams
        #[arg(long)]
        protein: Option<f64>,
        /// Fat in grams
        #[arg(long)]
        fat: Option<f64>,
        /// Carbs in grams
        #[arg(long)]
        carbs: Option<f64>,
        /// Weight of one piece in grams (pieces only)
        #[arg(long)]
        unit_weight: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Refresh an ingredient's nutrition from `OpenFoodFacts`
    Verify {
        /// Ingredient ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove duplicate catalog ingredients
    Dedupe {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Create a new recipe
    Create {
        /// Recipe name
        name: String,
        /// Short description
        #[arg(short, long)]
        description: Option<String>,
        /// Folder ID to file the recipe under
        #[arg(long)]
        folder: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a catalog ingredient to a recipe
    AddIngredient {
        /// Recipe name or ID
        recipe: String,
        /// Catalog ingredient name
        ingredient: String,
        /// Quantity (e.g. "200g", "2 tbsp", "3 pcs"; a bare number uses the ingredient's unit)
        quantity: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an ingredient from a recipe
    RemoveIngredient {
        /// Recipe name or ID
        recipe: String,
        /// Ingredient name
        ingredient: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recipe details with nutrition
    Show {
        /// Recipe name or ID
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recipes
    List {
        /// Only recipes in this folder
        #[arg(long)]
        folder: Option<i64>,
        /// Only recipes with this label
        #[arg(long)]
        label: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe
    Delete {
        /// Recipe name or ID
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a recipe from a Cooklang (.cook) file
    Import {
        /// Path to .cook file
        file: PathBuf,
        /// Override recipe name (default: from metadata or filename)
        #[arg(long)]
        name: Option<String>,
        /// Folder ID to file the recipe under
        #[arg(long)]
        folder: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move a recipe into a folder (omit the folder to move it out)
    Move {
        /// Recipe name or ID
        recipe: String,
        /// Target folder ID
        #[arg(long)]
        folder: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Attach a label to a recipe
    Label {
        /// Recipe name or ID
        recipe: String,
        /// Label name
        label: String,
        /// Label color (e.g. "#ff8800")
        #[arg(long)]
        color: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Detach a label from a recipe
    Unlabel {
        /// Recipe name or ID
        recipe: String,
        /// Label name
        label: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum FolderCommands {
    /// Create a folder
    Create {
        /// Folder name
        name: String,
        /// Parent folder ID
        #[arg(long)]
        parent: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List folders (top level unless --parent is given)
    List {
        /// Parent folder ID
        #[arg(long)]
        parent: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a folder and its subfolders
    Delete {
        /// Folder ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Create a plan covering START to END inclusive
    Create {
        /// First day (YYYY-MM-DD or today/yesterday/tomorrow)
        start: String,
        /// Last day
        end: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List plans
    List {
        /// Include archived plans
        #[arg(short, long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a plan and its meals
    Show {
        /// Plan ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Schedule a recipe on a day of a plan
    AddMeal {
        /// Plan ID
        plan: i64,
        /// Recipe name or ID
        recipe: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: String,
        /// Number of portions
        #[arg(short, long, default_value = "1")]
        portions: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a planned meal by ID
    RemoveMeal {
        /// Planned meal ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Archive a plan
    Archive {
        /// Plan ID
        id: i64,
        /// Restore an archived plan instead
        #[arg(long)]
        undo: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a plan with its meals and shopping list state
    Delete {
        /// Plan ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ShoppingCommands {
    /// Shopping list for every meal planned between two dates
    Range {
        /// First day (YYYY-MM-DD or today/yesterday/tomorrow)
        from: String,
        /// Last day
        to: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Shopping list for one plan, with checked items
    Plan {
        /// Plan ID
        id: i64,
        /// Write CSV to stdout
        #[arg(long, conflicts_with = "json")]
        csv: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check off an item on a plan's shopping list
    Check {
        /// Plan ID
        plan: i64,
        /// Item name
        name: String,
        /// Item unit: g, ml or pcs
        unit: String,
        /// Uncheck instead
        #[arg(long)]
        undo: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Save the current list so checked state is kept
    Save {
        /// Plan ID
        plan: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget the saved list and checked state of a plan
    Reset {
        /// Plan ID
        plan: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Commands that read the ingredient catalog and so seed it on first use.
fn needs_catalog(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Ingredient { .. }
            | Commands::Recipe {
                command: RecipeCommands::AddIngredient { .. } | RecipeCommands::Import { .. },
            }
    )
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    tracing::debug!(db = %config.db_path.display(), "Opening database");
    let svc = LarderService::new(&config.db_path)?;
    let db = svc.db();

    if needs_catalog(&cli.command) {
        ensure_catalog(&svc, Config::language(), &config.catalog_loader());
    }

    match cli.command {
        Commands::Seed {
            language,
            verify_nutrition,
            json,
        } => cmd_seed(&svc, &config, language.as_deref(), verify_nutrition, json),
        Commands::Ingredient { command } => match command {
            IngredientCommands::List { search, json } => {
                cmd_ingredient_list(db, search.as_deref(), json)
            }
            IngredientCommands::Add {
                name,
                unit,
                amount,
                calories,
                protein,
                fat,
                carbs,
                unit_weight,
                json,
            } => cmd_ingredient_add(
                db,
                &name,
                &unit,
                amount,
                calories,
                protein,
                fat,
                carbs,
                unit_weight,
                json,
            ),
            IngredientCommands::Verify { id, json } => cmd_ingredient_verify(&svc, id, json),
            IngredientCommands::Dedupe { json } => cmd_ingredient_dedupe(&svc, json),
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::Create {
                name,
                description,
                folder,
                json,
            } => cmd_recipe_create(db, &name, description, folder, json),
            RecipeCommands::AddIngredient {
                recipe,
                ingredient,
                quantity,
                json,
            } => cmd_recipe_add_ingredient(&svc, &recipe, &ingredient, &quantity, json),
            RecipeCommands::RemoveIngredient {
                recipe,
                ingredient,
                json,
            } => cmd_recipe_remove_ingredient(db, &recipe, &ingredient, json),
            RecipeCommands::Show { recipe, json } => cmd_recipe_show(db, &recipe, json),
            RecipeCommands::List {
                folder,
                label,
                json,
            } => cmd_recipe_list(db, folder, label.as_deref(), json),
            RecipeCommands::Delete { recipe, json } => cmd_recipe_delete(db, &recipe, json),
            RecipeCommands::Import {
                file,
                name,
                folder,
                json,
            } => cmd_recipe_import(&svc, &file, name, folder, json),
            RecipeCommands::Move {
                recipe,
                folder,
                json,
            } => cmd_recipe_move(db, &recipe, folder, json),
            RecipeCommands::Label {
                recipe,
                label,
                color,
                json,
            } => cmd_recipe_label(db, &recipe, &label, color.as_deref(), json),
            RecipeCommands::Unlabel {
                recipe,
                label,
                json,
            } => cmd_recipe_unlabel(db, &recipe, &label, json),
        },
        Commands::Folder { command } => match command {
            FolderCommands::Create { name, parent, json } => {
                cmd_folder_create(db, &name, parent, json)
            }
            FolderCommands::List { parent, json } => cmd_folder_list(db, parent, json),
            FolderCommands::Delete { id, json } => cmd_folder_delete(db, id, json),
        },
        Commands::Plan { command } => match command {
            PlanCommands::Create { start, end, json } => cmd_plan_create(db, &start, &end, json),
            PlanCommands::List { all, json } => cmd_plan_list(db, all, json),
            PlanCommands::Show { id, json } => cmd_plan_show(&svc, id, json),
            PlanCommands::AddMeal {
                plan,
                recipe,
                date,
                portions,
                json,
            } => cmd_plan_add_meal(db, plan, &recipe, &date, portions, json),
            PlanCommands::RemoveMeal { id, json } => cmd_plan_remove_meal(db, id, json),
            PlanCommands::Archive { id, undo, json } => cmd_plan_archive(db, id, undo, json),
            PlanCommands::Delete { id, json } => cmd_plan_delete(db, id, json),
        },
        Commands::Shopping { command } => match command {
            ShoppingCommands::Range { from, to, json } => {
                cmd_shopping_range(&svc, &from, &to, json)
            }
            ShoppingCommands::Plan { id, csv, json } => cmd_shopping_plan(&svc, id, csv, json),
            ShoppingCommands::Check {
                plan,
                name,
                unit,
                undo,
                json,
            } => cmd_shopping_check(&svc, plan, &name, &unit, undo, json),
            ShoppingCommands::Save { plan, json } => cmd_shopping_save(&svc, plan, json),
            ShoppingCommands::Reset { plan, json } => cmd_shopping_reset(&svc, plan, json),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_plan_add_meal() {
        let cli = Cli::try_parse_from([
            "larder", "plan", "add-meal", "3", "Salad", "2024-06-10", "--portions", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Plan {
                command:
                    PlanCommands::AddMeal {
                        plan,
                        recipe,
                        portions,
                        ..
                    },
            } => {
                assert_eq!(plan, 3);
                assert_eq!(recipe, "Salad");
                assert_eq!(portions, 2);
            }
            _ => panic!("expected plan add-meal"),
        }
    }

    #[test]
    fn test_catalog_commands_trigger_seeding() {
        let parse = |args: &[&str]| Cli::try_parse_from(args).unwrap().command;
        assert!(needs_catalog(&parse(&["larder", "ingredient", "list"])));
        assert!(needs_catalog(&parse(&[
            "larder",
            "recipe",
            "add-ingredient",
            "Salad",
            "Tomato",
            "100g",
        ])));
        assert!(needs_catalog(&parse(&["larder", "recipe", "import", "soup.cook"])));
        assert!(!needs_catalog(&parse(&["larder", "recipe", "list"])));
        assert!(!needs_catalog(&parse(&["larder", "seed"])));
        assert!(!needs_catalog(&parse(&["larder", "plan", "list"])));
    }

    #[test]
    fn test_csv_conflicts_with_json() {
        assert!(Cli::try_parse_from(["larder", "shopping", "plan", "1", "--csv", "--json"]).is_err());
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["larder", "shopping", "save", "1", "-v"]).unwrap();
        assert!(cli.verbose);
    }
}
