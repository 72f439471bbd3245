use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{
    ConsolidatedIngredient, Folder, Ingredient, Label, NewIngredient, NewPlannedMeal, NewRecipe,
    Nutrition, Plan, PlannedMeal, PlannedMealDetail, Recipe, RecipeDetail, ShoppingListItem, Unit,
    validate_name, validate_new_ingredient, validate_plan_range, validate_portions,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

const INGREDIENT_COLUMNS: &str =
    "id, name, quantity, unit, recipe_id, calories, protein, fat, carbs, unit_weight, position";
const RECIPE_COLUMNS: &str =
    "id, name, description, calories, protein, fat, carbs, folder_id, created_at";
const PLAN_COLUMNS: &str = "id, start_date, end_date, archived, created_at";
const PLANNED_MEAL_COLUMNS: &str = "id, plan_id, recipe_id, date, portions";
const SHOPPING_COLUMNS: &str =
    "id, plan_id, name, unit, quantity, checked, recipe_ids, recipe_names, updated_at";

impl ToSql for Unit {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Unit {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().map(Unit::parse_lenient)
    }
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    calories REAL NOT NULL DEFAULT 0,
                    protein REAL NOT NULL DEFAULT 0,
                    fat REAL NOT NULL DEFAULT 0,
                    carbs REAL NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    quantity REAL NOT NULL,
                    unit TEXT NOT NULL,
                    recipe_id INTEGER REFERENCES recipes(id) ON DELETE CASCADE,
                    calories REAL NOT NULL DEFAULT 0,
                    protein REAL NOT NULL DEFAULT 0,
                    fat REAL NOT NULL DEFAULT 0,
                    carbs REAL NOT NULL DEFAULT 0,
                    unit_weight REAL,
                    position INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_ingredients_name ON ingredients(name);
                CREATE INDEX IF NOT EXISTS idx_ingredients_recipe ON ingredients(recipe_id);
                CREATE INDEX IF NOT EXISTS idx_recipes_name ON recipes(name);

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS plans (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    start_date TEXT NOT NULL,
                    end_date TEXT NOT NULL,
                    archived INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS planned_meals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    plan_id INTEGER NOT NULL REFERENCES plans(id) ON DELETE CASCADE,
                    recipe_id INTEGER REFERENCES recipes(id) ON DELETE SET NULL,
                    date TEXT NOT NULL,
                    portions INTEGER NOT NULL DEFAULT 1 CHECK (portions >= 1)
                );

                CREATE TABLE IF NOT EXISTS shopping_list_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    plan_id INTEGER NOT NULL REFERENCES plans(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    unit TEXT NOT NULL,
                    quantity REAL NOT NULL,
                    checked INTEGER NOT NULL DEFAULT 0,
                    recipe_ids TEXT NOT NULL DEFAULT '[]',
                    recipe_names TEXT NOT NULL DEFAULT '[]',
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_planned_meals_date ON planned_meals(date);
                CREATE INDEX IF NOT EXISTS idx_planned_meals_plan ON planned_meals(plan_id);
                CREATE UNIQUE INDEX IF NOT EXISTS idx_shopping_items_key
                    ON shopping_list_items(plan_id, name, unit);

                PRAGMA user_version = 2;",
            )?;
        }

        if version < 3 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS folders (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    parent_id INTEGER REFERENCES folders(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS labels (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    color TEXT
                );

                CREATE TABLE IF NOT EXISTS recipe_labels (
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    label_id INTEGER NOT NULL REFERENCES labels(id) ON DELETE CASCADE,
                    PRIMARY KEY (recipe_id, label_id)
                );

                ALTER TABLE recipes ADD COLUMN folder_id INTEGER REFERENCES folders(id) ON DELETE SET NULL;

                CREATE INDEX IF NOT EXISTS idx_folders_name ON folders(name);
                CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id);
                CREATE INDEX IF NOT EXISTS idx_recipes_folder ON recipes(folder_id);

                PRAGMA user_version = 3;",
            )?;
        }

        Ok(())
    }

    /// Run `f` inside a transaction. Any error rolls back everything `f` did.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Row mapping helpers ---

    fn date_from_row(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
        let raw: String = row.get(idx)?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn json_from_row<T: serde::de::DeserializeOwned>(
        row: &rusqlite::Row,
        idx: usize,
    ) -> rusqlite::Result<T> {
        let raw: String = row.get(idx)?;
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
        Ok(Ingredient {
            id: row.get(0)?,
            name: row.get(1)?,
            quantity: row.get(2)?,
            unit: row.get(3)?,
            recipe_id: row.get(4)?,
            nutrition: Nutrition {
                calories: row.get(5)?,
                protein: row.get(6)?,
                fat: row.get(7)?,
                carbs: row.get(8)?,
            },
            unit_weight: row.get(9)?,
            position: row.get(10)?,
        })
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            nutrition: Nutrition {
                calories: row.get(3)?,
                protein: row.get(4)?,
                fat: row.get(5)?,
                carbs: row.get(6)?,
            },
            folder_id: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn plan_from_row(row: &rusqlite::Row) -> rusqlite::Result<Plan> {
        Ok(Plan {
            id: row.get(0)?,
            start_date: Self::date_from_row(row, 1)?,
            end_date: Self::date_from_row(row, 2)?,
            archived: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn planned_meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<PlannedMeal> {
        Ok(PlannedMeal {
            id: row.get(0)?,
            plan_id: row.get(1)?,
            recipe_id: row.get(2)?,
            date: Self::date_from_row(row, 3)?,
            portions: row.get(4)?,
        })
    }

    fn shopping_item_from_row(row: &rusqlite::Row) -> rusqlite::Result<ShoppingListItem> {
        Ok(ShoppingListItem {
            id: row.get(0)?,
            plan_id: row.get(1)?,
            name: row.get(2)?,
            unit: row.get(3)?,
            quantity: row.get(4)?,
            checked: row.get(5)?,
            recipe_ids: Self::json_from_row(row, 6)?,
            recipe_names: Self::json_from_row(row, 7)?,
            updated_at: row.get(8)?,
        })
    }

    fn folder_from_row(row: &rusqlite::Row) -> rusqlite::Result<Folder> {
        Ok(Folder {
            id: row.get(0)?,
            name: row.get(1)?,
            parent_id: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn label_from_row(row: &rusqlite::Row) -> rusqlite::Result<Label> {
        Ok(Label {
            id: row.get(0)?,
            name: row.get(1)?,
            color: row.get(2)?,
        })
    }

    // --- Ingredients ---

    pub fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<Ingredient> {
        validate_new_ingredient(ingredient)?;
        if let Some(recipe_id) = ingredient.recipe_id {
            self.get_recipe(recipe_id)?;
        }
        let position: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM ingredients WHERE recipe_id IS ?1",
            params![ingredient.recipe_id],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO ingredients (name, quantity, unit, recipe_id, calories, protein, fat, carbs, unit_weight, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                ingredient.name,
                ingredient.quantity,
                ingredient.unit,
                ingredient.recipe_id,
                ingredient.nutrition.calories,
                ingredient.nutrition.protein,
                ingredient.nutrition.fat,
                ingredient.nutrition.carbs,
                ingredient.unit_weight,
                position,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        if let Some(recipe_id) = ingredient.recipe_id {
            self.recompute_recipe_nutrition(recipe_id)?;
        }
        self.get_ingredient(id)
    }

    /// Insert catalog rows as-is. Callers validate entries beforehand and
    /// own the surrounding transaction.
    pub fn insert_catalog_batch(&self, batch: &[NewIngredient]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO ingredients (name, quantity, unit, recipe_id, calories, protein, fat, carbs, unit_weight, position)
             VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?6, ?7, ?8, 0)",
        )?;
        for ingredient in batch {
            stmt.execute(params![
                ingredient.name,
                ingredient.quantity,
                ingredient.unit,
                ingredient.nutrition.calories,
                ingredient.nutrition.protein,
                ingredient.nutrition.fat,
                ingredient.nutrition.carbs,
                ingredient.unit_weight,
            ])?;
        }
        Ok(batch.len())
    }

    pub fn get_ingredient(&self, id: i64) -> Result<Ingredient> {
        self.conn
            .query_row(
                &format!("SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE id = ?1"),
                params![id],
                Self::ingredient_from_row,
            )
            .context("Ingredient not found")
    }

    pub fn list_catalog_ingredients(&self, search: Option<&str>) -> Result<Vec<Ingredient>> {
        let pattern = match search {
            Some(query) => {
                let escaped = query
                    .replace('\\', "\\\\")
                    .replace('%', "\\%")
                    .replace('_', "\\_");
                format!("%{escaped}%")
            }
            None => "%".to_string(),
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INGREDIENT_COLUMNS} FROM ingredients
             WHERE recipe_id IS NULL AND name LIKE ?1 ESCAPE '\\'
             ORDER BY name, id"
        ))?;
        let ingredients = stmt
            .query_map(params![pattern], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    /// Case-insensitive exact name match among catalog rows, lowest id first.
    pub fn find_catalog_ingredient(&self, name: &str) -> Result<Option<Ingredient>> {
        let ingredient = self
            .conn
            .query_row(
                &format!(
                    "SELECT {INGREDIENT_COLUMNS} FROM ingredients
                     WHERE recipe_id IS NULL AND LOWER(name) = LOWER(?1)
                     ORDER BY id LIMIT 1"
                ),
                params![name.trim()],
                Self::ingredient_from_row,
            )
            .optional()?;
        Ok(ingredient)
    }

    /// Every ingredient row, catalog and recipe-owned alike.
    pub fn count_ingredients(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM ingredients", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn count_catalog_ingredients(&self) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM ingredients WHERE recipe_id IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn update_ingredient_nutrition(&self, id: i64, nutrition: &Nutrition) -> Result<Ingredient> {
        let ingredient = self.get_ingredient(id)?;
        self.conn.execute(
            "UPDATE ingredients SET calories = ?1, protein = ?2, fat = ?3, carbs = ?4 WHERE id = ?5",
            params![
                nutrition.calories,
                nutrition.protein,
                nutrition.fat,
                nutrition.carbs,
                id
            ],
        )?;
        if let Some(recipe_id) = ingredient.recipe_id {
            self.recompute_recipe_nutrition(recipe_id)?;
        }
        self.get_ingredient(id)
    }

    pub fn delete_ingredient(&self, id: i64) -> Result<bool> {
        let Some(ingredient) = self
            .conn
            .query_row(
                &format!("SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE id = ?1"),
                params![id],
                Self::ingredient_from_row,
            )
            .optional()?
        else {
            return Ok(false);
        };
        self.conn
            .execute("DELETE FROM ingredients WHERE id = ?1", params![id])?;
        if let Some(recipe_id) = ingredient.recipe_id {
            self.recompute_recipe_nutrition(recipe_id)?;
        }
        Ok(true)
    }

    /// Delete catalog rows that repeat another row's name and nutrition,
    /// keeping the one with the lowest id. Returns the number of rows removed.
    pub fn remove_duplicate_catalog_ingredients(&self) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM ingredients
             WHERE recipe_id IS NULL
               AND id NOT IN (
                   SELECT MIN(id) FROM ingredients
                   WHERE recipe_id IS NULL
                   GROUP BY name, calories, protein, fat, carbs
               )",
            [],
        )?;
        Ok(removed)
    }

    // --- Recipes ---

    pub fn create_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        validate_name("Recipe", &recipe.name)?;
        if let Some(folder_id) = recipe.folder_id {
            self.get_folder(folder_id)?;
        }
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO recipes (name, description, folder_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![recipe.name.trim(), recipe.description, recipe.folder_id, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_recipe(id)
    }

    pub fn get_recipe(&self, id: i64) -> Result<Recipe> {
        self.find_recipe(id)?.context("Recipe not found")
    }

    pub fn find_recipe(&self, id: i64) -> Result<Option<Recipe>> {
        let recipe = self
            .conn
            .query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"),
                params![id],
                Self::recipe_from_row,
            )
            .optional()?;
        Ok(recipe)
    }

    pub fn get_recipe_by_name(&self, name: &str) -> Result<Recipe> {
        self.find_recipe_by_name(name)?
            .with_context(|| format!("Recipe '{name}' not found"))
    }

    /// Case-insensitive name match, oldest recipe first.
    pub fn find_recipe_by_name(&self, name: &str) -> Result<Option<Recipe>> {
        let recipe = self
            .conn
            .query_row(
                &format!(
                    "SELECT {RECIPE_COLUMNS} FROM recipes WHERE LOWER(name) = LOWER(?1) ORDER BY id LIMIT 1"
                ),
                params![name.trim()],
                Self::recipe_from_row,
            )
            .optional()?;
        Ok(recipe)
    }

    pub fn list_recipes(&self, folder_id: Option<i64>) -> Result<Vec<Recipe>> {
        let recipes = match folder_id {
            Some(folder_id) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {RECIPE_COLUMNS} FROM recipes WHERE folder_id = ?1 ORDER BY name, id"
                ))?;
                stmt.query_map(params![folder_id], Self::recipe_from_row)?
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {RECIPE_COLUMNS} FROM recipes ORDER BY name, id"
                ))?;
                stmt.query_map([], Self::recipe_from_row)?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(recipes)
    }

    pub fn recipes_with_label(&self, label: &str) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes
             WHERE id IN (
                 SELECT rl.recipe_id FROM recipe_labels rl
                 JOIN labels l ON rl.label_id = l.id
                 WHERE l.name = ?1
             )
             ORDER BY name, id"
        ))?;
        let recipes = stmt
            .query_map(params![label.trim()], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    pub fn get_recipe_ingredients(&self, recipe_id: i64) -> Result<Vec<Ingredient>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE recipe_id = ?1 ORDER BY position, id"
        ))?;
        let ingredients = stmt
            .query_map(params![recipe_id], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    pub fn get_recipe_detail(&self, recipe_id: i64) -> Result<RecipeDetail> {
        let recipe = self.get_recipe(recipe_id)?;
        self.recipe_detail(recipe)
    }

    fn recipe_detail(&self, recipe: Recipe) -> Result<RecipeDetail> {
        let ingredients = self.get_recipe_ingredients(recipe.id)?;
        let labels = self.labels_for_recipe(recipe.id)?;
        Ok(RecipeDetail {
            id: recipe.id,
            name: recipe.name,
            description: recipe.description,
            nutrition: recipe.nutrition,
            folder_id: recipe.folder_id,
            ingredients,
            labels,
        })
    }

    pub fn add_recipe_ingredient(
        &self,
        recipe_id: i64,
        ingredient: &NewIngredient,
    ) -> Result<Ingredient> {
        let owned = NewIngredient {
            recipe_id: Some(recipe_id),
            ..ingredient.clone()
        };
        self.insert_ingredient(&owned)
    }

    pub fn remove_recipe_ingredient(&self, recipe_id: i64, name: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM ingredients WHERE recipe_id = ?1 AND LOWER(name) = LOWER(?2)",
            params![recipe_id, name.trim()],
        )?;
        if rows > 0 {
            self.recompute_recipe_nutrition(recipe_id)?;
        }
        Ok(rows > 0)
    }

    pub fn set_recipe_folder(&self, recipe_id: i64, folder_id: Option<i64>) -> Result<Recipe> {
        self.get_recipe(recipe_id)?;
        if let Some(folder_id) = folder_id {
            self.get_folder(folder_id)?;
        }
        self.conn.execute(
            "UPDATE recipes SET folder_id = ?1 WHERE id = ?2",
            params![folder_id, recipe_id],
        )?;
        self.get_recipe(recipe_id)
    }

    /// Delete a recipe. Its ingredients and labels go with it; planned meals
    /// keep their slot with an unresolved recipe.
    pub fn delete_recipe(&self, recipe_id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM recipes WHERE id = ?1", params![recipe_id])?;
        Ok(rows > 0)
    }

    fn recompute_recipe_nutrition(&self, recipe_id: i64) -> Result<()> {
        let total = self
            .get_recipe_ingredients(recipe_id)?
            .iter()
            .map(Ingredient::nutrition_contribution)
            .fold(Nutrition::default(), Nutrition::plus);

        self.conn.execute(
            "UPDATE recipes SET calories = ?1, protein = ?2, fat = ?3, carbs = ?4 WHERE id = ?5",
            params![
                total.calories,
                total.protein,
                total.fat,
                total.carbs,
                recipe_id
            ],
        )?;
        Ok(())
    }

    // --- Folders ---

    pub fn create_folder(&self, name: &str, parent_id: Option<i64>) -> Result<Folder> {
        validate_name("Folder", name)?;
        if let Some(parent_id) = parent_id {
            self.get_folder(parent_id)?;
        }
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO folders (name, parent_id, created_at) VALUES (?1, ?2, ?3)",
            params![name.trim(), parent_id, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_folder(id)
    }

    pub fn get_folder(&self, id: i64) -> Result<Folder> {
        self.conn
            .query_row(
                "SELECT id, name, parent_id, created_at FROM folders WHERE id = ?1",
                params![id],
                Self::folder_from_row,
            )
            .context(format!("Folder {id} not found"))
    }

    /// List the direct children of `parent_id`, or the top-level folders.
    pub fn list_folders(&self, parent_id: Option<i64>) -> Result<Vec<Folder>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, parent_id, created_at FROM folders
             WHERE parent_id IS ?1
             ORDER BY name, id",
        )?;
        let folders = stmt
            .query_map(params![parent_id], Self::folder_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(folders)
    }

    /// Delete a folder and its subfolders. Recipes inside fall back to no folder.
    pub fn delete_folder(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM folders WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Labels ---

    pub fn get_or_create_label(&self, name: &str) -> Result<Label> {
        validate_name("Label", name)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO labels (name) VALUES (?1)",
            params![name.trim()],
        )?;
        self.conn
            .query_row(
                "SELECT id, name, color FROM labels WHERE name = ?1",
                params![name.trim()],
                Self::label_from_row,
            )
            .context(format!("Label '{name}' not found"))
    }

    pub fn set_label_color(&self, name: &str, color: Option<&str>) -> Result<Label> {
        let label = self.get_or_create_label(name)?;
        self.conn.execute(
            "UPDATE labels SET color = ?1 WHERE id = ?2",
            params![color, label.id],
        )?;
        Ok(Label {
            color: color.map(String::from),
            ..label
        })
    }

    pub fn list_labels(&self) -> Result<Vec<Label>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, color FROM labels ORDER BY name")?;
        let labels = stmt
            .query_map([], Self::label_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(labels)
    }

    pub fn attach_label(&self, recipe_id: i64, name: &str) -> Result<Label> {
        self.get_recipe(recipe_id)?;
        let label = self.get_or_create_label(name)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO recipe_labels (recipe_id, label_id) VALUES (?1, ?2)",
            params![recipe_id, label.id],
        )?;
        Ok(label)
    }

    pub fn detach_label(&self, recipe_id: i64, name: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM recipe_labels
             WHERE recipe_id = ?1 AND label_id IN (SELECT id FROM labels WHERE name = ?2)",
            params![recipe_id, name.trim()],
        )?;
        Ok(rows > 0)
    }

    pub fn labels_for_recipe(&self, recipe_id: i64) -> Result<Vec<Label>> {
        let mut stmt = self.conn.prepare(
            "SELECT l.id, l.name, l.color FROM labels l
             JOIN recipe_labels rl ON rl.label_id = l.id
             WHERE rl.recipe_id = ?1
             ORDER BY l.name",
        )?;
        let labels = stmt
            .query_map(params![recipe_id], Self::label_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(labels)
    }

    // --- Plans ---

    pub fn create_plan(&self, start: NaiveDate, end: NaiveDate) -> Result<Plan> {
        validate_plan_range(start, end)?;
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO plans (start_date, end_date, archived, created_at) VALUES (?1, ?2, 0, ?3)",
            params![
                start.format(DATE_FORMAT).to_string(),
                end.format(DATE_FORMAT).to_string(),
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_plan(id)
    }

    pub fn get_plan(&self, id: i64) -> Result<Plan> {
        self.find_plan(id)?
            .with_context(|| format!("Plan {id} not found"))
    }

    pub fn find_plan(&self, id: i64) -> Result<Option<Plan>> {
        let plan = self
            .conn
            .query_row(
                &format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = ?1"),
                params![id],
                Self::plan_from_row,
            )
            .optional()?;
        Ok(plan)
    }

    pub fn list_plans(&self, include_archived: bool) -> Result<Vec<Plan>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans
             WHERE archived = 0 OR ?1
             ORDER BY start_date, id"
        ))?;
        let plans = stmt
            .query_map(params![include_archived], Self::plan_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(plans)
    }

    pub fn set_plan_archived(&self, id: i64, archived: bool) -> Result<Plan> {
        self.get_plan(id)?;
        self.conn.execute(
            "UPDATE plans SET archived = ?1 WHERE id = ?2",
            params![archived, id],
        )?;
        self.get_plan(id)
    }

    /// Delete a plan together with its planned meals and shopping list state.
    pub fn delete_plan(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM plans WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Planned meals ---

    pub fn add_planned_meal(&self, meal: &NewPlannedMeal) -> Result<PlannedMeal> {
        validate_portions(meal.portions)?;
        let plan = self.get_plan(meal.plan_id)?;
        if !plan.contains(meal.date) {
            bail!(
                "Date {} is outside plan {} ({} to {})",
                meal.date,
                plan.id,
                plan.start_date,
                plan.end_date
            );
        }
        self.get_recipe(meal.recipe_id)?;
        self.conn.execute(
            "INSERT INTO planned_meals (plan_id, recipe_id, date, portions) VALUES (?1, ?2, ?3, ?4)",
            params![
                meal.plan_id,
                meal.recipe_id,
                meal.date.format(DATE_FORMAT).to_string(),
                meal.portions
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_planned_meal(id)
    }

    pub fn get_planned_meal(&self, id: i64) -> Result<PlannedMeal> {
        self.conn
            .query_row(
                &format!("SELECT {PLANNED_MEAL_COLUMNS} FROM planned_meals WHERE id = ?1"),
                params![id],
                Self::planned_meal_from_row,
            )
            .context("Planned meal not found")
    }

    pub fn remove_planned_meal(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM planned_meals WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn planned_meals_for_plan(&self, plan_id: i64) -> Result<Vec<PlannedMeal>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLANNED_MEAL_COLUMNS} FROM planned_meals WHERE plan_id = ?1 ORDER BY date, id"
        ))?;
        let meals = stmt
            .query_map(params![plan_id], Self::planned_meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    /// Planned meals dated within `[from, to]`, each with its recipe and the
    /// recipe's ingredients. A meal whose recipe no longer resolves carries `None`.
    pub fn planned_meals_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PlannedMealDetail>> {
        let meals: Vec<PlannedMeal> = {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {PLANNED_MEAL_COLUMNS} FROM planned_meals
                 WHERE date >= ?1 AND date <= ?2
                 ORDER BY date, id"
            ))?;
            stmt.query_map(
                params![
                    from.format(DATE_FORMAT).to_string(),
                    to.format(DATE_FORMAT).to_string()
                ],
                Self::planned_meal_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?
        };

        let mut recipes: HashMap<i64, Option<RecipeDetail>> = HashMap::new();
        let mut details = Vec::with_capacity(meals.len());
        for meal in meals {
            let recipe = match meal.recipe_id {
                Some(recipe_id) => {
                    if !recipes.contains_key(&recipe_id) {
                        let detail = match self.find_recipe(recipe_id)? {
                            Some(recipe) => Some(self.recipe_detail(recipe)?),
                            None => None,
                        };
                        recipes.insert(recipe_id, detail);
                    }
                    recipes.get(&recipe_id).cloned().flatten()
                }
                None => None,
            };
            details.push(PlannedMealDetail {
                id: meal.id,
                plan_id: meal.plan_id,
                date: meal.date,
                portions: meal.portions,
                recipe,
            });
        }
        Ok(details)
    }

    // --- Shopping list state ---

    /// Save the state of one consolidated entry for a plan. The row is keyed by
    /// `(plan_id, name, unit)`; saving again updates it in place.
    pub fn upsert_shopping_item(
        &self,
        plan_id: i64,
        entry: &ConsolidatedIngredient,
    ) -> Result<ShoppingListItem> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO shopping_list_items (plan_id, name, unit, quantity, checked, recipe_ids, recipe_names, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(plan_id, name, unit) DO UPDATE SET
                quantity = excluded.quantity,
                checked = excluded.checked,
                recipe_ids = excluded.recipe_ids,
                recipe_names = excluded.recipe_names,
                updated_at = excluded.updated_at",
            params![
                plan_id,
                entry.name,
                entry.unit,
                entry.quantity,
                entry.checked,
                serde_json::to_string(&entry.recipe_ids)?,
                serde_json::to_string(&entry.recipe_names)?,
                now,
            ],
        )?;
        self.get_shopping_item(plan_id, &entry.name, entry.unit)?
            .context("Shopping list item vanished after save")
    }

    pub fn get_shopping_item(
        &self,
        plan_id: i64,
        name: &str,
        unit: Unit,
    ) -> Result<Option<ShoppingListItem>> {
        let item = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SHOPPING_COLUMNS} FROM shopping_list_items
                     WHERE plan_id = ?1 AND name = ?2 AND unit = ?3"
                ),
                params![plan_id, name, unit],
                Self::shopping_item_from_row,
            )
            .optional()?;
        Ok(item)
    }

    pub fn get_shopping_items(&self, plan_id: i64) -> Result<Vec<ShoppingListItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SHOPPING_COLUMNS} FROM shopping_list_items WHERE plan_id = ?1 ORDER BY id"
        ))?;
        let items = stmt
            .query_map(params![plan_id], Self::shopping_item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn clear_shopping_items(&self, plan_id: i64) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM shopping_list_items WHERE plan_id = ?1",
            params![plan_id],
        )?;
        Ok(rows)
    }
}
