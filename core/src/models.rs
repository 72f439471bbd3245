use std::fmt;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Measurement unit of an ingredient quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Unit {
    Gram,
    Milliliter,
    Piece,
}

impl Unit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Gram => "Gram",
            Unit::Milliliter => "Milliliter",
            Unit::Piece => "Piece",
        }
    }

    /// Short label used in tables and CSV output.
    #[must_use]
    pub fn abbreviation(self) -> &'static str {
        match self {
            Unit::Gram => "g",
            Unit::Milliliter => "ml",
            Unit::Piece => "pcs",
        }
    }

    /// Case-insensitive parse of a stored or user-supplied unit name.
    /// Anything unrecognized is treated as `Piece`.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Unit {
        match s.trim().to_lowercase().as_str() {
            "gram" | "grams" | "g" => Unit::Gram,
            "milliliter" | "milliliters" | "millilitre" | "millilitres" | "ml" => {
                Unit::Milliliter
            }
            _ => Unit::Piece,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Languages the bundled ingredient catalog carries names for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Polish,
    English,
    German,
    Spanish,
    French,
    Korean,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Polish,
        Language::English,
        Language::German,
        Language::Spanish,
        Language::French,
        Language::Korean,
    ];

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Language::Polish => "pl",
            Language::English => "en",
            Language::German => "de",
            Language::Spanish => "es",
            Language::French => "fr",
            Language::Korean => "ko",
        }
    }

    /// Normalize a language hint such as `pl`, `de-AT` or `ko_KR.UTF-8`.
    /// Unknown codes fall back to English.
    #[must_use]
    pub fn from_code(code: &str) -> Language {
        let primary = code
            .trim()
            .split(['-', '_', '.'])
            .next()
            .unwrap_or_default()
            .to_lowercase();
        Language::ALL
            .into_iter()
            .find(|l| l.code() == primary)
            .unwrap_or(Language::English)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Macronutrients, per 100 units unless stated otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Nutrition {
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
}

impl Nutrition {
    #[must_use]
    pub fn new(calories: f64, protein: f64, fat: f64, carbs: f64) -> Self {
        Self {
            calories,
            protein,
            fat,
            carbs,
        }
    }

    #[must_use]
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            calories: self.calories * factor,
            protein: self.protein * factor,
            fat: self.fat * factor,
            carbs: self.carbs * factor,
        }
    }

    #[must_use]
    pub fn plus(self, other: Nutrition) -> Self {
        Self {
            calories: self.calories + other.calories,
            protein: self.protein + other.protein,
            fat: self.fat + other.fat,
            carbs: self.carbs + other.carbs,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub quantity: f64,
    pub unit: Unit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_id: Option<i64>,
    #[serde(flatten)]
    pub nutrition: Nutrition,
    /// Grams per piece, only meaningful for `Unit::Piece`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_weight: Option<f64>,
    pub position: i64,
}

impl Ingredient {
    #[must_use]
    pub fn is_catalog(&self) -> bool {
        self.recipe_id.is_none()
    }

    /// Whether a recipe may use this catalog ingredient in `unit`.
    ///
    /// The unit must match, except that grams and pieces are interchangeable
    /// when a positive unit weight links them.
    #[must_use]
    pub fn accepts_unit(&self, unit: Unit) -> bool {
        if unit == self.unit {
            return true;
        }
        let weighed = self.unit_weight.is_some_and(|w| w > 0.0);
        matches!(
            (self.unit, unit),
            (Unit::Gram, Unit::Piece) | (Unit::Piece, Unit::Gram)
        ) && weighed
    }

    /// Nutrition carried by this ingredient's quantity.
    ///
    /// Piece items with a known unit weight store their values per 100 g, so the
    /// quantity is converted to grams first; without a weight they are per piece.
    #[must_use]
    pub fn nutrition_contribution(&self) -> Nutrition {
        match (self.unit, self.unit_weight) {
            (Unit::Piece, Some(w)) if w > 0.0 => {
                self.nutrition.scaled(self.quantity * w / 100.0)
            }
            (Unit::Piece, _) => self.nutrition.scaled(self.quantity),
            _ => self.nutrition.scaled(self.quantity / 100.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewIngredient {
    pub name: String,
    pub quantity: f64,
    pub unit: Unit,
    pub recipe_id: Option<i64>,
    pub nutrition: Nutrition,
    pub unit_weight: Option<f64>,
}

impl NewIngredient {
    /// Copy a catalog ingredient into a recipe with a new quantity and unit.
    #[must_use]
    pub fn from_catalog(source: &Ingredient, recipe_id: i64, quantity: f64, unit: Unit) -> Self {
        Self {
            name: source.name.clone(),
            quantity,
            unit,
            recipe_id: Some(recipe_id),
            nutrition: source.nutrition,
            unit_weight: source.unit_weight,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Recipe {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub nutrition: Nutrition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub name: String,
    pub description: String,
    pub folder_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub nutrition: Nutrition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<i64>,
    pub ingredients: Vec<Ingredient>,
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub archived: bool,
    pub created_at: String,
}

impl Plan {
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedMeal {
    pub id: i64,
    pub plan_id: i64,
    pub recipe_id: Option<i64>,
    pub date: NaiveDate,
    pub portions: i64,
}

#[derive(Debug, Clone)]
pub struct NewPlannedMeal {
    pub plan_id: i64,
    pub recipe_id: i64,
    pub date: NaiveDate,
    pub portions: i64,
}

/// A planned meal with its recipe resolved, as consumed by the shopping list builder.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedMealDetail {
    pub id: i64,
    pub plan_id: i64,
    pub date: NaiveDate,
    pub portions: i64,
    pub recipe: Option<RecipeDetail>,
}

/// One `(name, unit)` group of ingredient demand across planned meals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidatedIngredient {
    pub name: String,
    pub unit: Unit,
    pub quantity: f64,
    pub checked: bool,
    pub recipe_ids: Vec<i64>,
    pub recipe_names: Vec<String>,
}

/// Persisted per-plan state of a consolidated ingredient.
#[derive(Debug, Clone, Serialize)]
pub struct ShoppingListItem {
    pub id: i64,
    pub plan_id: i64,
    pub name: String,
    pub unit: Unit,
    pub quantity: f64,
    pub checked: bool,
    pub recipe_ids: Vec<i64>,
    pub recipe_names: Vec<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Folder {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Label {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Convert a quantity with a unit into one of the three stored units.
/// Volume measures become millilitres, weights become grams and count words
/// become pieces. Returns `None` for units we cannot place.
#[must_use]
pub fn convert_to_unit(quantity: f64, unit: &str) -> Option<(f64, Unit)> {
    let lower = unit.trim().to_lowercase();
    match lower.as_str() {
        "g" | "gram" | "grams" => Some((quantity, Unit::Gram)),
        "kg" | "kilogram" | "kilograms" => Some((quantity * 1000.0, Unit::Gram)),
        "lb" | "lbs" | "pound" | "pounds" => Some((quantity * 454.0, Unit::Gram)),
        "oz" | "ounce" | "ounces" => Some((quantity * 28.35, Unit::Gram)),
        "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => {
            Some((quantity, Unit::Milliliter))
        }
        "l" | "liter" | "liters" | "litre" | "litres" => Some((quantity * 1000.0, Unit::Milliliter)),
        "tbsp" | "tablespoon" | "tablespoons" => Some((quantity * 15.0, Unit::Milliliter)),
        "tsp" | "teaspoon" | "teaspoons" => Some((quantity * 5.0, Unit::Milliliter)),
        "pc" | "pcs" | "piece" | "pieces" | "x" | "whole" => Some((quantity, Unit::Piece)),
        _ => None,
    }
}

pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("{kind} name must not be empty");
    }
    Ok(())
}

pub fn validate_portions(portions: i64) -> Result<()> {
    if portions < 1 {
        bail!("Portions must be at least 1 (got {portions})");
    }
    Ok(())
}

pub fn validate_plan_range(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start > end {
        bail!("Plan start date {start} is after end date {end}");
    }
    Ok(())
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Validate a new ingredient: non-empty name, non-negative quantity and
/// nutrition, positive unit weight if present.
pub fn validate_new_ingredient(ingredient: &NewIngredient) -> Result<()> {
    validate_name("Ingredient", &ingredient.name)?;
    if !is_non_negative(ingredient.quantity) {
        bail!("Ingredient quantity must be a non-negative number");
    }
    let n = &ingredient.nutrition;
    for (field, value) in [
        ("calories", n.calories),
        ("protein", n.protein),
        ("fat", n.fat),
        ("carbs", n.carbs),
    ] {
        if !is_non_negative(value) {
            bail!("{field} must be a non-negative number");
        }
    }
    if ingredient.unit_weight.is_some_and(|w| !w.is_finite() || w <= 0.0) {
        bail!("unit_weight must be greater than 0");
    }
    Ok(())
}
