use serde::{Deserialize, Deserializer};

use crate::models::Nutrition;

/// Minimum difference before a looked-up value replaces the stored one.
pub const NUTRITION_UPDATE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub products: Vec<ProductData>,
}

#[derive(Debug, Deserialize)]
pub struct ProductData {
    pub product_name: Option<String>,
    #[serde(default)]
    pub nutriments: Option<Nutriments>,
}

/// Per-100 g values. OpenFoodFacts sometimes sends numbers as strings, so
/// each field accepts either and treats anything else as missing.
#[derive(Debug, Default, Deserialize)]
#[allow(clippy::struct_field_names)]
pub struct Nutriments {
    #[serde(rename = "energy-kcal_100g", default, deserialize_with = "lenient_f64")]
    pub energy_kcal_100g: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub proteins_100g: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fat_100g: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub carbohydrates_100g: Option<f64>,
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let number = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|n| n.is_finite()))
}

/// Nutrition found by a lookup. `None` means the source had no usable value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NutritionFacts {
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub carbs: Option<f64>,
}

impl NutritionFacts {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calories.is_none()
            && self.protein.is_none()
            && self.fat.is_none()
            && self.carbs.is_none()
    }
}

impl From<Nutriments> for NutritionFacts {
    fn from(n: Nutriments) -> Self {
        Self {
            calories: n.energy_kcal_100g,
            protein: n.proteins_100g,
            fat: n.fat_100g,
            carbs: n.carbohydrates_100g,
        }
    }
}

/// Facts from the first product of a search, if it carries any values.
#[must_use]
pub fn nutrition_from_search(response: SearchResponse) -> Option<NutritionFacts> {
    let product = response.products.into_iter().next()?;
    let facts = NutritionFacts::from(product.nutriments?);
    (!facts.is_empty()).then_some(facts)
}

/// Overwrite each field of `current` whose looked-up value differs by more
/// than [`NUTRITION_UPDATE_THRESHOLD`]. Returns whether anything changed.
pub fn apply_nutrition(facts: &NutritionFacts, current: &mut Nutrition) -> bool {
    let mut changed = false;
    for (new, slot) in [
        (facts.calories, &mut current.calories),
        (facts.protein, &mut current.protein),
        (facts.fat, &mut current.fat),
        (facts.carbs, &mut current.carbs),
    ] {
        if let Some(value) = new.filter(|v| (v - *slot).abs() > NUTRITION_UPDATE_THRESHOLD) {
            *slot = value;
            changed = true;
        }
    }
    changed
}
