//! The bundled ingredient catalog: source format, name resolution, per-piece
//! normalization and the cascade of places the source is loaded from.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::models::{Language, NewIngredient, Nutrition, Unit};

pub const UNKNOWN_INGREDIENT: &str = "Unknown ingredient";

const EMBEDDED_CATALOG: &str = include_str!("../data/ingredients.json");

/// One entry of the catalog source file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub name_pl: Option<String>,
    #[serde(default)]
    pub name_en: Option<String>,
    #[serde(default)]
    pub name_de: Option<String>,
    #[serde(default)]
    pub name_es: Option<String>,
    #[serde(default)]
    pub name_fr: Option<String>,
    #[serde(default)]
    pub name_ko: Option<String>,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default = "default_amount")]
    pub amount: f64,
    #[serde(default = "default_unit", deserialize_with = "deserialize_unit")]
    pub unit: Unit,
    #[serde(default = "default_unit_weight")]
    pub unit_weight: f64,
}

fn default_amount() -> f64 {
    100.0
}

fn default_unit() -> Unit {
    Unit::Gram
}

fn default_unit_weight() -> f64 {
    1.0
}

fn deserialize_unit<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Unit, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map_or(Unit::Gram, |s| Unit::parse_lenient(&s)))
}

impl CatalogEntry {
    fn name_for(&self, language: Language) -> Option<&str> {
        match language {
            Language::Polish => self.name_pl.as_deref(),
            Language::English => self.name_en.as_deref(),
            Language::German => self.name_de.as_deref(),
            Language::Spanish => self.name_es.as_deref(),
            Language::French => self.name_fr.as_deref(),
            Language::Korean => self.name_ko.as_deref(),
        }
    }

    fn builtin(name_en: &str, name_pl: &str, nutrition: [f64; 4], unit: Unit, weight: f64) -> Self {
        let [calories, protein, fat, carbs] = nutrition;
        Self {
            name_pl: Some(name_pl.to_string()),
            name_en: Some(name_en.to_string()),
            name_de: None,
            name_es: None,
            name_fr: None,
            name_ko: None,
            calories,
            protein,
            fat,
            carbs,
            amount: if unit == Unit::Piece { 1.0 } else { 100.0 },
            unit,
            unit_weight: weight,
        }
    }
}

/// Display name for `language`: that language's name, else English, else
/// Polish, else [`UNKNOWN_INGREDIENT`]. Blank names are skipped.
#[must_use]
pub fn resolve_name(entry: &CatalogEntry, language: Language) -> String {
    [
        entry.name_for(language),
        entry.name_en.as_deref(),
        entry.name_pl.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|name| !name.is_empty())
    .map_or_else(|| UNKNOWN_INGREDIENT.to_string(), String::from)
}

/// Piece entries with a known weight carry per-piece values in the source;
/// rescale them to per 100 g. Everything else is stored unchanged.
#[must_use]
pub fn normalize_nutrition(entry: &CatalogEntry) -> Nutrition {
    let nutrition = Nutrition::new(entry.calories, entry.protein, entry.fat, entry.carbs);
    if entry.unit == Unit::Piece && entry.unit_weight > 0.0 {
        nutrition.scaled(100.0 / entry.unit_weight)
    } else {
        nutrition
    }
}

#[must_use]
pub fn entry_to_ingredient(entry: &CatalogEntry, language: Language) -> NewIngredient {
    let unit_weight =
        (entry.unit == Unit::Piece && entry.unit_weight > 0.0).then_some(entry.unit_weight);
    NewIngredient {
        name: resolve_name(entry, language),
        quantity: entry.amount,
        unit: entry.unit,
        recipe_id: None,
        nutrition: normalize_nutrition(entry),
        unit_weight,
    }
}

/// Last-resort catalog used when no source can be loaded.
#[must_use]
pub fn builtin_catalog() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::builtin("Tomato", "Pomidor", [18.0, 0.9, 0.2, 3.9], Unit::Gram, 1.0),
        CatalogEntry::builtin("Onion", "Cebula", [40.0, 1.1, 0.1, 9.3], Unit::Gram, 1.0),
        CatalogEntry::builtin("Potato", "Ziemniak", [77.0, 2.0, 0.1, 17.0], Unit::Gram, 1.0),
        CatalogEntry::builtin("Egg", "Jajko", [77.5, 6.5, 5.5, 0.6], Unit::Piece, 50.0),
        CatalogEntry::builtin("Milk", "Mleko", [64.0, 3.3, 3.6, 4.8], Unit::Milliliter, 1.0),
        CatalogEntry::builtin("White rice", "Ryż biały", [130.0, 2.7, 0.3, 28.2], Unit::Gram, 1.0),
        CatalogEntry::builtin(
            "Chicken breast",
            "Pierś z kurczaka",
            [165.0, 31.0, 3.6, 0.0],
            Unit::Gram,
            1.0,
        ),
        CatalogEntry::builtin("Butter", "Masło", [717.0, 0.9, 81.1, 0.1], Unit::Gram, 1.0),
        CatalogEntry::builtin("Wheat flour", "Mąka pszenna", [364.0, 10.3, 1.0, 76.3], Unit::Gram, 1.0),
        CatalogEntry::builtin("Olive oil", "Oliwa z oliwek", [884.0, 0.0, 100.0, 0.0], Unit::Milliliter, 1.0),
    ]
}

/// Where a loaded catalog came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogOrigin {
    Embedded,
    PackageAsset(PathBuf),
    FileSystem(PathBuf),
    BuiltIn,
}

impl fmt::Display for CatalogOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogOrigin::Embedded => f.write_str("embedded catalog"),
            CatalogOrigin::PackageAsset(path) => write!(f, "package asset {}", path.display()),
            CatalogOrigin::FileSystem(path) => write!(f, "file {}", path.display()),
            CatalogOrigin::BuiltIn => f.write_str("built-in list"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedCatalog {
    pub entries: Vec<CatalogEntry>,
    pub origin: CatalogOrigin,
}

pub fn parse_catalog(text: &str) -> Result<Vec<CatalogEntry>> {
    let entries: Vec<CatalogEntry> =
        serde_json::from_str(text).context("Invalid ingredient catalog JSON")?;
    if entries.is_empty() {
        bail!("Ingredient catalog contains no entries");
    }
    Ok(entries)
}

fn read_catalog_file(path: &Path) -> Result<Vec<CatalogEntry>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_catalog(&text)
}

/// Finds the catalog source. Tries the embedded copy, then the package asset,
/// then each search path in order, and finally falls back to [`builtin_catalog`].
#[derive(Debug, Clone)]
pub struct CatalogLoader {
    embedded: Option<&'static str>,
    package_asset: Option<PathBuf>,
    search_paths: Vec<PathBuf>,
}

impl Default for CatalogLoader {
    fn default() -> Self {
        Self {
            embedded: Some(EMBEDDED_CATALOG),
            package_asset: None,
            search_paths: Vec::new(),
        }
    }
}

impl CatalogLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn without_embedded(mut self) -> Self {
        self.embedded = None;
        self
    }

    #[must_use]
    pub fn with_embedded_source(mut self, text: &'static str) -> Self {
        self.embedded = Some(text);
        self
    }

    #[must_use]
    pub fn with_package_asset(mut self, path: PathBuf) -> Self {
        self.package_asset = Some(path);
        self
    }

    #[must_use]
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    #[must_use]
    pub fn load(&self) -> LoadedCatalog {
        if let Some(text) = self.embedded {
            match parse_catalog(text) {
                Ok(entries) => {
                    return LoadedCatalog {
                        entries,
                        origin: CatalogOrigin::Embedded,
                    };
                }
                Err(e) => warn!("Embedded ingredient catalog unusable: {e:#}"),
            }
        }

        if let Some(path) = &self.package_asset {
            match read_catalog_file(path) {
                Ok(entries) => {
                    return LoadedCatalog {
                        entries,
                        origin: CatalogOrigin::PackageAsset(path.clone()),
                    };
                }
                Err(e) => debug!("Package asset catalog unusable: {e:#}"),
            }
        }

        for path in &self.search_paths {
            match read_catalog_file(path) {
                Ok(entries) => {
                    return LoadedCatalog {
                        entries,
                        origin: CatalogOrigin::FileSystem(path.clone()),
                    };
                }
                Err(e) => debug!("Catalog candidate skipped: {e:#}"),
            }
        }

        warn!("No ingredient catalog source found, using the built-in list");
        LoadedCatalog {
            entries: builtin_catalog(),
            origin: CatalogOrigin::BuiltIn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(unit: Unit, unit_weight: f64, calories: f64) -> CatalogEntry {
        CatalogEntry {
            name_pl: Some("Jajko".to_string()),
            name_en: Some("Egg".to_string()),
            name_de: Some("Ei".to_string()),
            name_es: None,
            name_fr: Some("   ".to_string()),
            name_ko: None,
            calories,
            protein: 6.0,
            fat: 5.0,
            carbs: 0.5,
            amount: 1.0,
            unit,
            unit_weight,
        }
    }

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_embedded_catalog_parses() {
        let entries = parse_catalog(EMBEDDED_CATALOG).unwrap();
        assert!(entries.len() >= 30);
        assert!(entries.iter().all(|e| e.name_en.is_some()));
        assert!(entries.iter().any(|e| e.unit == Unit::Piece));
    }

    #[test]
    fn test_resolve_name_prefers_language() {
        let e = entry(Unit::Gram, 1.0, 10.0);
        assert_eq!(resolve_name(&e, Language::German), "Ei");
        assert_eq!(resolve_name(&e, Language::Polish), "Jajko");
    }

    #[test]
    fn test_resolve_name_falls_back_to_english_then_polish() {
        let mut e = entry(Unit::Gram, 1.0, 10.0);
        // Missing and blank names both fall through
        assert_eq!(resolve_name(&e, Language::Spanish), "Egg");
        assert_eq!(resolve_name(&e, Language::French), "Egg");

        e.name_en = Some(String::new());
        assert_eq!(resolve_name(&e, Language::Korean), "Jajko");

        e.name_pl = None;
        assert_eq!(resolve_name(&e, Language::Korean), UNKNOWN_INGREDIENT);
    }

    #[test]
    fn test_resolve_name_trims() {
        let mut e = entry(Unit::Gram, 1.0, 10.0);
        e.name_es = Some("  Huevo ".to_string());
        assert_eq!(resolve_name(&e, Language::Spanish), "Huevo");
    }

    #[test]
    fn test_normalize_piece_nutrition() {
        // 80 kcal per 50 g piece is 160 kcal per 100 g
        let n = normalize_nutrition(&entry(Unit::Piece, 50.0, 80.0));
        assert!((n.calories - 160.0).abs() < 1e-9);
        assert!((n.protein - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_leaves_other_units_alone() {
        let n = normalize_nutrition(&entry(Unit::Gram, 50.0, 80.0));
        assert_eq!(n.calories, 80.0);
        let n = normalize_nutrition(&entry(Unit::Piece, 0.0, 80.0));
        assert_eq!(n.calories, 80.0);
    }

    #[test]
    fn test_entry_to_ingredient_unit_weight() {
        let piece = entry_to_ingredient(&entry(Unit::Piece, 50.0, 80.0), Language::English);
        assert_eq!(piece.name, "Egg");
        assert_eq!(piece.unit_weight, Some(50.0));
        assert!(piece.recipe_id.is_none());

        let grams = entry_to_ingredient(&entry(Unit::Gram, 1.0, 80.0), Language::English);
        assert_eq!(grams.unit_weight, None);
    }

    #[test]
    fn test_entry_defaults_and_lenient_unit() {
        let entries = parse_catalog(
            r#"[
                {"name_en": "Flour"},
                {"name_en": "Egg", "unit": "PIECE", "unit_weight": 50, "calories": 78},
                {"name_en": "Pinch", "unit": "handful"},
                {"name_en": "Milk", "unit": "milliliter"}
            ]"#,
        )
        .unwrap();
        assert_eq!(entries[0].amount, 100.0);
        assert_eq!(entries[0].unit, Unit::Gram);
        assert_eq!(entries[0].unit_weight, 1.0);
        assert_eq!(entries[0].calories, 0.0);
        assert_eq!(entries[1].unit, Unit::Piece);
        assert_eq!(entries[2].unit, Unit::Piece);
        assert_eq!(entries[3].unit, Unit::Milliliter);
    }

    #[test]
    fn test_parse_catalog_rejects_empty_and_garbage() {
        assert!(parse_catalog("[]").is_err());
        assert!(parse_catalog("not json").is_err());
        assert!(parse_catalog("{}").is_err());
    }

    #[test]
    fn test_loader_uses_embedded_first() {
        let dir = tempfile::tempdir().unwrap();
        let asset = write_file(dir.path(), "asset.json", r#"[{"name_en": "Asset"}]"#);
        let loaded = CatalogLoader::new().with_package_asset(asset).load();
        assert_eq!(loaded.origin, CatalogOrigin::Embedded);
    }

    #[test]
    fn test_loader_falls_back_to_package_asset() {
        let dir = tempfile::tempdir().unwrap();
        let asset = write_file(dir.path(), "asset.json", r#"[{"name_en": "Asset"}]"#);
        let loaded = CatalogLoader::new()
            .with_embedded_source("{ broken")
            .with_package_asset(asset.clone())
            .load();
        assert_eq!(loaded.origin, CatalogOrigin::PackageAsset(asset));
        assert_eq!(loaded.entries[0].name_en.as_deref(), Some("Asset"));
    }

    #[test]
    fn test_loader_walks_search_paths_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let empty = write_file(dir.path(), "empty.json", "[]");
        let good = write_file(dir.path(), "good.json", r#"[{"name_en": "Found"}]"#);
        let later = write_file(dir.path(), "later.json", r#"[{"name_en": "Later"}]"#);
        let loaded = CatalogLoader::new()
            .without_embedded()
            .with_package_asset(dir.path().join("missing.json"))
            .with_search_paths(vec![dir.path().join("nope.json"), empty, good.clone(), later])
            .load();
        assert_eq!(loaded.origin, CatalogOrigin::FileSystem(good));
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].name_en.as_deref(), Some("Found"));
    }

    #[test]
    fn test_loader_builtin_when_everything_fails() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = CatalogLoader::new()
            .without_embedded()
            .with_search_paths(vec![dir.path().join("missing.json")])
            .load();
        assert_eq!(loaded.origin, CatalogOrigin::BuiltIn);
        assert_eq!(loaded.entries, builtin_catalog());
        assert!(!loaded.entries.is_empty());
    }

    #[test]
    fn test_builtin_catalog_names_resolve() {
        for e in builtin_catalog() {
            assert_ne!(resolve_name(&e, Language::French), UNKNOWN_INGREDIENT);
        }
    }
}
