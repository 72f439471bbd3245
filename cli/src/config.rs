use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

use larder_core::catalog::CatalogLoader;
use larder_core::models::Language;

const CATALOG_FILE: &str = "ingredients.json";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "larder").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let mut config = Config::with_data_dir(data_dir);
        if let Some(db) = std::env::var_os("LARDER_DB").filter(|v| !v.is_empty()) {
            config.db_path = PathBuf::from(db);
        }
        Ok(config)
    }

    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        let db_path = data_dir.join("larder.db");
        Config { db_path, data_dir }
    }

    /// Catalog shipped next to the executable, `<exe dir>/assets/ingredients.json`.
    pub fn package_asset_path() -> Option<PathBuf> {
        let exe = std::env::current_exe().ok()?;
        Some(exe.parent()?.join("assets").join(CATALOG_FILE))
    }

    /// Well-known places a catalog file may live, in lookup order.
    pub fn catalog_search_paths(&self) -> Vec<PathBuf> {
        vec![
            self.data_dir.join(CATALOG_FILE),
            PathBuf::from("data").join(CATALOG_FILE),
            PathBuf::from("/usr/share/larder").join(CATALOG_FILE),
        ]
    }

    pub fn catalog_loader(&self) -> CatalogLoader {
        let loader = CatalogLoader::new().with_search_paths(self.catalog_search_paths());
        match Self::package_asset_path() {
            Some(path) => loader.with_package_asset(path),
            None => loader,
        }
    }

    /// Catalog language from `LARDER_LANG`, then `LANG`, defaulting to English.
    pub fn language() -> Language {
        language_from(
            std::env::var("LARDER_LANG").ok(),
            std::env::var("LANG").ok(),
        )
    }
}

fn language_from(larder_lang: Option<String>, lang: Option<String>) -> Language {
    [larder_lang, lang]
        .into_iter()
        .flatten()
        .find(|v| !v.trim().is_empty())
        .map_or(Language::English, |v| Language::from_code(&v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_precedence() {
        assert_eq!(
            language_from(Some("de".to_string()), Some("pl_PL.UTF-8".to_string())),
            Language::German
        );
        assert_eq!(
            language_from(None, Some("pl_PL.UTF-8".to_string())),
            Language::Polish
        );
        assert_eq!(
            language_from(Some("  ".to_string()), Some("ko_KR".to_string())),
            Language::Korean
        );
    }

    #[test]
    fn test_language_from_defaults_to_english() {
        assert_eq!(language_from(None, None), Language::English);
        assert_eq!(language_from(None, Some("C".to_string())), Language::English);
    }

    #[test]
    fn test_with_data_dir_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path().to_path_buf());
        assert_eq!(config.db_path, dir.path().join("larder.db"));

        let paths = config.catalog_search_paths();
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[0], dir.path().join("ingredients.json"));
        assert_eq!(paths[2], PathBuf::from("/usr/share/larder/ingredients.json"));
    }

    #[test]
    fn test_package_asset_path_is_next_to_exe() {
        let path = Config::package_asset_path().unwrap();
        assert!(path.ends_with("assets/ingredients.json"));
    }
}
