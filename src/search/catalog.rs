//! Per-locale keyword indexes and their load status

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::DatasetConfig;
use crate::errors::{DatasetError, SearchError};
use crate::keyword_index::KeywordIndex;

/// Every configured locale is either searchable or degraded, never silently
/// missing
#[derive(Debug, Default)]
pub struct IndexCatalog {
    default_locale: String,
    indexes: HashMap<String, Arc<KeywordIndex>>,
    degraded: BTreeMap<String, String>,
}

impl IndexCatalog {
    pub fn new(default_locale: impl Into<String>) -> Self {
        Self {
            default_locale: default_locale.into(),
            ..Self::default()
        }
    }

    /// Load every configured dataset; failures degrade their locale only
    pub fn load(config: &DatasetConfig) -> Self {
        let mut catalog = Self::new(config.default_locale.clone());
        for (locale, path) in &config.paths {
            match KeywordIndex::load(path, locale) {
                Ok(index) => catalog.insert(index),
                Err(e) => catalog.mark_degraded(locale, &e),
            }
        }
        info!(
            "Keyword catalog ready: {} locale(s) searchable, {} degraded",
            catalog.indexes.len(),
            catalog.degraded.len()
        );
        catalog
    }

    /// `load` on a blocking worker so startup never stalls the caller
    pub async fn load_in_background(config: DatasetConfig) -> Self {
        let default_locale = config.default_locale.clone();
        match tokio::task::spawn_blocking(move || Self::load(&config)).await {
            Ok(catalog) => catalog,
            Err(e) => {
                error!("Keyword catalog loader failed: {}", e);
                let mut catalog = Self::new(default_locale.clone());
                catalog
                    .degraded
                    .insert(default_locale, format!("loader failed: {e}"));
                catalog
            }
        }
    }

    pub fn insert(&mut self, index: KeywordIndex) {
        let locale = index.locale().to_string();
        self.degraded.remove(&locale);
        self.indexes.insert(locale, Arc::new(index));
    }

    pub fn mark_degraded(&mut self, locale: &str, error: &DatasetError) {
        error!("Search disabled for locale '{}': {}", locale, error);
        self.indexes.remove(locale);
        self.degraded.insert(locale.to_string(), error.to_string());
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn get(&self, locale: &str) -> Result<Arc<KeywordIndex>, SearchError> {
        if let Some(index) = self.indexes.get(locale) {
            return Ok(Arc::clone(index));
        }
        match self.degraded.get(locale) {
            Some(reason) => Err(SearchError::Degraded {
                locale: locale.to_string(),
                reason: reason.clone(),
            }),
            None => Err(SearchError::UnknownLocale(locale.to_string())),
        }
    }

    pub fn is_degraded(&self, locale: &str) -> bool {
        self.degraded.contains_key(locale)
    }

    /// (locale, reason) for every locale whose dataset failed to load
    pub fn degraded(&self) -> impl Iterator<Item = (&str, &str)> {
        self.degraded
            .iter()
            .map(|(locale, reason)| (locale.as_str(), reason.as_str()))
    }

    pub fn locales(&self) -> Vec<&str> {
        let mut locales: Vec<&str> = self.indexes.keys().map(String::as_str).collect();
        locales.sort_unstable();
        locales
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyword_index::KeywordEntry;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_missing_dataset_degrades_locale() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("en.jsonl");
        std::fs::write(&good, "{\"keyword\":\"dog\",\"pictogram_id\":1}\n").unwrap();

        let config = DatasetConfig {
            default_locale: "en".to_string(),
            paths: [
                ("en".to_string(), good),
                ("sv".to_string(), PathBuf::from("/nope/sv.json")),
            ]
            .into_iter()
            .collect(),
        };

        let catalog = IndexCatalog::load(&config);
        assert_eq!(catalog.locales(), vec!["en"]);
        assert!(catalog.get("en").is_ok());
        assert!(matches!(
            catalog.get("sv"),
            Err(SearchError::Degraded { .. })
        ));
        assert_eq!(
            catalog.get("de").unwrap_err(),
            SearchError::UnknownLocale("de".to_string())
        );
        assert_eq!(catalog.degraded().count(), 1);
    }

    #[test]
    fn test_insert_clears_degraded() {
        let mut catalog = IndexCatalog::new("en");
        catalog.mark_degraded(
            "en",
            &DatasetError::Empty {
                path: PathBuf::from("en.json"),
            },
        );
        assert!(catalog.is_degraded("en"));

        let index = KeywordIndex::from_entries(
            "en",
            None,
            vec![KeywordEntry {
                keyword: "cat".to_string(),
                pictogram_id: 2,
                locale: "en".to_string(),
            }],
        )
        .unwrap();
        catalog.insert(index);
        assert!(!catalog.is_degraded("en"));
        assert!(catalog.get("en").is_ok());
    }
}
