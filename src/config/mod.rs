use anyhow::{Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

use crate::pictogram_cache::{EvictionPolicy, RetryPolicy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub branding: BrandingConfig,
}

/// Keyword datasets, one file per locale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default = "default_locale")]
    pub default_locale: String,
    /// locale -> dataset path (`.json` document or `.jsonl` entries)
    #[serde(default = "default_dataset_paths")]
    pub paths: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub directory: PathBuf,
    /// Byte budget that triggers LRU eviction
    #[serde(default = "default_cache_max_size_mb")]
    pub max_size_mb: u64,
    /// Entries untouched for longer than this are evicted regardless of size
    #[serde(default, with = "duration_serde::option_duration")]
    pub max_age: Option<Duration>,
    #[serde(default = "default_remote_base_url")]
    pub remote_base_url: String,
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout", with = "duration_serde::duration")]
    pub request_timeout: Duration,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default = "default_board_max_items")]
    pub max_items: usize,
    #[serde(default = "default_board_state_path")]
    pub state_path: PathBuf,
}

/// Caregivers' own photos, imported next to a JSON index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default = "default_library_dir")]
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Per-item deadline for resolving a pictogram during export
    #[serde(
        default = "default_export_resolve_timeout",
        with = "duration_serde::duration"
    )]
    pub resolve_timeout: Duration,
    #[serde(default = "default_grid_columns")]
    pub grid_columns: usize,
    #[serde(default = "default_grid_rows")]
    pub grid_rows: usize,
    #[serde(default = "default_thumbnail_px")]
    pub thumbnail_px: u32,
}

/// Metadata stamped into every export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandingConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_app_version")]
    pub version: String,
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default = "default_attribution")]
    pub attribution: String,
}

// Dataset defaults
fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

fn default_dataset_paths() -> BTreeMap<String, PathBuf> {
    let mut paths = BTreeMap::new();
    paths.insert(
        DEFAULT_LOCALE.to_string(),
        PathBuf::from(DEFAULT_DATASET_DIR).join(format!("{DEFAULT_LOCALE}.json")),
    );
    paths
}

// Cache defaults
fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_cache_max_size_mb() -> u64 {
    DEFAULT_CACHE_MAX_SIZE_MB
}

fn default_remote_base_url() -> String {
    DEFAULT_REMOTE_BASE_URL.to_string()
}

fn default_image_size() -> u32 {
    DEFAULT_IMAGE_SIZE
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
}

// Board defaults
fn default_board_max_items() -> usize {
    DEFAULT_BOARD_MAX_ITEMS
}

fn default_board_state_path() -> PathBuf {
    PathBuf::from(DEFAULT_BOARD_STATE_PATH)
}

// Library defaults
fn default_library_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LIBRARY_DIR)
}

// Export defaults
fn default_export_resolve_timeout() -> Duration {
    Duration::from_secs(DEFAULT_EXPORT_RESOLVE_TIMEOUT_SECS)
}

fn default_grid_columns() -> usize {
    DEFAULT_GRID_COLUMNS
}

fn default_grid_rows() -> usize {
    DEFAULT_GRID_ROWS
}

fn default_thumbnail_px() -> u32 {
    DEFAULT_THUMBNAIL_PX
}

// Branding defaults
fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_author() -> String {
    DEFAULT_AUTHOR.to_string()
}

fn default_attribution() -> String {
    DEFAULT_ATTRIBUTION.to_string()
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            default_locale: default_locale(),
            paths: default_dataset_paths(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_dir(),
            max_size_mb: default_cache_max_size_mb(),
            max_age: None,
            remote_base_url: default_remote_base_url(),
            image_size: default_image_size(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            retry: RetryPolicy::default(),
        }
    }
}

impl CacheConfig {
    pub fn max_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy {
            max_bytes: self.max_bytes(),
            max_age: self.max_age,
        }
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            max_items: default_board_max_items(),
            state_path: default_board_state_path(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            directory: default_library_dir(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            resolve_timeout: default_export_resolve_timeout(),
            grid_columns: default_grid_columns(),
            grid_rows: default_grid_rows(),
            thumbnail_px: default_thumbnail_px(),
        }
    }
}

impl ExportConfig {
    pub fn items_per_page(&self) -> usize {
        self.grid_columns * self.grid_rows
    }
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            version: default_app_version(),
            author: default_author(),
            attribution: default_attribution(),
        }
    }
}

impl Config {
    /// Load from `$PICTOBOARD_CONFIG` or `pictoboard.toml`
    pub fn load() -> Result<Self> {
        let config_file = std::env::var("PICTOBOARD_CONFIG")
            .unwrap_or_else(|_| "pictoboard.toml".to_string());
        Self::load_from_file(config_file)
    }

    /// Layer defaults, then the TOML file (if present), then `PICTOBOARD_*` env vars
    pub fn load_from_file(config_file: impl AsRef<Path>) -> Result<Self> {
        let config_file = config_file.as_ref();
        if !config_file.exists() {
            info!(
                "Config file {} not found, using defaults",
                config_file.display()
            );
        }

        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed("PICTOBOARD_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.max_size_mb == 0 {
            bail!("cache.max_size_mb must be greater than zero");
        }
        if self.board.max_items == 0 {
            bail!("board.max_items must be greater than zero");
        }
        if self.export.grid_columns == 0 || self.export.grid_rows == 0 {
            bail!("export.grid_columns and export.grid_rows must be greater than zero");
        }
        if self.export.thumbnail_px == 0 {
            bail!("export.thumbnail_px must be greater than zero");
        }
        if self.cache.retry.max_attempts == 0 {
            bail!("cache.retry.max_attempts must be greater than zero");
        }
        if !self.dataset.paths.contains_key(&self.dataset.default_locale) {
            bail!(
                "dataset.default_locale '{}' has no entry in dataset.paths",
                self.dataset.default_locale
            );
        }
        Ok(())
    }
}
