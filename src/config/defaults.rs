/// Configuration default values
///
/// All defaults live here so they can be changed in one place.
// Dataset defaults
pub const DEFAULT_LOCALE: &str = "en";
pub const DEFAULT_DATASET_DIR: &str = "./data/keywords";

// Pictogram cache defaults
pub const DEFAULT_CACHE_DIR: &str = "./data/pictograms";
pub const DEFAULT_CACHE_MAX_SIZE_MB: u64 = 256;
pub const DEFAULT_REMOTE_BASE_URL: &str = "https://static.arasaac.org/pictograms";
pub const DEFAULT_IMAGE_SIZE: u32 = 500;
pub const DEFAULT_USER_AGENT: &str = concat!("pictoboard/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

// Fetch retry defaults
pub const DEFAULT_FETCH_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_FETCH_INITIAL_DELAY_MS: u64 = 2_000;
pub const DEFAULT_FETCH_MAX_DELAY_SECS: u64 = 300;
pub const DEFAULT_FETCH_BACKOFF_MULTIPLIER: f64 = 2.0;

// Board defaults
pub const DEFAULT_BOARD_MAX_ITEMS: usize = 200;
pub const DEFAULT_BOARD_STATE_PATH: &str = "./data/board.json";

// Picture library defaults
pub const DEFAULT_LIBRARY_DIR: &str = "./data/library";

// Export defaults
pub const DEFAULT_EXPORT_RESOLVE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_GRID_COLUMNS: usize = 3;
pub const DEFAULT_GRID_ROWS: usize = 4;
pub const DEFAULT_THUMBNAIL_PX: u32 = 160;

// Branding defaults
pub const DEFAULT_APP_NAME: &str = "Pictoboard";
pub const DEFAULT_AUTHOR: &str = "Pictoboard Contributors";
pub const DEFAULT_ATTRIBUTION: &str = "Pictograms by Sergio Palao, from ARASAAC (https://arasaac.org), licensed under CC BY-NC-SA 3.0";
