//! Error type definitions for pictoboard
//!
//! Each component owns a narrow error enum. Component-local failures (a single
//! pictogram fetch) are reported inside results; structural failures (corrupt
//! dataset, corrupt persisted board) bubble up to `AppError` so the caller can
//! switch into a degraded mode.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::PictogramId;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Keyword dataset could not be loaded
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Pictogram image could not be fetched
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Board is full
    #[error("Capacity error: {0}")]
    Capacity(#[from] CapacityError),

    /// Referenced item or pictogram does not exist
    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    /// Persisted board state is unreadable
    #[error("Corrupt state: {0}")]
    CorruptState(#[from] CorruptStateError),

    /// Search could not be served
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Export could not be produced
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Picture library could not be read or changed
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Filesystem errors outside a more specific context
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Keyword dataset loading failures
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Dataset file does not exist or cannot be read
    #[error("Dataset unreadable at {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Dataset content is not valid JSON / JSON Lines
    #[error("Malformed dataset {path} (line {line}): {message}")]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// An entry declared a locale other than the dataset's
    #[error("Entry for keyword '{keyword}' has locale '{found}', dataset locale is '{expected}'")]
    LocaleMismatch {
        keyword: String,
        expected: String,
        found: String,
    },

    /// Keyword normalized to nothing
    #[error("Empty keyword for pictogram {pictogram_id}")]
    EmptyKeyword { pictogram_id: PictogramId },

    /// Dataset parsed but holds no entries
    #[error("Dataset {path} contains no keyword entries")]
    Empty { path: PathBuf },
}

/// Per-pictogram fetch failures
///
/// Cloneable so every caller waiting on the same in-flight fetch receives the
/// identical outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Remote repository answered but does not know the id
    #[error("Pictogram {id} not found at remote source")]
    NotFound { id: PictogramId },

    /// Network or HTTP-level failure
    #[error("Network failure fetching pictogram {id}: {message}")]
    Network { id: PictogramId, message: String },

    /// Remote returned something that is not an image
    #[error("Pictogram {id} payload is not a recognised image")]
    InvalidImage { id: PictogramId },

    /// Image fetched but could not be stored locally
    #[error("Failed to store pictogram {id}: {message}")]
    Storage { id: PictogramId, message: String },

    /// A previous failure is still inside its backoff window
    #[error("Pictogram {id} failed {attempts} time(s); retry in {retry_in:?}: {last_error}")]
    BackingOff {
        id: PictogramId,
        attempts: u32,
        retry_in: Duration,
        last_error: String,
    },

    /// Retry budget exhausted; only a manual refresh re-enables fetching
    #[error("Pictogram {id} gave up after {attempts} attempt(s): {last_error}")]
    GaveUp {
        id: PictogramId,
        attempts: u32,
        last_error: String,
    },

    /// Resolve did not complete within the caller's deadline
    #[error("Timed out resolving pictogram {id} after {timeout:?}")]
    Timeout { id: PictogramId, timeout: Duration },
}

impl FetchError {
    pub fn id(&self) -> PictogramId {
        match self {
            Self::NotFound { id }
            | Self::Network { id, .. }
            | Self::InvalidImage { id }
            | Self::Storage { id, .. }
            | Self::BackingOff { id, .. }
            | Self::GaveUp { id, .. }
            | Self::Timeout { id, .. } => *id,
        }
    }

    pub(crate) fn network<S: Into<String>>(id: PictogramId, message: S) -> Self {
        Self::Network {
            id,
            message: message.into(),
        }
    }

    pub(crate) fn storage<S: Into<String>>(id: PictogramId, message: S) -> Self {
        Self::Storage {
            id,
            message: message.into(),
        }
    }
}

/// Board capacity exceeded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Board '{board}' is full ({max_items} items)")]
pub struct CapacityError {
    pub board: String,
    pub max_items: usize,
}

/// Referenced entity is missing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("Board item {0} not found")]
    Item(Uuid),

    #[error("Position {position} out of range (board has {len} items)")]
    Position { position: usize, len: usize },

    #[error("Template '{0}' not found")]
    Template(String),
}

/// Persisted board cannot be trusted
#[derive(Error, Debug)]
pub enum CorruptStateError {
    #[error("Board state {path} is not valid JSON: {source}")]
    Unparseable {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Board state {path} has unsupported schema version {version}")]
    UnsupportedVersion { path: PathBuf, version: u32 },

    #[error("Board state {path} is inconsistent: {message}")]
    Inconsistent { path: PathBuf, message: String },

    #[error("Board state {path} could not be read: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Search could not be served for a locale
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// The locale's dataset failed to load; search is disabled for it
    #[error("Search disabled for locale '{locale}': {reason}")]
    Degraded { locale: String, reason: String },

    /// No dataset was configured for the locale
    #[error("No keyword dataset for locale '{0}'")]
    UnknownLocale(String),
}

/// Export failures (the destination is never left half-written)
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Export to {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Export serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Export to {path} was cancelled")]
    Cancelled { path: PathBuf },

    #[error("Destination {path} has no parent directory")]
    InvalidDestination { path: PathBuf },

    #[error("Import of {path} failed: {message}")]
    Import { path: PathBuf, message: String },
}

/// Personal picture library failures
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Unsupported image type for {path} (expected png, jpg, jpeg or svg)")]
    UnsupportedFormat { path: PathBuf },

    #[error("Unknown library category '{0}'")]
    UnknownCategory(String),

    #[error("Library image {0} not found")]
    NotFound(Uuid),

    #[error("Library index {path} is not valid JSON: {source}")]
    Unparseable {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Library file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LibraryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl ExportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_carries_id() {
        let err = FetchError::network(555, "connection reset");
        assert_eq!(err.id(), 555);
        assert!(err.to_string().contains("connection reset"));

        let err = FetchError::Timeout {
            id: 7,
            timeout: Duration::from_secs(2),
        };
        assert_eq!(err.id(), 7);
    }

    #[test]
    fn test_app_error_conversion() {
        let err: AppError = CapacityError {
            board: "Morning".to_string(),
            max_items: 3,
        }
        .into();
        assert!(matches!(err, AppError::Capacity(_)));
        assert_eq!(err.to_string(), "Capacity error: Board 'Morning' is full (3 items)");
    }
}
