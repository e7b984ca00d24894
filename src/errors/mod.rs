//! Centralized error handling for pictoboard
//!
//! # Error Categories
//!
//! - **Dataset Errors**: keyword dataset missing or malformed (search disabled, app keeps running)
//! - **Fetch Errors**: a single pictogram image could not be fetched (retryable with backoff)
//! - **Capacity Errors**: board is full (user-actionable)
//! - **Not Found Errors**: stale item ids or positions
//! - **Corrupt State Errors**: persisted board unreadable (reset to an empty board)
//! - **Export Errors**: export aborted; the destination is left untouched
//! - **Library Errors**: a personal picture could not be imported or removed
//!
//! # Usage
//!
//! ```rust
//! use pictoboard::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for per-pictogram fetch results
pub type FetchResult<T> = Result<T, FetchError>;

/// Convenience type alias for export results
pub type ExportResult<T> = Result<T, ExportError>;

/// Convenience type alias for picture library results
pub type LibraryResult<T> = Result<T, LibraryError>;
