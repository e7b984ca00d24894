//! Offline pictogram search, pictogram image cache, ordered visual-schedule
//! boards with a personal picture library, and their CSV / JSON /
//! printable-document export.

pub mod board;
pub mod config;
pub mod errors;
pub mod export;
pub mod keyword_index;
pub mod library;
pub mod pictogram_cache;
pub mod search;
pub mod utils;

/// Stable numeric identifier of a pictogram in the remote repository
pub type PictogramId = u32;
