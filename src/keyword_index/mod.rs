//! Offline keyword index
//!
//! Loads a localized keyword -> pictogram dataset once at startup and answers
//! ranked prefix / substring / token-overlap queries without touching the
//! network. The index is immutable after construction and is shared between
//! tasks behind an `Arc` without further synchronization.
//!
//! Match tiers, strongest first:
//!
//! - exact keyword
//! - prefix of a keyword (shorter remainders rank higher)
//! - prefix of a word inside a multi-word keyword
//! - substring of a keyword
//! - shared whole words with a multi-word query

pub mod entry;
pub mod index;
pub mod normalize;

pub use entry::{Dataset, KeywordEntry};
pub use index::{KeywordHit, KeywordIndex, MatchKind};
pub use normalize::Normalizer;
