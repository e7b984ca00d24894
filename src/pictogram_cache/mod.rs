//! Pictogram cache
//!
//! Turns a pictogram id into image bytes, reading the local cache directory
//! first and falling back to a remote [`PictogramSource`] on a miss. Each id
//! moves through [`FetchState`] `absent -> fetching -> present | failed`;
//! failed entries are retried only after an exponential backoff, and the
//! directory is kept under a byte budget by LRU eviction that never touches
//! pinned entries.

pub mod backoff;
pub mod entry;
pub mod eviction;
pub mod service;
pub mod source;

pub use backoff::RetryPolicy;
pub use entry::{CacheEntry, CachedPictogramMetadata, FailureRecord, FetchState};
pub use eviction::{EvictionCandidate, EvictionPolicy, EvictionStats, plan_eviction};
pub use service::{CacheStats, PictogramCache, PinGuard};
pub use source::{HttpPictogramSource, PictogramSource};
