//! Search service
//!
//! Answers keyword queries per locale from the [`IndexCatalog`] and wraps
//! each hit with an [`ImageResolver`] so the caller can show results right
//! away and fetch thumbnails afterwards. Locales whose dataset failed to
//! load report [`SearchError::Degraded`](crate::errors::SearchError) instead
//! of an empty list.

pub mod catalog;
pub mod resolver;
pub mod service;

pub use catalog::IndexCatalog;
pub use resolver::{ImageResolver, ImageStatus};
pub use service::{SearchResponse, SearchResult, SearchService};
