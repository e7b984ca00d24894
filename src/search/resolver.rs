//! Deferred image access for search results

use bytes::Bytes;
use std::fmt;
use std::time::Duration;

use crate::PictogramId;
use crate::errors::{FetchError, FetchResult};
use crate::pictogram_cache::{FetchState, PictogramCache};

/// What the cache currently knows about a result's image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageStatus {
    NotYetTried,
    Fetching,
    Available,
    Failed(FetchError),
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotYetTried => write!(f, "not fetched"),
            Self::Fetching => write!(f, "fetching"),
            Self::Available => write!(f, "cached"),
            Self::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// Produces image bytes only when invoked
///
/// Results are handed out before any image is fetched; callers render
/// placeholders from `status()` and backfill with `resolve()`.
#[derive(Clone)]
pub struct ImageResolver {
    pictogram_id: PictogramId,
    cache: PictogramCache,
}

impl ImageResolver {
    pub fn new(pictogram_id: PictogramId, cache: PictogramCache) -> Self {
        Self {
            pictogram_id,
            cache,
        }
    }

    pub fn pictogram_id(&self) -> PictogramId {
        self.pictogram_id
    }

    pub fn status(&self) -> ImageStatus {
        let Some(entry) = self.cache.entry(self.pictogram_id) else {
            return ImageStatus::NotYetTried;
        };
        match entry.fetch_state {
            FetchState::Absent => ImageStatus::NotYetTried,
            FetchState::Fetching => ImageStatus::Fetching,
            FetchState::Present => ImageStatus::Available,
            FetchState::Failed => entry
                .failure
                .map_or(ImageStatus::NotYetTried, |f| ImageStatus::Failed(f.last_error)),
        }
    }

    pub async fn resolve(&self) -> FetchResult<Bytes> {
        self.cache.resolve(self.pictogram_id).await
    }

    pub async fn resolve_with_timeout(&self, timeout: Duration) -> FetchResult<Bytes> {
        self.cache
            .resolve_with_timeout(self.pictogram_id, timeout)
            .await
    }
}

impl fmt::Debug for ImageResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageResolver")
            .field("pictogram_id", &self.pictogram_id)
            .finish()
    }
}
