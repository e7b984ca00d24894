use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

use super::catalog::IndexCatalog;
use super::resolver::ImageResolver;
use crate::PictogramId;
use crate::errors::SearchError;
use crate::keyword_index::KeywordHit;
use crate::pictogram_cache::PictogramCache;

const DEFAULT_MEMO_CAPACITY: usize = 64;

/// One ranked pictogram with a deferred image
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub pictogram_id: PictogramId,
    pub score: u32,
    /// Best-matching keyword, usable as a display label
    pub keyword: String,
    pub image: ImageResolver,
}

/// Results for one query, tagged with the sequence number it was issued under
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub sequence: u64,
    pub locale: String,
    pub query: String,
    pub results: Vec<SearchResult>,
}

type MemoKey = (String, String, usize);

/// Keyword search over the catalog, handing out lazy image resolvers
///
/// Every call takes a new sequence number. Only the response carrying the
/// latest number is current; `accept` and `search_latest` drop the rest so a
/// slow query can never overwrite the results of a newer one.
#[derive(Clone)]
pub struct SearchService {
    catalog: Arc<IndexCatalog>,
    cache: PictogramCache,
    sequence: Arc<AtomicU64>,
    memo: Arc<Mutex<LruCache<MemoKey, Arc<[KeywordHit]>>>>,
}

impl SearchService {
    pub fn new(catalog: Arc<IndexCatalog>, cache: PictogramCache) -> Self {
        Self::with_memo_capacity(catalog, cache, DEFAULT_MEMO_CAPACITY)
    }

    pub fn with_memo_capacity(
        catalog: Arc<IndexCatalog>,
        cache: PictogramCache,
        capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            catalog,
            cache,
            sequence: Arc::new(AtomicU64::new(0)),
            memo: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn catalog(&self) -> &IndexCatalog {
        &self.catalog
    }

    /// Issue the next query sequence number
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, sequence: u64) -> bool {
        sequence == self.latest_sequence()
    }

    /// Pass a response through only if no newer query has been issued since
    pub fn accept(&self, response: SearchResponse) -> Option<SearchResponse> {
        if self.is_current(response.sequence) {
            Some(response)
        } else {
            debug!(
                "Discarding stale results for '{}' (sequence {} < {})",
                response.query,
                response.sequence,
                self.latest_sequence()
            );
            None
        }
    }

    /// Ranked results for `text` in `locale`; images are not fetched
    pub fn search(
        &self,
        text: &str,
        locale: &str,
        limit: usize,
    ) -> Result<SearchResponse, SearchError> {
        let sequence = self.next_sequence();
        self.run(sequence, text, locale, limit)
    }

    /// Search on a blocking worker; `None` if a newer query superseded this one
    pub async fn search_latest(
        &self,
        text: &str,
        locale: &str,
        limit: usize,
    ) -> Result<Option<SearchResponse>, SearchError> {
        let sequence = self.next_sequence();
        let service = self.clone();
        let (query, query_locale) = (text.to_string(), locale.to_string());

        let response = tokio::task::spawn_blocking(move || {
            service.run(sequence, &query, &query_locale, limit)
        })
        .await
        .map_err(|e| SearchError::Degraded {
            locale: locale.to_string(),
            reason: format!("search worker failed: {e}"),
        })??;

        Ok(self.accept(response))
    }

    /// Start background fetches for the first `count` result images
    pub fn prefetch_images(&self, response: &SearchResponse, count: usize) -> usize {
        self.cache.prefetch(
            response
                .results
                .iter()
                .take(count)
                .map(|result| result.pictogram_id),
        )
    }

    fn run(
        &self,
        sequence: u64,
        text: &str,
        locale: &str,
        limit: usize,
    ) -> Result<SearchResponse, SearchError> {
        let index = self.catalog.get(locale)?;
        let normalized = index.normalizer().normalize(text);
        let key = (locale.to_string(), normalized, limit);

        let memoized = self
            .memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();

        let hits = match memoized {
            Some(hits) => {
                trace!("Search memo hit for '{}' ({})", text, locale);
                hits
            }
            None => {
                let hits: Arc<[KeywordHit]> = index.query(text, limit).into();
                self.memo
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .put(key, Arc::clone(&hits));
                hits
            }
        };

        let results = hits
            .iter()
            .map(|hit| SearchResult {
                pictogram_id: hit.pictogram_id,
                score: hit.score,
                keyword: hit.keyword.clone(),
                image: ImageResolver::new(hit.pictogram_id, self.cache.clone()),
            })
            .collect();

        Ok(SearchResponse {
            sequence,
            locale: locale.to_string(),
            query: text.to_string(),
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{DatasetError, FetchError, FetchResult};
    use crate::keyword_index::{KeywordEntry, KeywordIndex};
    use crate::pictogram_cache::{EvictionPolicy, PictogramSource, RetryPolicy};
    use crate::search::ImageStatus;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    struct OfflineExceptOne;

    #[async_trait]
    impl PictogramSource for OfflineExceptOne {
        async fn fetch(&self, id: PictogramId) -> FetchResult<Bytes> {
            if id == 101 {
                Ok(Bytes::from_static(b"\x89PNG\r\n\x1a\nrest"))
            } else {
                Err(FetchError::network(id, "offline"))
            }
        }

        fn locate(&self, id: PictogramId) -> String {
            format!("test://{id}")
        }
    }

    fn service(dir: &TempDir) -> SearchService {
        let entries = [("hund", 101), ("hundring", 102), ("katt", 103)]
            .into_iter()
            .map(|(keyword, pictogram_id)| KeywordEntry {
                keyword: keyword.to_string(),
                pictogram_id,
                locale: "sv".to_string(),
            })
            .collect();

        let mut catalog = IndexCatalog::new("sv");
        catalog.insert(KeywordIndex::from_entries("sv", None, entries).unwrap());
        catalog.mark_degraded(
            "en",
            &DatasetError::Empty {
                path: PathBuf::from("en.json"),
            },
        );

        let cache = PictogramCache::new(
            dir.path(),
            Arc::new(OfflineExceptOne),
            RetryPolicy::fixed(3, Duration::from_secs(60)),
            EvictionPolicy {
                max_bytes: u64::MAX,
                max_age: None,
            },
        );
        SearchService::new(Arc::new(catalog), cache)
    }

    #[tokio::test]
    async fn test_results_arrive_before_images() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let response = service.search("hund", "sv", 10).unwrap();
        let ids: Vec<_> = response.results.iter().map(|r| r.pictogram_id).collect();
        assert_eq!(ids, vec![101, 102]);
        assert!(response.results[0].score > response.results[1].score);
        assert_eq!(response.results[0].keyword, "hund");

        for result in &response.results {
            assert_eq!(result.image.status(), ImageStatus::NotYetTried);
        }
    }

    #[tokio::test]
    async fn test_failed_image_still_listed_with_distinct_status() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let response = service.search("hund", "sv", 10).unwrap();
        let [dog, ring] = &response.results[..] else {
            panic!("expected two results");
        };

        assert_eq!(dog.image.resolve().await.unwrap().len(), 12);
        assert_eq!(dog.image.status(), ImageStatus::Available);

        assert!(ring.image.resolve().await.is_err());
        assert!(matches!(
            ring.image.status(),
            ImageStatus::Failed(FetchError::Network { id: 102, .. })
        ));

        // still in the next result set
        let again = service.search("hundr", "sv", 10).unwrap();
        assert_eq!(again.results[0].pictogram_id, 102);
    }

    #[tokio::test]
    async fn test_degraded_and_unknown_locales() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        assert!(matches!(
            service.search("dog", "en", 5),
            Err(SearchError::Degraded { .. })
        ));
        assert_eq!(
            service.search("dog", "fr", 5).unwrap_err(),
            SearchError::UnknownLocale("fr".to_string())
        );
    }

    #[tokio::test]
    async fn test_stale_responses_are_discarded() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let first = service.search("h", "sv", 10).unwrap();
        let second = service.search("hu", "sv", 10).unwrap();
        assert!(second.sequence > first.sequence);

        assert!(service.accept(first).is_none());
        assert!(service.accept(second).is_some());
    }

    #[tokio::test]
    async fn test_search_latest_returns_current_result() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let response = service.search_latest("katt", "sv", 5).await.unwrap().unwrap();
        assert_eq!(response.results[0].pictogram_id, 103);
        assert!(service.is_current(response.sequence));
    }

    #[tokio::test]
    async fn test_memo_returns_identical_results() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let a = service.search("HUND", "sv", 10).unwrap();
        let b = service.search("hund", "sv", 10).unwrap();
        let ranked = |r: &SearchResponse| {
            r.results
                .iter()
                .map(|x| (x.pictogram_id, x.score))
                .collect::<Vec<_>>()
        };
        assert_eq!(ranked(&a), ranked(&b));
    }
}
