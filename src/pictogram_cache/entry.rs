//! Cache entry state machine and on-disk metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::time::Instant;

use super::backoff::RetryPolicy;
use crate::PictogramId;
use crate::errors::FetchError;

/// Where an entry is in its fetch lifecycle
///
/// Allowed transitions: `Absent -> Fetching -> {Present, Failed}`,
/// `Failed -> Fetching` once the backoff has expired, and back to `Absent`
/// on eviction, clear or manual refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchState {
    Absent,
    Fetching,
    Present,
    Failed,
}

/// Bookkeeping for consecutive failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub attempts: u32,
    pub last_error: FetchError,
    pub retry_after: Instant,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub pictogram_id: PictogramId,
    pub local_path: Option<PathBuf>,
    pub fetch_state: FetchState,
    pub last_accessed: DateTime<Utc>,
    pub size_bytes: u64,
    pub failure: Option<FailureRecord>,
    /// Monotonic access counter; breaks `last_accessed` ties for LRU ordering
    pub(crate) access_seq: u64,
}

impl CacheEntry {
    pub fn new(pictogram_id: PictogramId) -> Self {
        Self {
            pictogram_id,
            local_path: None,
            fetch_state: FetchState::Absent,
            last_accessed: Utc::now(),
            size_bytes: 0,
            failure: None,
            access_seq: 0,
        }
    }

    /// Entry discovered on disk at startup
    pub fn present(
        pictogram_id: PictogramId,
        local_path: PathBuf,
        size_bytes: u64,
        last_accessed: DateTime<Utc>,
    ) -> Self {
        Self {
            pictogram_id,
            local_path: Some(local_path),
            fetch_state: FetchState::Present,
            last_accessed,
            size_bytes,
            failure: None,
            access_seq: 0,
        }
    }

    pub fn touch(&mut self, access_seq: u64) {
        self.last_accessed = Utc::now();
        self.access_seq = access_seq;
    }

    /// Enter `Fetching`, honoring the failure backoff
    pub fn begin_fetch(&mut self, now: Instant, policy: &RetryPolicy) -> Result<(), FetchError> {
        match self.fetch_state {
            FetchState::Absent => {}
            FetchState::Failed => {
                if let Some(failure) = &self.failure {
                    if policy.exhausted(failure.attempts) {
                        return Err(FetchError::GaveUp {
                            id: self.pictogram_id,
                            attempts: failure.attempts,
                            last_error: failure.last_error.to_string(),
                        });
                    }
                    if now < failure.retry_after {
                        return Err(FetchError::BackingOff {
                            id: self.pictogram_id,
                            attempts: failure.attempts,
                            retry_in: failure.retry_after - now,
                            last_error: failure.last_error.to_string(),
                        });
                    }
                }
            }
            FetchState::Fetching | FetchState::Present => {
                debug_assert!(
                    false,
                    "begin_fetch from {:?} for pictogram {}",
                    self.fetch_state, self.pictogram_id
                );
                return Ok(());
            }
        }
        self.fetch_state = FetchState::Fetching;
        Ok(())
    }

    /// `Fetching -> Present`
    pub fn complete(&mut self, local_path: PathBuf, size_bytes: u64) {
        debug_assert_eq!(self.fetch_state, FetchState::Fetching);
        self.fetch_state = FetchState::Present;
        self.local_path = Some(local_path);
        self.size_bytes = size_bytes;
        self.failure = None;
    }

    /// `Fetching -> Failed`, scheduling the next allowed attempt
    pub fn fail(&mut self, error: FetchError, now: Instant, policy: &RetryPolicy) {
        debug_assert_eq!(self.fetch_state, FetchState::Fetching);
        let attempts = self.failure.as_ref().map_or(0, |f| f.attempts) + 1;
        self.fetch_state = FetchState::Failed;
        self.local_path = None;
        self.size_bytes = 0;
        self.failure = Some(FailureRecord {
            attempts,
            last_error: error,
            retry_after: now + policy.delay_for(attempts),
        });
    }

    /// Back to `Absent`, forgetting local data; failure history is kept
    /// unless `forget_failures` is set (manual refresh)
    pub fn reset(&mut self, forget_failures: bool) -> Option<PathBuf> {
        self.fetch_state = if !forget_failures && self.failure.is_some() {
            FetchState::Failed
        } else {
            FetchState::Absent
        };
        if forget_failures {
            self.failure = None;
        }
        self.size_bytes = 0;
        self.local_path.take()
    }
}

/// Sidecar JSON stored next to each cached image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPictogramMetadata {
    pub pictogram_id: PictogramId,
    pub source_url: String,
    pub fetched_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub sha256: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy::fixed(3, Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_fetching_present() {
        let mut entry = CacheEntry::new(1);
        entry.begin_fetch(Instant::now(), &policy()).unwrap();
        assert_eq!(entry.fetch_state, FetchState::Fetching);

        entry.complete(PathBuf::from("1.png"), 42);
        assert_eq!(entry.fetch_state, FetchState::Present);
        assert_eq!(entry.size_bytes, 42);
        assert!(entry.failure.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_waits_for_backoff() {
        let policy = policy();
        let mut entry = CacheEntry::new(2);
        entry.begin_fetch(Instant::now(), &policy).unwrap();
        entry.fail(FetchError::network(2, "down"), Instant::now(), &policy);
        assert_eq!(entry.fetch_state, FetchState::Failed);

        let err = entry.begin_fetch(Instant::now(), &policy).unwrap_err();
        assert!(matches!(err, FetchError::BackingOff { attempts: 1, .. }));
        assert_eq!(entry.fetch_state, FetchState::Failed);

        tokio::time::advance(Duration::from_secs(10)).await;
        entry.begin_fetch(Instant::now(), &policy).unwrap();
        assert_eq!(entry.fetch_state, FetchState::Fetching);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let policy = policy();
        let mut entry = CacheEntry::new(3);
        for _ in 0..3 {
            entry.begin_fetch(Instant::now(), &policy).unwrap();
            entry.fail(FetchError::NotFound { id: 3 }, Instant::now(), &policy);
            tokio::time::advance(Duration::from_secs(3600)).await;
        }

        let err = entry.begin_fetch(Instant::now(), &policy).unwrap_err();
        assert!(matches!(err, FetchError::GaveUp { attempts: 3, .. }));

        // manual refresh clears the history
        entry.reset(true);
        assert_eq!(entry.fetch_state, FetchState::Absent);
        assert!(entry.begin_fetch(Instant::now(), &policy).is_ok());
    }

    #[test]
    fn test_reset_returns_local_path() {
        let mut entry = CacheEntry::present(4, PathBuf::from("4.png"), 10, Utc::now());
        assert_eq!(entry.reset(false), Some(PathBuf::from("4.png")));
        assert_eq!(entry.fetch_state, FetchState::Absent);
        assert_eq!(entry.size_bytes, 0);
    }
}
