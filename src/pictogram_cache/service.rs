use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backoff::RetryPolicy;
use super::entry::{CacheEntry, CachedPictogramMetadata, FetchState};
use super::eviction::{EvictionCandidate, EvictionPolicy, EvictionStats, plan_eviction};
use super::source::{HttpPictogramSource, PictogramSource};
use crate::PictogramId;
use crate::config::CacheConfig;
use crate::errors::{AppResult, FetchError, FetchResult};
use crate::utils::{format_bytes, write_atomic};

type Outcome = Option<FetchResult<PathBuf>>;

struct Slot {
    entry: CacheEntry,
    /// Present while a fetch task runs; every waiter subscribes to it
    inflight: Option<watch::Receiver<Outcome>>,
    pins: usize,
}

impl Slot {
    fn new(id: PictogramId) -> Self {
        Self {
            entry: CacheEntry::new(id),
            inflight: None,
            pins: 0,
        }
    }
}

struct CacheInner {
    directory: PathBuf,
    source: Arc<dyn PictogramSource>,
    retry: RetryPolicy,
    eviction: EvictionPolicy,
    slots: Mutex<HashMap<PictogramId, Slot>>,
    access_counter: AtomicU64,
    network_calls: AtomicU64,
}

impl CacheInner {
    fn slots(&self) -> MutexGuard<'_, HashMap<PictogramId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Claim {
    Ready(PathBuf),
    Wait(watch::Receiver<Outcome>),
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub present: usize,
    pub fetching: usize,
    pub failed: usize,
    pub absent: usize,
    pub pinned: usize,
    pub storage_usage_bytes: u64,
    pub network_calls: u64,
}

/// Local pictogram store backed by a remote source
///
/// Cheap to clone; clones share the same entries. Fetches run as spawned
/// tasks, so a caller that gives up (timeout, dropped future) never leaves an
/// entry stuck in `Fetching`.
#[derive(Clone)]
pub struct PictogramCache {
    inner: Arc<CacheInner>,
}

/// Keeps an entry safe from eviction and `clear` while held
pub struct PinGuard {
    cache: PictogramCache,
    id: PictogramId,
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        let mut slots = self.cache.inner.slots();
        if let Some(slot) = slots.get_mut(&self.id) {
            slot.pins = slot.pins.saturating_sub(1);
        }
    }
}

impl PictogramCache {
    pub fn new(
        directory: impl Into<PathBuf>,
        source: Arc<dyn PictogramSource>,
        retry: RetryPolicy,
        eviction: EvictionPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                directory: directory.into(),
                source,
                retry,
                eviction,
                slots: Mutex::new(HashMap::new()),
                access_counter: AtomicU64::new(0),
                network_calls: AtomicU64::new(0),
            }),
        }
    }

    /// HTTP-backed cache built from configuration
    pub fn from_config(config: &CacheConfig) -> AppResult<Self> {
        let source = HttpPictogramSource::from_config(config)?;
        Ok(Self::new(
            config.directory.clone(),
            Arc::new(source),
            config.retry.clone(),
            config.eviction_policy(),
        ))
    }

    /// Create the cache directory and load whatever is already on disk
    pub async fn initialize(&self) -> AppResult<usize> {
        info!(
            "Initializing pictogram cache at {}",
            self.inner.directory.display()
        );
        tokio::fs::create_dir_all(&self.inner.directory).await?;
        let loaded = self.scan().await?;
        Ok(loaded)
    }

    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.inner.eviction
    }

    /// Number of requests issued to the remote source so far
    pub fn network_calls(&self) -> u64 {
        self.inner.network_calls.load(Ordering::Relaxed)
    }

    /// Non-blocking view of an entry's state
    pub fn state(&self, id: PictogramId) -> FetchState {
        self.inner
            .slots()
            .get(&id)
            .map_or(FetchState::Absent, |slot| slot.entry.fetch_state)
    }

    pub fn entry(&self, id: PictogramId) -> Option<CacheEntry> {
        self.inner.slots().get(&id).map(|slot| slot.entry.clone())
    }

    pub fn pin(&self, id: PictogramId) -> PinGuard {
        let mut slots = self.inner.slots();
        slots.entry(id).or_insert_with(|| Slot::new(id)).pins += 1;
        PinGuard {
            cache: self.clone(),
            id,
        }
    }

    /// Make sure the image for `id` is on disk and return its path
    ///
    /// Concurrent calls for the same id share one network request and all
    /// receive its outcome. A failed entry answers `BackingOff` or `GaveUp`
    /// without touching the network until its retry window has passed.
    pub async fn fetch(&self, id: PictogramId) -> FetchResult<PathBuf> {
        match self.claim(id)? {
            Claim::Ready(path) => Ok(path),
            Claim::Wait(rx) => self.wait_for_outcome(id, rx).await,
        }
    }

    /// Image bytes for `id`, fetching on a miss
    ///
    /// The entry stays pinned from the first claim until the bytes are read,
    /// so eviction triggered by this or any other fetch cannot remove it.
    pub async fn resolve(&self, id: PictogramId) -> FetchResult<Bytes> {
        let _pin = self.pin(id);
        for _ in 0..2 {
            let path = self.fetch(id).await?;
            match tokio::fs::read(&path).await {
                Ok(data) => return Ok(Bytes::from(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(
                        "Cached file for pictogram {} vanished ({}), refetching",
                        id,
                        path.display()
                    );
                    self.forget_missing(id, &path);
                }
                Err(e) => return Err(FetchError::storage(id, e.to_string())),
            }
        }
        Err(FetchError::storage(id, "cached file disappeared twice"))
    }

    /// `resolve` bounded by a deadline; the fetch itself keeps running
    pub async fn resolve_with_timeout(
        &self,
        id: PictogramId,
        timeout: Duration,
    ) -> FetchResult<Bytes> {
        match tokio::time::timeout(timeout, self.resolve(id)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout { id, timeout }),
        }
    }

    /// Manual refresh: drop local data and failure history, then fetch again
    pub async fn refresh(&self, id: PictogramId) -> FetchResult<PathBuf> {
        let stale = {
            let mut slots = self.inner.slots();
            let slot = slots.entry(id).or_insert_with(|| Slot::new(id));
            if slot.entry.fetch_state == FetchState::Fetching {
                None
            } else {
                slot.entry.reset(true)
            }
        };
        if let Some(path) = stale {
            remove_cached_file(&path).await;
        }
        self.fetch(id).await
    }

    /// Warm the cache in the background; returns how many fetches were scheduled
    pub fn prefetch(&self, ids: impl IntoIterator<Item = PictogramId>) -> usize {
        let mut scheduled = 0;
        for id in ids {
            if self.state(id) == FetchState::Present {
                continue;
            }
            let cache = self.clone();
            tokio::spawn(async move {
                if let Err(e) = cache.fetch(id).await {
                    debug!("Prefetch of pictogram {} failed: {}", id, e);
                }
            });
            scheduled += 1;
        }
        scheduled
    }

    /// Fetch every id concurrently and wait for all outcomes, in input order
    pub async fn fetch_all(
        &self,
        ids: impl IntoIterator<Item = PictogramId>,
    ) -> Vec<(PictogramId, FetchResult<PathBuf>)> {
        futures::future::join_all(
            ids.into_iter()
                .map(|id| async move { (id, self.fetch(id).await) }),
        )
        .await
    }

    /// Drop least-recently-used entries until the byte budget holds
    pub async fn evict(&self, policy: &EvictionPolicy) -> EvictionStats {
        let start_time = std::time::Instant::now();
        let (paths, stats) = {
            let mut slots = self.inner.slots();
            let candidates = slots
                .values()
                .filter(|slot| slot.entry.fetch_state == FetchState::Present)
                .map(|slot| EvictionCandidate {
                    pictogram_id: slot.entry.pictogram_id,
                    size_bytes: slot.entry.size_bytes,
                    last_accessed: slot.entry.last_accessed,
                    access_seq: slot.entry.access_seq,
                    pinned: slot.pins > 0,
                })
                .collect();

            let (victims, stats) = plan_eviction(candidates, policy, Utc::now());
            let paths: Vec<PathBuf> = victims
                .iter()
                .filter_map(|id| slots.get_mut(id).and_then(|slot| slot.entry.reset(false)))
                .collect();

            // absent slots without pins or failure history carry no state
            slots.retain(|_, slot| {
                slot.pins > 0
                    || slot.inflight.is_some()
                    || slot.entry.fetch_state != FetchState::Absent
                    || slot.entry.failure.is_some()
            });
            (paths, stats)
        };

        for path in &paths {
            remove_cached_file(path).await;
        }

        if stats.entries_evicted > 0 {
            info!(
                "Pictogram cache eviction removed {} entries ({} freed, {} pinned skipped) in {:.2}s",
                stats.entries_evicted,
                format_bytes(stats.bytes_freed),
                stats.pinned_skipped,
                start_time.elapsed().as_secs_f64()
            );
        }
        stats
    }

    /// Remove every cached image that is not pinned or being fetched
    pub async fn clear(&self) -> usize {
        info!("Clearing pictogram cache");
        let paths: Vec<PathBuf> = {
            let mut slots = self.inner.slots();
            let removable: Vec<PictogramId> = slots
                .iter()
                .filter(|(_, slot)| {
                    slot.pins == 0 && slot.entry.fetch_state != FetchState::Fetching
                })
                .map(|(id, _)| *id)
                .collect();

            removable
                .into_iter()
                .filter_map(|id| slots.remove(&id).and_then(|slot| slot.entry.local_path))
                .collect()
        };

        for path in &paths {
            remove_cached_file(path).await;
        }
        info!("Cleared {} cached pictograms", paths.len());
        paths.len()
    }

    pub fn stats(&self) -> CacheStats {
        let slots = self.inner.slots();
        let mut stats = CacheStats {
            total_entries: slots.len(),
            network_calls: self.network_calls(),
            ..CacheStats::default()
        };
        for slot in slots.values() {
            match slot.entry.fetch_state {
                FetchState::Absent => stats.absent += 1,
                FetchState::Fetching => stats.fetching += 1,
                FetchState::Present => stats.present += 1,
                FetchState::Failed => stats.failed += 1,
            }
            if slot.pins > 0 {
                stats.pinned += 1;
            }
            stats.storage_usage_bytes += slot.entry.size_bytes;
        }
        stats
    }

    /// Rebuild entries from files already in the cache directory
    ///
    /// The newest file per id wins; older duplicates and leftover temp files
    /// are deleted.
    pub async fn scan(&self) -> AppResult<usize> {
        info!(
            "Scanning pictogram cache directory {}",
            self.inner.directory.display()
        );
        let start_time = std::time::Instant::now();

        let mut found: HashMap<PictogramId, (PathBuf, u64, std::time::SystemTime)> =
            HashMap::new();
        let mut read_dir = match tokio::fs::read_dir(&self.inner.directory).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        while let Some(dir_entry) = read_dir.next_entry().await? {
            let path = dir_entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.starts_with('.') {
                if file_name.ends_with(".tmp") {
                    let _ = tokio::fs::remove_file(&path).await;
                }
                continue;
            }
            if path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let Some(id) = parse_pictogram_id(&path) else {
                debug!("Ignoring unrecognised cache file {}", file_name);
                continue;
            };

            let metadata = match dir_entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!("Failed to get metadata for {}: {}", file_name, e);
                    continue;
                }
            };
            let modified = metadata.modified().unwrap_or(std::time::UNIX_EPOCH);

            let newer = found
                .get(&id)
                .is_none_or(|(_, _, existing)| modified > *existing);
            let superseded = if newer {
                found
                    .insert(id, (path, metadata.len(), modified))
                    .map(|(old, _, _)| old)
            } else {
                Some(path)
            };
            if let Some(old) = superseded {
                debug!("Removing superseded cache file {}", old.display());
                remove_cached_file(&old).await;
            }
        }

        let mut loaded = 0;
        let mut total_bytes = 0;
        for (id, (path, size, modified)) in found {
            let last_accessed = match read_metadata(&path).await {
                Some(metadata) => metadata.fetched_at,
                None => DateTime::<Utc>::from(modified),
            };

            let mut slots = self.inner.slots();
            let slot = slots.entry(id).or_insert_with(|| Slot::new(id));
            if matches!(
                slot.entry.fetch_state,
                FetchState::Absent | FetchState::Failed
            ) {
                slot.entry = CacheEntry::present(id, path, size, last_accessed);
                loaded += 1;
                total_bytes += size;
            }
        }

        info!(
            "Pictogram cache scan loaded {} entries ({}) in {:.2}s",
            loaded,
            format_bytes(total_bytes),
            start_time.elapsed().as_secs_f64()
        );
        Ok(loaded)
    }

    fn next_access_seq(&self) -> u64 {
        self.inner.access_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn claim(&self, id: PictogramId) -> FetchResult<Claim> {
        let seq = self.next_access_seq();
        let mut slots = self.inner.slots();
        let slot = slots.entry(id).or_insert_with(|| Slot::new(id));
        slot.entry.touch(seq);

        if slot.entry.fetch_state == FetchState::Present
            && let Some(path) = &slot.entry.local_path
        {
            return Ok(Claim::Ready(path.clone()));
        }
        if slot.entry.fetch_state == FetchState::Fetching
            && let Some(rx) = &slot.inflight
        {
            return Ok(Claim::Wait(rx.clone()));
        }
        if matches!(
            slot.entry.fetch_state,
            FetchState::Present | FetchState::Fetching
        ) {
            // inconsistent slot (no file or no task); start over
            slot.entry.reset(false);
        }

        slot.entry.begin_fetch(Instant::now(), &self.inner.retry)?;
        let (tx, rx) = watch::channel(None);
        slot.inflight = Some(rx.clone());
        drop(slots);

        let cache = self.clone();
        tokio::spawn(async move { cache.run_fetch(id, tx).await });
        Ok(Claim::Wait(rx))
    }

    async fn wait_for_outcome(
        &self,
        id: PictogramId,
        mut rx: watch::Receiver<Outcome>,
    ) -> FetchResult<PathBuf> {
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        match outcome {
            Some(result) => result,
            None => {
                let error = FetchError::storage(id, "fetch task ended without a result");
                self.abandon(id, &rx, error.clone());
                Err(error)
            }
        }
    }

    async fn run_fetch(self, id: PictogramId, tx: watch::Sender<Outcome>) {
        let start_time = std::time::Instant::now();
        let result = self.download(id).await;
        let outcome = self.finish_fetch(id, result);

        match &outcome {
            Ok(path) => debug!(
                "Fetched pictogram {} to {} in {}ms",
                id,
                path.display(),
                start_time.elapsed().as_millis()
            ),
            Err(e) => warn!("Failed to fetch pictogram {}: {}", id, e),
        }

        let fetched = outcome.is_ok();
        tx.send_replace(Some(outcome));

        if fetched && self.stats().storage_usage_bytes > self.inner.eviction.max_bytes {
            let policy = self.inner.eviction;
            self.evict(&policy).await;
        }
    }

    async fn download(&self, id: PictogramId) -> FetchResult<(PathBuf, u64)> {
        self.inner.network_calls.fetch_add(1, Ordering::Relaxed);
        let bytes = self.inner.source.fetch(id).await?;
        self.store(id, &bytes).await
    }

    fn finish_fetch(
        &self,
        id: PictogramId,
        result: FetchResult<(PathBuf, u64)>,
    ) -> FetchResult<PathBuf> {
        let mut slots = self.inner.slots();
        let slot = slots.entry(id).or_insert_with(|| Slot::new(id));
        slot.inflight = None;
        if slot.entry.fetch_state != FetchState::Fetching {
            slot.entry.fetch_state = FetchState::Fetching;
        }

        match result {
            Ok((path, size)) => {
                slot.entry.complete(path.clone(), size);
                Ok(path)
            }
            Err(e) => {
                slot.entry.fail(e.clone(), Instant::now(), &self.inner.retry);
                Err(e)
            }
        }
    }

    fn abandon(&self, id: PictogramId, rx: &watch::Receiver<Outcome>, error: FetchError) {
        let mut slots = self.inner.slots();
        if let Some(slot) = slots.get_mut(&id)
            && slot.entry.fetch_state == FetchState::Fetching
            && slot.inflight.as_ref().is_some_and(|r| r.same_channel(rx))
        {
            slot.inflight = None;
            slot.entry.fail(error, Instant::now(), &self.inner.retry);
        }
    }

    fn forget_missing(&self, id: PictogramId, path: &Path) {
        let mut slots = self.inner.slots();
        if let Some(slot) = slots.get_mut(&id)
            && slot.entry.fetch_state == FetchState::Present
            && slot.entry.local_path.as_deref() == Some(path)
        {
            slot.entry.reset(false);
        }
    }

    async fn store(&self, id: PictogramId, bytes: &[u8]) -> FetchResult<(PathBuf, u64)> {
        let format = image::guess_format(bytes).map_err(|_| FetchError::InvalidImage { id })?;
        let extension = format.extensions_str().first().copied().unwrap_or("img");

        let stem = format!("{id}-{}", Uuid::new_v4().simple());
        let path = self.inner.directory.join(format!("{stem}.{extension}"));
        let sidecar = self.inner.directory.join(format!("{stem}.json"));

        write_atomic(&path, bytes)
            .await
            .map_err(|e| FetchError::storage(id, e.to_string()))?;

        let metadata = CachedPictogramMetadata {
            pictogram_id: id,
            source_url: self.inner.source.locate(id),
            fetched_at: Utc::now(),
            size_bytes: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(bytes)),
        };
        let encoded = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| FetchError::storage(id, e.to_string()))?;
        if let Err(e) = write_atomic(&sidecar, &encoded).await {
            // the image alone is still usable
            warn!("Failed to write metadata for pictogram {}: {}", id, e);
        }

        Ok((path, bytes.len() as u64))
    }
}

/// `<id>-<uuid>.<ext>` -> id
fn parse_pictogram_id(path: &Path) -> Option<PictogramId> {
    let stem = path.file_stem()?.to_str()?;
    let (id, _) = stem.split_once('-')?;
    id.parse().ok()
}

fn sidecar_path(path: &Path) -> PathBuf {
    path.with_extension("json")
}

async fn read_metadata(path: &Path) -> Option<CachedPictogramMetadata> {
    let content = tokio::fs::read(sidecar_path(path)).await.ok()?;
    match serde_json::from_slice(&content) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            debug!("Failed to parse metadata for {}: {}", path.display(), e);
            None
        }
    }
}

async fn remove_cached_file(path: &Path) {
    for target in [path.to_path_buf(), sidecar_path(path)] {
        if let Err(e) = tokio::fs::remove_file(&target).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to remove cached file {}: {}", target.display(), e);
        }
    }
}
