//! Filesystem cache of elevation tiles.
//!
//! A tile is cached when `<cache_dir>/<key>.tif` exists (and, when a size floor
//! is configured, is at least that large). There is no manifest: the file is
//! the entry.
//!
//! ## Thread Safety
//!
//! `TileCache` can be shared between threads:
//! - Different tiles are downloaded concurrently
//! - Multiple threads requesting the same tile coordinate, with only one
//!   performing the download while others wait for its outcome
//! - Cached tiles are served immediately without blocking

use crate::tile::{TileGrid, TileKey};
use crate::{DemError, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use tnm_common::{NullSink, ProgressEvent, ProgressSink};
use tnm_fetch::Fetcher;
use tnm_metrics::{metric_defs, metrics};
use tracing::{debug, warn};

/// Metric label value for elevation tiles.
const CACHE_KIND: &str = "dem";

/// Status of a tile download in progress.
#[derive(Clone)]
enum DownloadStatus {
    /// Download is in progress.
    InProgress,
    /// Download completed successfully.
    Complete,
    /// Download failed with an error message.
    Failed(String),
}

/// One in-flight download and the number of threads waiting on it.
struct InFlight {
    status: DownloadStatus,
    waiters: usize,
}

/// Tracks in-flight downloads to prevent duplicate requests.
#[derive(Default)]
struct DownloadTracker {
    /// Only contains entries for tiles being downloaded or whose outcome has
    /// not yet been collected by every waiter.
    in_flight: HashMap<TileKey, InFlight>,
}

/// Download statistics for a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    /// Number of tiles downloaded this session.
    pub tiles_downloaded: usize,
    /// Total bytes downloaded this session.
    pub bytes_downloaded: u64,
}

/// Key to local-file cache in front of a [`Fetcher`].
pub struct TileCache {
    /// Directory holding `<key>.tif` files.
    cache_dir: PathBuf,
    /// Remote naming.
    grid: TileGrid,
    /// Byte transfer.
    fetcher: Arc<dyn Fetcher>,
    /// Files smaller than this are treated as missing.
    min_bytes: u64,
    /// Fan `materialize_all` out over the rayon pool.
    parallel: bool,
    /// Tracks which tiles are currently being downloaded.
    download_tracker: Mutex<DownloadTracker>,
    /// Condition variable for waiting on downloads.
    download_complete: Condvar,
    /// Number of tiles downloaded this session.
    tiles_downloaded: AtomicUsize,
    /// Total bytes downloaded this session.
    bytes_downloaded: AtomicU64,
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("cache_dir", &self.cache_dir)
            .field("grid", &self.grid)
            .field("min_bytes", &self.min_bytes)
            .field("parallel", &self.parallel)
            .finish()
    }
}

impl TileCache {
    /// Create a cache rooted at `cache_dir`. The directory is created on first use.
    pub fn new<P: AsRef<Path>>(cache_dir: P, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            grid: TileGrid::default(),
            fetcher,
            min_bytes: 0,
            parallel: false,
            download_tracker: Mutex::new(DownloadTracker::default()),
            download_complete: Condvar::new(),
            tiles_downloaded: AtomicUsize::new(0),
            bytes_downloaded: AtomicU64::new(0),
        }
    }

    /// Use a different remote grid.
    pub fn with_grid(mut self, grid: TileGrid) -> Self {
        self.grid = grid;
        self
    }

    /// Treat cached files smaller than `min_bytes` as missing.
    pub fn with_min_bytes(mut self, min_bytes: u64) -> Self {
        self.min_bytes = min_bytes;
        self
    }

    /// Download tiles concurrently in [`materialize_all`](Self::materialize_all).
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Get the cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the remote grid.
    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Get the cache path for a tile, whether or not it exists.
    pub fn cache_path(&self, key: &TileKey) -> PathBuf {
        self.cache_dir.join(self.grid.cache_file_name(key))
    }

    /// Check if a tile is cached locally.
    pub fn is_cached(&self, key: &TileKey) -> bool {
        fs::metadata(self.cache_path(key))
            .map(|meta| meta.is_file() && meta.len() >= self.min_bytes)
            .unwrap_or(false)
    }

    /// Get download statistics for this session.
    pub fn download_stats(&self) -> DownloadStats {
        DownloadStats {
            tiles_downloaded: self.tiles_downloaded.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
        }
    }

    /// Ensure a tile is on disk and return its path.
    pub fn materialize(&self, key: &TileKey) -> Result<PathBuf> {
        self.materialize_with_sink(key, &NullSink)
    }

    /// Ensure a tile is on disk, reporting progress to `sink`.
    ///
    /// This method is thread-safe. If multiple threads request the same tile:
    /// - The first thread will perform the download
    /// - Other threads will wait for the download and share its outcome
    /// - Different tiles can be downloaded concurrently
    pub fn materialize_with_sink(&self, key: &TileKey, sink: &dyn ProgressSink) -> Result<PathBuf> {
        fs::create_dir_all(&self.cache_dir).map_err(DemError::io(&self.cache_dir))?;
        let cache_path = self.cache_path(key);

        // Fast path: no locking for a plain cache hit
        if self.check_cached(key, &cache_path, sink)? {
            return Ok(cache_path);
        }

        let mut tracker = self.lock_tracker()?;
        let mut waiting = false;
        loop {
            let Some(entry) = tracker.in_flight.get_mut(key) else {
                break;
            };

            match entry.status.clone() {
                DownloadStatus::InProgress => {
                    // Another thread is downloading this tile, wait for it
                    if !waiting {
                        entry.waiters += 1;
                        waiting = true;
                    }
                    tracker = self
                        .download_complete
                        .wait(tracker)
                        .map_err(|_| DemError::CacheLockPoisoned)?;
                }
                finished => {
                    if waiting {
                        entry.waiters -= 1;
                    }
                    if entry.waiters == 0 {
                        tracker.in_flight.remove(key);
                    }
                    return match finished {
                        DownloadStatus::Failed(reason) => Err(DemError::FetchFailure {
                            key: key.to_string(),
                            url: self.grid.url(key),
                            reason,
                        }),
                        _ => Ok(cache_path),
                    };
                }
            }
        }

        // Check cache again (might have been downloaded before we took the lock)
        if self.check_cached(key, &cache_path, sink)? {
            return Ok(cache_path);
        }
        tracker.in_flight.insert(
            *key,
            InFlight {
                status: DownloadStatus::InProgress,
                waiters: 0,
            },
        );
        drop(tracker);

        // We are responsible for downloading this tile; other tiles proceed concurrently
        let result = self.download(key, &cache_path, sink);

        {
            let mut tracker = self.lock_tracker()?;
            let has_waiters = tracker
                .in_flight
                .get(key)
                .map_or(false, |entry| entry.waiters > 0);
            if has_waiters {
                if let Some(entry) = tracker.in_flight.get_mut(key) {
                    entry.status = match &result {
                        Ok(_) => DownloadStatus::Complete,
                        Err(e) => DownloadStatus::Failed(failure_reason(e)),
                    };
                }
            } else {
                tracker.in_flight.remove(key);
            }
        }
        self.download_complete.notify_all();

        result
    }

    /// Materialize every key, in input order, stopping at the first failure.
    ///
    /// In parallel mode every key is attempted and the first failure in input
    /// order is reported.
    pub fn materialize_all(&self, keys: &[TileKey], sink: &dyn ProgressSink) -> Result<Vec<PathBuf>> {
        if self.parallel {
            let results: Vec<Result<PathBuf>> = keys
                .par_iter()
                .map(|key| self.materialize_with_sink(key, sink))
                .collect();
            results.into_iter().collect()
        } else {
            keys.iter()
                .map(|key| self.materialize_with_sink(key, sink))
                .collect()
        }
    }

    fn lock_tracker(&self) -> Result<MutexGuard<'_, DownloadTracker>> {
        self.download_tracker
            .lock()
            .map_err(|_| DemError::CacheLockPoisoned)
    }

    /// Report a hit for a usable file; remove an undersized one.
    fn check_cached(&self, key: &TileKey, path: &Path, sink: &dyn ProgressSink) -> Result<bool> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(DemError::io(path)(e)),
        };

        if meta.len() >= self.min_bytes {
            metrics::counter!(metric_defs::CACHE_HITS.name, metric_defs::KIND_LABEL => CACHE_KIND)
                .increment(1);
            debug!(key = %key, path = %path.display(), "Tile cache hit");
            sink.emit(&ProgressEvent::CacheHit {
                key: key.to_string(),
                path: path.to_path_buf(),
            });
            return Ok(true);
        }

        metrics::counter!(metric_defs::CACHE_REJECTED.name, metric_defs::KIND_LABEL => CACHE_KIND)
            .increment(1);
        warn!(
            key = %key,
            bytes = meta.len(),
            min_bytes = self.min_bytes,
            "Cached tile below size floor, fetching again"
        );
        sink.emit(&ProgressEvent::CacheRejected {
            key: key.to_string(),
            path: path.to_path_buf(),
            bytes: meta.len(),
        });
        fs::remove_file(path).map_err(DemError::io(path))?;
        Ok(false)
    }

    /// Internal method to perform the actual tile download.
    fn download(&self, key: &TileKey, cache_path: &Path, sink: &dyn ProgressSink) -> Result<PathBuf> {
        let url = self.grid.url(key);
        metrics::counter!(metric_defs::CACHE_MISSES.name, metric_defs::KIND_LABEL => CACHE_KIND)
            .increment(1);
        sink.emit(&ProgressEvent::FetchStarted {
            key: key.to_string(),
            url: url.clone(),
        });

        match self.fetcher.fetch(&url, cache_path) {
            Ok(bytes) => {
                self.tiles_downloaded.fetch_add(1, Ordering::Relaxed);
                self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
                sink.emit(&ProgressEvent::FetchCompleted {
                    key: key.to_string(),
                    path: cache_path.to_path_buf(),
                    bytes,
                });
                Ok(cache_path.to_path_buf())
            }
            Err(e) => {
                warn!(key = %key, url = %url, error = %e, "Tile download failed");
                sink.emit(&ProgressEvent::FetchFailed {
                    key: key.to_string(),
                    url: url.clone(),
                    reason: e.to_string(),
                });
                Err(DemError::FetchFailure {
                    key: key.to_string(),
                    url,
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn failure_reason(error: &DemError) -> String {
    match error {
        DemError::FetchFailure { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tnm_common::CollectingSink;
    use tnm_fetch::FetchError;

    /// Writes the URL as the file body; fails for URLs containing `fail`.
    #[derive(Default)]
    struct StubFetcher {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl Fetcher for StubFetcher {
        fn fetch(&self, url: &str, dest: &Path) -> tnm_fetch::Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if url.contains("fail") {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                });
            }
            fs::create_dir_all(dest.parent().unwrap()).unwrap();
            fs::write(dest, url.as_bytes()).unwrap();
            Ok(url.len() as u64)
        }
    }

    fn cache_with(dir: &Path, fetcher: Arc<StubFetcher>) -> TileCache {
        TileCache::new(dir.join("dem"), fetcher)
    }

    #[test]
    fn test_cache_path() {
        let cache = TileCache::new("/data/extracted/dem", Arc::new(StubFetcher::default()));
        assert_eq!(
            cache.cache_path(&TileKey::new(42, -72)),
            PathBuf::from("/data/extracted/dem/n42w072.tif")
        );
    }

    #[test]
    fn test_materialize_fetches_once() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(StubFetcher::default());
        let cache = cache_with(dir.path(), fetcher.clone());
        let key = TileKey::new(42, -72);

        assert!(!cache.is_cached(&key));
        let first = cache.materialize(&key).unwrap();
        let second = cache.materialize(&key).unwrap();

        assert_eq!(first, second);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_cached(&key));
        assert_eq!(cache.download_stats().tiles_downloaded, 1);
    }

    #[test]
    fn test_failure_leaves_no_entry() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(StubFetcher::default());
        let cache = cache_with(dir.path(), fetcher.clone()).with_grid(TileGrid {
            base_url: "http://fail.invalid".to_string(),
            ..TileGrid::default()
        });
        let key = TileKey::new(42, -72);
        let sink = CollectingSink::new();

        let err = cache.materialize_with_sink(&key, &sink).unwrap_err();
        assert!(matches!(err, DemError::FetchFailure { ref key, .. } if key == "n42w072"));
        assert!(!cache.cache_path(&key).exists());
        assert_eq!(
            sink.count(|e| matches!(e, ProgressEvent::FetchFailed { .. })),
            1
        );

        // A later call tries again instead of replaying the old failure
        assert!(cache.materialize(&key).is_err());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_size_floor_rejects_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(StubFetcher::default());
        let cache = cache_with(dir.path(), fetcher.clone()).with_min_bytes(16);
        let key = TileKey::new(42, -72);

        fs::create_dir_all(cache.cache_dir()).unwrap();
        fs::write(cache.cache_path(&key), b"tiny").unwrap();
        assert!(!cache.is_cached(&key));

        let sink = CollectingSink::new();
        cache.materialize_with_sink(&key, &sink).unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            sink.count(|e| matches!(e, ProgressEvent::CacheRejected { bytes: 4, .. })),
            1
        );
        assert!(cache.is_cached(&key));
    }

    #[test]
    fn test_concurrent_requests_share_download() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(StubFetcher {
            delay: Duration::from_millis(100),
            ..StubFetcher::default()
        });
        let cache = cache_with(dir.path(), fetcher.clone());
        let key = TileKey::new(42, -72);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| cache.materialize(&key).unwrap());
            }
        });

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(cache.tracker_is_empty());
    }

    #[test]
    fn test_materialize_all_parallel_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(StubFetcher::default());
        let cache = cache_with(dir.path(), fetcher.clone()).with_parallel(true);
        let keys = [
            TileKey::new(42, -103),
            TileKey::new(42, -102),
            TileKey::new(43, -103),
            TileKey::new(43, -102),
        ];

        let paths = cache.materialize_all(&keys, &NullSink).unwrap();

        let expected: Vec<PathBuf> = keys.iter().map(|k| cache.cache_path(k)).collect();
        assert_eq!(paths, expected);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 4);
    }

    impl TileCache {
        fn tracker_is_empty(&self) -> bool {
            self.download_tracker.lock().unwrap().in_flight.is_empty()
        }
    }
}
