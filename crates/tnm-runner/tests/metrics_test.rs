//! Metrics integration tests for the tnm toolkit.
//!
//! Each run is wrapped in a thread-local debugging recorder, so the tests do
//! not share the global recorder and every job runs sequentially on the test
//! thread.

use std::collections::HashMap;
use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use tnm_common::{BoundingBox, NullSink};
use tnm_dem::{fetch_and_compose_raster, Compositor, RasterTool, TileCache, TileGrid, TileKey};
use tnm_fetch::{FetchConfig, Fetcher, HttpFetcher};
use tnm_metrics::metrics;
use tnm_topo::{IndexRecord, QuadrangleJob, QuadrangleKey, SpatialIndex};

// ============================================================================
// Capture
// ============================================================================

/// Metric values keyed by `name{label=value,...}`.
struct Captured(HashMap<String, DebugValue>);

impl Captured {
    fn counter(&self, id: &str) -> u64 {
        match self.0.get(id) {
            Some(DebugValue::Counter(value)) => *value,
            None => 0,
            Some(other) => panic!("{} is not a counter: {:?}", id, other),
        }
    }

    fn histogram(&self, id: &str) -> Vec<f64> {
        match self.0.get(id) {
            Some(DebugValue::Histogram(values)) => values.iter().map(|v| v.0).collect(),
            None => Vec::new(),
            Some(other) => panic!("{} is not a histogram: {:?}", id, other),
        }
    }
}

/// Run `f` with a fresh local recorder and return what it recorded.
fn capture<T>(f: impl FnOnce() -> T) -> (T, Captured) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let out = metrics::with_local_recorder(&recorder, f);

    let values = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, value)| {
            let key = key.key();
            let mut labels: Vec<String> = key
                .labels()
                .map(|label| format!("{}={}", label.key(), label.value()))
                .collect();
            labels.sort();
            (format!("{}{{{}}}", key.name(), labels.join(",")), value)
        })
        .collect();
    (out, Captured(values))
}

// ============================================================================
// Collaborators
// ============================================================================

/// Writes fixed bytes for every URL.
struct StaticFetcher(&'static [u8]);

impl Fetcher for StaticFetcher {
    fn fetch(&self, _url: &str, dest: &Path) -> tnm_fetch::Result<u64> {
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(dest, self.0).unwrap();
        Ok(self.0.len() as u64)
    }
}

struct CopyTool;

impl RasterTool for CopyTool {
    fn build_mosaic(&self, inputs: &[PathBuf], mosaic: &Path) -> tnm_dem::Result<()> {
        fs::write(mosaic, format!("{} inputs", inputs.len())).unwrap();
        Ok(())
    }

    fn clip(
        &self,
        mosaic: &Path,
        _bbox: &BoundingBox,
        _srs: &str,
        output: &Path,
    ) -> tnm_dem::Result<()> {
        fs::copy(mosaic, output).unwrap();
        Ok(())
    }
}

struct FixedIndex(Vec<IndexRecord>);

impl SpatialIndex for FixedIndex {
    fn location(&self) -> &Path {
        Path::new("fixed.gdb")
    }

    fn spatial_ref(&self) -> Option<String> {
        None
    }

    fn query(&self, _bbox: &BoundingBox) -> tnm_topo::Result<Vec<IndexRecord>> {
        Ok(self.0.clone())
    }
}

fn black_hills() -> BoundingBox {
    BoundingBox::new(-103.0, 42.8, -102.5, 43.2).unwrap()
}

/// A local address with nothing listening on it.
fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

// ============================================================================
// Elevation runs
// ============================================================================

#[test]
fn test_dem_cache_and_compose_counters() {
    let dir = tempfile::tempdir().unwrap();
    let cache = TileCache::new(dir.path().join("dem"), Arc::new(StaticFetcher(b"II*\0tile")));
    let compositor = Compositor::new(dir.path().join("out"), CopyTool);

    let (_, captured) = capture(|| {
        for _ in 0..2 {
            let result =
                fetch_and_compose_raster(&black_hills(), &cache, &compositor, &NullSink).unwrap();
            assert!(result.is_produced());
        }
    });

    assert_eq!(captured.counter("tnm.cache.misses{kind=dem}"), 2);
    assert_eq!(captured.counter("tnm.cache.hits{kind=dem}"), 2);
    assert_eq!(captured.counter("tnm.cache.rejected{kind=dem}"), 0);
    assert_eq!(captured.counter("tnm.compose.outputs{}"), 2);
    assert_eq!(captured.histogram("tnm.compose.inputs{}"), vec![2.0, 2.0]);

    // Only the HTTP fetcher reports fetch metrics
    assert_eq!(captured.counter("tnm.fetch.requests{}"), 0);
}

#[test]
fn test_undersized_tile_counts_as_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let cache = TileCache::new(dir.path(), Arc::new(StaticFetcher(b"II*\0tile")))
        .with_min_bytes(4);
    let key = TileKey::new(43, -103);
    fs::write(cache.cache_path(&key), b"II").unwrap();

    let (path, captured) = capture(|| cache.materialize(&key).unwrap());

    assert_eq!(fs::read(path).unwrap(), b"II*\0tile");
    assert_eq!(captured.counter("tnm.cache.rejected{kind=dem}"), 1);
    assert_eq!(captured.counter("tnm.cache.misses{kind=dem}"), 1);
    assert_eq!(captured.counter("tnm.cache.hits{kind=dem}"), 0);
}

#[test]
fn test_http_transport_failure_is_counted() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = HttpFetcher::new(FetchConfig {
        request_delay_ms: 0,
        use_system_proxy: false,
        ..FetchConfig::default()
    })
    .unwrap();
    let cache = TileCache::new(dir.path(), Arc::new(fetcher)).with_grid(TileGrid {
        base_url: closed_port_url(),
        file_prefix: String::new(),
    });
    let key = TileKey::new(42, -103);

    let (result, captured) = capture(|| cache.materialize(&key));

    assert!(result.is_err());
    assert!(!cache.cache_path(&key).exists());
    assert_eq!(captured.counter("tnm.fetch.requests{}"), 1);
    assert_eq!(captured.counter("tnm.fetch.failures{reason=transport}"), 1);
    assert_eq!(captured.counter("tnm.fetch.bytes{}"), 0);
    assert!(captured.histogram("tnm.fetch.duration_ms{}").is_empty());
    assert_eq!(captured.counter("tnm.cache.misses{kind=dem}"), 1);
}

// ============================================================================
// Quadrangle runs
// ============================================================================

#[test]
fn test_topo_run_counters() {
    let dir = tempfile::tempdir().unwrap();
    let raw_dir = dir.path().join("raw");
    let topo_dir = dir.path().join("topo");
    let job = QuadrangleJob::new(
        FixedIndex(vec![
            IndexRecord::new("Hill City", Some("SD")),
            IndexRecord::new("Custer", Some("SD")),
            IndexRecord::new("Unnamed", None),
            IndexRecord::new("Hill City", Some("sd")),
        ]),
        Arc::new(StaticFetcher(b"not a zip archive")),
        &raw_dir,
        &topo_dir,
    );
    let cached = QuadrangleKey::normalize("Hill City", Some("SD")).unwrap();
    fs::create_dir_all(&topo_dir).unwrap();
    fs::write(job.extracted_path(&cached), b"gpkg").unwrap();

    let (summary, captured) = capture(|| job.download_by_bbox(&black_hills(), &NullSink).unwrap());

    assert_eq!(summary.successful, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(captured.counter("tnm.cache.hits{kind=topo}"), 1);
    assert_eq!(captured.counter("tnm.cache.misses{kind=topo}"), 1);
    assert_eq!(captured.counter("tnm.extract.failed{reason=corrupt}"), 1);
    assert_eq!(captured.counter("tnm.extract.completed{}"), 0);
    assert_eq!(captured.counter("tnm.resolve.records_skipped{}"), 1);
}
