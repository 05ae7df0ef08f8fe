//! Integration tests for tnm-topo with an in-memory index and a zip-serving fetcher.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tnm_common::{BoundingBox, CollectingSink, DataLayout, NullSink, ProgressEvent};
use tnm_fetch::{FetchError, Fetcher};
use tnm_topo::{
    IndexRecord, QuadrangleJob, QuadrangleKey, SpatialIndex, TopoConfig, TopoError, TopoProduct,
};
use zip::write::SimpleFileOptions;

/// Index answering every query with a fixed record list.
struct MemoryIndex {
    path: PathBuf,
    records: Vec<IndexRecord>,
    available: bool,
}

impl MemoryIndex {
    fn with(records: Vec<IndexRecord>) -> Self {
        Self {
            path: PathBuf::from("memory.gdb"),
            records,
            available: true,
        }
    }
}

impl SpatialIndex for MemoryIndex {
    fn location(&self) -> &Path {
        &self.path
    }

    fn spatial_ref(&self) -> Option<String> {
        Some("GEOGCRS[\"NAD83\",".to_string())
    }

    fn query(&self, _bbox: &BoundingBox) -> tnm_topo::Result<Vec<IndexRecord>> {
        if !self.available {
            return Err(TopoError::IndexUnavailable {
                path: self.path.clone(),
                reason: "layer CellGrid_7_5Minute not found".to_string(),
            });
        }
        Ok(self.records.clone())
    }
}

/// Serves a zip per URL; the quad name in the URL selects the behavior.
#[derive(Default)]
struct ArchiveFetcher {
    calls: AtomicUsize,
}

impl ArchiveFetcher {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for ArchiveFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> tnm_fetch::Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if url.contains("Missing_Quad") {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            });
        }
        fs::create_dir_all(dest.parent().unwrap()).unwrap();

        if url.contains("Broken_Quad") {
            fs::write(dest, b"<Error>AccessDenied</Error>").unwrap();
        } else {
            let member = if url.contains("Shapes_Only") {
                "Shape/roads.shp"
            } else {
                "VECTOR_data/nested/topo.gpkg"
            };
            let mut writer = zip::ZipWriter::new(File::create(dest).unwrap());
            writer.start_file("readme.txt", SimpleFileOptions::default()).unwrap();
            writer.write_all(b"about this product").unwrap();
            writer.start_file(member, SimpleFileOptions::default()).unwrap();
            writer.write_all(url.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        Ok(fs::metadata(dest).unwrap().len())
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    layout: DataLayout,
    fetcher: Arc<ArchiveFetcher>,
    job: QuadrangleJob,
}

fn fixture(index: MemoryIndex) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::under(dir.path());
    let fetcher = Arc::new(ArchiveFetcher::default());
    let job = QuadrangleJob::new(index, fetcher.clone(), &layout.raw_dir, &layout.topo_dir);
    Fixture {
        _dir: dir,
        layout,
        fetcher,
        job,
    }
}

fn bbox() -> BoundingBox {
    BoundingBox::new(-103.0, 42.8, -102.5, 43.2).unwrap()
}

fn black_hills_records() -> Vec<IndexRecord> {
    vec![
        IndexRecord::new("Hill City", Some("SD")),
        IndexRecord::new("Hill_City", Some("sd,WY")),
        IndexRecord::new("Custer", Some("SD")),
        IndexRecord::new("Unnamed", Some("")),
        IndexRecord::new("Edgemont", Some("SD, NE")),
        IndexRecord::new("Edgemont", Some("NE")),
    ]
}

#[test]
fn test_download_by_bbox_summary() {
    let fx = fixture(MemoryIndex::with(black_hills_records()));
    let sink = CollectingSink::new();

    let summary = fx.job.download_by_bbox(&bbox(), &sink).unwrap();

    assert_eq!(summary.records_found, 6);
    assert_eq!(summary.unique_keys, 4);
    assert_eq!(summary.successful, 4);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped_invalid, 1);
    assert_eq!(fx.fetcher.calls(), 4);

    let hill_city = fx
        .layout
        .topo_dir
        .join("VECTOR_Hill_City_SD_7_5_Min_GPKG.gpkg");
    assert!(fs::read_to_string(&hill_city)
        .unwrap()
        .ends_with("/SD/GPKG/VECTOR_Hill_City_SD_7_5_Min_GPKG.zip"));
    assert!(fx
        .layout
        .topo_dir
        .join("VECTOR_Edgemont_NE_7_5_Min_GPKG.gpkg")
        .exists());

    // Archives are consumed; nested members land flat
    assert_eq!(fs::read_dir(&fx.layout.raw_dir).unwrap().count(), 0);
    assert!(!fx.layout.topo_dir.join("VECTOR_data").exists());

    let events = sink.events();
    assert!(matches!(
        &events[0],
        ProgressEvent::IndexOpened { spatial_ref: Some(srs), .. } if srs.starts_with("GEOGCRS")
    ));
    assert_eq!(
        sink.count(|e| matches!(e, ProgressEvent::RecordSkipped { cell_name, .. } if cell_name == "Unnamed")),
        1
    );
    assert_eq!(
        sink.count(|e| matches!(e, ProgressEvent::Extracted { .. })),
        4
    );
}

#[test]
fn test_second_run_is_cached() {
    let fx = fixture(MemoryIndex::with(black_hills_records()));
    fx.job.download_by_bbox(&bbox(), &NullSink).unwrap();

    let sink = CollectingSink::new();
    let summary = fx.job.download_by_bbox(&bbox(), &sink).unwrap();

    assert_eq!(summary.successful, 4);
    assert_eq!(fx.fetcher.calls(), 4);
    assert_eq!(sink.count(|e| matches!(e, ProgressEvent::CacheHit { .. })), 4);
    assert_eq!(sink.count(|e| matches!(e, ProgressEvent::FetchStarted { .. })), 0);
}

#[test]
fn test_failures_are_isolated() {
    let fx = fixture(MemoryIndex::with(vec![
        IndexRecord::new("Missing Quad", Some("SD")),
        IndexRecord::new("Broken Quad", Some("SD")),
        IndexRecord::new("Shapes Only", Some("SD")),
        IndexRecord::new("Custer", Some("SD")),
    ]));

    let summary = fx.job.download_by_bbox(&bbox(), &NullSink).unwrap();

    assert_eq!(summary.unique_keys, 4);
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.failed, 3);
    let kinds: Vec<(&str, &str)> = summary
        .failures
        .iter()
        .map(|f| (f.key.as_str(), f.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("Missing_Quad_SD", "fetch"),
            ("Broken_Quad_SD", "corrupt"),
            ("Shapes_Only_SD", "member_not_found"),
        ]
    );

    // Broken downloads do not linger as archives or as cache entries
    assert_eq!(fs::read_dir(&fx.layout.raw_dir).unwrap().count(), 0);
    let broken = QuadrangleKey::normalize("Broken Quad", Some("SD")).unwrap();
    assert!(!fx.job.extracted_path(&broken).exists());
    assert!(fx
        .layout
        .topo_dir
        .join("VECTOR_Custer_SD_7_5_Min_GPKG.gpkg")
        .exists());
}

#[test]
fn test_index_unavailable_fails_run() {
    let mut index = MemoryIndex::with(black_hills_records());
    index.available = false;
    let fx = fixture(index);

    let sink = CollectingSink::new();

    let err = fx.job.download_by_bbox(&bbox(), &sink).unwrap_err();

    assert!(matches!(err, TopoError::IndexUnavailable { .. }));
    assert_eq!(fx.fetcher.calls(), 0);
    assert!(sink.events().is_empty());
}

#[test]
fn test_process_quadrangle_paths() {
    let fx = fixture(MemoryIndex::with(Vec::new()));
    let key = QuadrangleKey::normalize("Mount Rushmore", Some("SD")).unwrap();

    let path = fx.job.process_quadrangle(&key).unwrap();

    assert_eq!(path, fx.job.extracted_path(&key));
    assert_eq!(path.parent().unwrap(), fx.layout.topo_dir.as_path());
    assert!(!fx.job.archive_path(&key).exists());
}

#[test]
fn test_custom_format_naming() {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::under(dir.path());
    let job = QuadrangleJob::new(
        MemoryIndex::with(Vec::new()),
        Arc::new(ArchiveFetcher::default()),
        &layout.raw_dir,
        &layout.topo_dir,
    )
    .with_product(TopoProduct {
        base_url: "http://mirror.invalid/topo/".to_string(),
        format: "Shape".to_string(),
    });
    let key = QuadrangleKey::normalize("Custer", Some("SD")).unwrap();

    assert_eq!(
        job.extracted_path(&key),
        layout.topo_dir.join("VECTOR_Custer_SD_7_5_Min_Shape.shape")
    );
    assert_eq!(
        job.product().url(&key),
        "http://mirror.invalid/topo/SD/Shape/VECTOR_Custer_SD_7_5_Min_Shape.zip"
    );
}

#[test]
fn test_from_config_uses_layout() {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::under(dir.path());
    let job = QuadrangleJob::from_config(
        &TopoConfig::default(),
        &layout,
        Arc::new(ArchiveFetcher::default()),
    );
    let key = QuadrangleKey::normalize("Custer", Some("SD")).unwrap();

    assert!(job.archive_path(&key).starts_with(&layout.raw_dir));
    assert!(job.extracted_path(&key).starts_with(&layout.topo_dir));
}
