//! The bounding-box-to-quadrangles job.

use crate::config::TopoConfig;
use crate::index::{OgrIndex, SpatialIndex};
use crate::quad::{QuadrangleKey, TopoProduct};
use crate::resolver::resolve;
use crate::{Result, TopoError};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tnm_common::{BoundingBox, DataLayout, NullSink, ProgressEvent, ProgressSink};
use tnm_fetch::{extract_member, Fetcher};
use tnm_metrics::{metric_defs, metrics};
use tracing::{debug, info, warn};

/// Metric label value for quadrangle products.
const CACHE_KIND: &str = "topo";

/// A quadrangle that could not be downloaded or extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuadrangleFailure {
    /// Quadrangle key.
    pub key: String,
    /// Failure category.
    pub kind: &'static str,
    /// Error message.
    pub reason: String,
}

/// Outcome counts of one bounding-box run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuadrangleSummary {
    /// Records the index returned for the box.
    pub records_found: usize,
    /// Distinct quadrangle keys among them.
    pub unique_keys: usize,
    /// Keys now present in the extracted directory (cached or downloaded).
    pub successful: usize,
    /// Keys whose download or extraction failed.
    pub failed: usize,
    /// Records skipped because they could not be normalized.
    pub skipped_invalid: usize,
    /// Details of each failed key.
    pub failures: Vec<QuadrangleFailure>,
}

/// Downloads and extracts every quadrangle the index lists for a box.
pub struct QuadrangleJob {
    index: Box<dyn SpatialIndex>,
    fetcher: Arc<dyn Fetcher>,
    product: TopoProduct,
    raw_dir: PathBuf,
    extracted_dir: PathBuf,
}

impl std::fmt::Debug for QuadrangleJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuadrangleJob")
            .field("index", &self.index.location())
            .field("product", &self.product)
            .field("raw_dir", &self.raw_dir)
            .field("extracted_dir", &self.extracted_dir)
            .finish()
    }
}

impl QuadrangleJob {
    /// Create a job with the default product (GeoPackage from the staged products bucket).
    ///
    /// # Arguments
    /// * `index` - Spatial index to query
    /// * `fetcher` - Byte transfer for archives
    /// * `raw_dir` - Where archives are downloaded before extraction
    /// * `extracted_dir` - Where extracted products are kept (the cache)
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        index: impl SpatialIndex + 'static,
        fetcher: Arc<dyn Fetcher>,
        raw_dir: P,
        extracted_dir: Q,
    ) -> Self {
        Self {
            index: Box::new(index),
            fetcher,
            product: TopoProduct::default(),
            raw_dir: raw_dir.as_ref().to_path_buf(),
            extracted_dir: extracted_dir.as_ref().to_path_buf(),
        }
    }

    /// Create an OGR-backed job from settings and the data layout.
    pub fn from_config(config: &TopoConfig, layout: &DataLayout, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::new(
            OgrIndex::new(config.index.clone()),
            fetcher,
            &layout.raw_dir,
            &layout.topo_dir,
        )
        .with_product(config.product.clone())
    }

    /// Use a different product location or format.
    pub fn with_product(mut self, product: TopoProduct) -> Self {
        self.product = product;
        self
    }

    /// Get the product settings.
    pub fn product(&self) -> &TopoProduct {
        &self.product
    }

    /// Path the extracted product for `key` is cached at.
    pub fn extracted_path(&self, key: &QuadrangleKey) -> PathBuf {
        self.extracted_dir.join(self.product.extracted_name(key))
    }

    /// Path the archive for `key` is downloaded to.
    pub fn archive_path(&self, key: &QuadrangleKey) -> PathBuf {
        self.raw_dir.join(self.product.archive_name(key))
    }

    /// Make sure the extracted product for `key` exists and return its path.
    pub fn process_quadrangle(&self, key: &QuadrangleKey) -> Result<PathBuf> {
        self.process_quadrangle_with_sink(key, &NullSink)
    }

    /// Make sure the extracted product for `key` exists, reporting progress.
    ///
    /// A present extracted file is a cache hit. Otherwise the archive is
    /// downloaded into the raw directory and its first member with the
    /// product's extension is extracted; the archive is removed either way.
    pub fn process_quadrangle_with_sink(
        &self,
        key: &QuadrangleKey,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf> {
        let target = self.extracted_path(key);
        if target.is_file() {
            metrics::counter!(metric_defs::CACHE_HITS.name, metric_defs::KIND_LABEL => CACHE_KIND)
                .increment(1);
            debug!(key = %key, path = %target.display(), "Quadrangle cache hit");
            sink.emit(&ProgressEvent::CacheHit {
                key: key.to_string(),
                path: target.clone(),
            });
            return Ok(target);
        }
        metrics::counter!(metric_defs::CACHE_MISSES.name, metric_defs::KIND_LABEL => CACHE_KIND)
            .increment(1);

        let url = self.product.url(key);
        let archive = self.archive_path(key);
        sink.emit(&ProgressEvent::FetchStarted {
            key: key.to_string(),
            url: url.clone(),
        });

        let bytes = match self.fetcher.fetch(&url, &archive) {
            Ok(bytes) => bytes,
            Err(source) => {
                // Fetchers leave nothing behind, but a stray file must not survive
                if archive.exists() {
                    if let Err(e) = fs::remove_file(&archive) {
                        warn!(
                            path = %archive.display(),
                            error = %e,
                            "Failed to remove partial archive"
                        );
                    }
                }
                sink.emit(&ProgressEvent::FetchFailed {
                    key: key.to_string(),
                    url: url.clone(),
                    reason: source.to_string(),
                });
                return Err(TopoError::FetchFailure {
                    key: key.to_string(),
                    url,
                    source,
                });
            }
        };
        sink.emit(&ProgressEvent::FetchCompleted {
            key: key.to_string(),
            path: archive.clone(),
            bytes,
        });

        match extract_member(&archive, &self.extracted_dir, &self.product.member_extension()) {
            Ok(path) => {
                sink.emit(&ProgressEvent::Extracted {
                    key: key.to_string(),
                    path: path.clone(),
                });
                Ok(path)
            }
            Err(source) => {
                sink.emit(&ProgressEvent::ExtractionFailed {
                    key: key.to_string(),
                    reason: source.to_string(),
                });
                Err(TopoError::Extraction {
                    key: key.to_string(),
                    source,
                })
            }
        }
    }

    /// Resolve every quadrangle intersecting `bbox` and make sure each is extracted.
    ///
    /// Per-quadrangle failures are counted and the run continues. Only an
    /// unreadable index ends the run with an error.
    pub fn download_by_bbox(
        &self,
        bbox: &BoundingBox,
        sink: &dyn ProgressSink,
    ) -> Result<QuadrangleSummary> {
        let spatial_ref = self.index.spatial_ref();
        info!(
            index = %self.index.location().display(),
            srs = spatial_ref.as_deref().unwrap_or("UNKNOWN"),
            bbox = %bbox,
            "Querying quadrangle index"
        );
        let records = self.index.query(bbox)?;
        sink.emit(&ProgressEvent::IndexOpened {
            path: self.index.location().to_path_buf(),
            spatial_ref,
        });

        let mut summary = QuadrangleSummary::default();
        let mut keys = resolve(records, sink);

        for key in keys.by_ref() {
            match self.process_quadrangle_with_sink(&key, sink) {
                Ok(_) => summary.successful += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "Quadrangle failed");
                    summary.failed += 1;
                    summary.failures.push(QuadrangleFailure {
                        key: key.to_string(),
                        kind: e.kind_label(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        summary.records_found = keys.records_seen();
        summary.unique_keys = keys.unique_keys();
        summary.skipped_invalid = keys.skipped_invalid();
        info!(
            records = summary.records_found,
            unique = summary.unique_keys,
            successful = summary.successful,
            failed = summary.failed,
            skipped = summary.skipped_invalid,
            "Quadrangle run complete"
        );
        Ok(summary)
    }
}
