//! The bounding-box-to-raster job.

use crate::cache::TileCache;
use crate::compositor::Compositor;
use crate::tile::{tiles_for_bbox, TileKey};
use crate::{DemError, Result};
use serde::Serialize;
use std::path::PathBuf;
use tnm_common::{BoundingBox, ProgressEvent, ProgressSink};
use tracing::{info, warn};

/// How a raster job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompositionStatus {
    /// The clipped output was written.
    Produced,
    /// The box covered no tiles.
    NoTiles,
    /// A tile could not be fetched; no mosaic was built.
    PartialFailure {
        /// First tile that failed.
        key: String,
        /// Reason reported by the fetcher.
        reason: String,
    },
}

/// Outcome of [`fetch_and_compose_raster`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositionResult {
    /// The output file, present only for [`CompositionStatus::Produced`].
    pub output: Option<PathBuf>,
    /// Tiles the box was decomposed into.
    pub tiles: Vec<TileKey>,
    /// How the job ended.
    #[serde(flatten)]
    pub status: CompositionStatus,
}

impl CompositionResult {
    /// Whether an output file was produced.
    pub fn is_produced(&self) -> bool {
        self.status == CompositionStatus::Produced
    }
}

/// Fetch every tile under `bbox` and merge them into one clipped raster.
///
/// The job is all-or-nothing: the first tile that cannot be fetched ends it
/// with [`CompositionStatus::PartialFailure`] before any mosaic is built.
/// Tool and filesystem failures during composition are returned as errors.
pub fn fetch_and_compose_raster(
    bbox: &BoundingBox,
    cache: &TileCache,
    compositor: &Compositor,
    sink: &dyn ProgressSink,
) -> Result<CompositionResult> {
    let tiles = tiles_for_bbox(bbox);
    sink.emit(&ProgressEvent::TilesPlanned {
        keys: tiles.iter().map(|k| k.to_string()).collect(),
    });

    if tiles.is_empty() {
        warn!(bbox = %bbox, "Bounding box covers no tiles");
        return Ok(CompositionResult {
            output: None,
            tiles,
            status: CompositionStatus::NoTiles,
        });
    }
    info!(bbox = %bbox, tiles = tiles.len(), "Fetching elevation tiles");

    let paths = match cache.materialize_all(&tiles, sink) {
        Ok(paths) => paths,
        Err(DemError::FetchFailure { key, reason, .. }) => {
            warn!(key = %key, "Skipping composition after failed tile");
            return Ok(CompositionResult {
                output: None,
                tiles,
                status: CompositionStatus::PartialFailure { key, reason },
            });
        }
        Err(e) => return Err(e),
    };

    let output = compositor.composite_with_sink(&paths, bbox, sink)?;
    Ok(CompositionResult {
        output: Some(output),
        tiles,
        status: CompositionStatus::Produced,
    })
}
