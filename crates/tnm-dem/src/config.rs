//! Settings for the raster job.

use crate::cache::TileCache;
use crate::compositor::{Compositor, CompositorConfig};
use crate::tile::TileGrid;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tnm_fetch::Fetcher;

/// Raster job configuration.
///
/// ```yaml
/// grid:
///   base_url: https://prd-tnm.s3.amazonaws.com/StagedProducts/Elevation/1/TIFF/current
/// min_bytes: 1024
/// parallel: true
/// compositor:
///   clip_srs: EPSG:4326
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemConfig {
    /// Remote tile location and naming.
    pub grid: TileGrid,
    /// Cached files smaller than this many bytes are fetched again (0 = any file).
    pub min_bytes: u64,
    /// Download tiles concurrently.
    pub parallel: bool,
    /// Output naming and raster tool settings.
    pub compositor: CompositorConfig,
}

impl DemConfig {
    /// Build the tile cache described by this configuration.
    pub fn tile_cache<P: AsRef<Path>>(&self, cache_dir: P, fetcher: Arc<dyn Fetcher>) -> TileCache {
        TileCache::new(cache_dir, fetcher)
            .with_grid(self.grid.clone())
            .with_min_bytes(self.min_bytes)
            .with_parallel(self.parallel)
    }

    /// Build the GDAL-backed compositor described by this configuration.
    pub fn compositor<P: AsRef<Path>>(&self, out_dir: P) -> Compositor {
        Compositor::from_config(out_dir, &self.compositor)
    }
}
