//! # tnm-dem
//!
//! USGS 1 arc-second elevation tiles: which tiles cover a bounding box, where
//! they live, a local cache in front of the download, and the mosaic-and-clip
//! step that turns them into one raster.
//!
//! ## Overview
//!
//! The tiles are organized by 1x1 degree cells named like `n42w072`, the cell
//! with `floor(lat) = 42` and `floor(lon) = -72`. Remote files sit at
//! `{base}/n42w072/USGS_1_n42w072.tif`; the cache keeps them as
//! `{cache_dir}/n42w072.tif`.
//!
//! A raster job runs in three steps:
//! 1. [`tiles_for_bbox`] enumerates the cells, latitude-outer
//! 2. [`TileCache::materialize_all`] downloads whatever is missing
//! 3. [`Compositor::composite`] builds a virtual mosaic, clips it to the box
//!    and writes `DEM_{xmin}_{ymin}_{xmax}_{ymax}.tif`
//!
//! [`fetch_and_compose_raster`] runs all three and reports a
//! [`CompositionResult`].
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use tnm_common::{BoundingBox, NullSink};
//! use tnm_dem::{fetch_and_compose_raster, Compositor, GdalTool, TileCache};
//! use tnm_fetch::{FetchConfig, HttpFetcher};
//!
//! let bbox = BoundingBox::new(-103.0, 42.8, -102.5, 43.2)?;
//! let fetcher = Arc::new(HttpFetcher::new(FetchConfig::default())?);
//! let cache = TileCache::new("data/extracted/dem", fetcher);
//! let compositor = Compositor::new("data/out", GdalTool::default());
//!
//! let result = fetch_and_compose_raster(&bbox, &cache, &compositor, &NullSink)?;
//! println!("{:?}", result.output);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod cache;
mod compositor;
mod config;
mod error;
mod pipeline;
mod tile;

pub use cache::{DownloadStats, TileCache};
pub use compositor::{
    Compositor, CompositorConfig, GdalConfig, GdalTool, RasterTool, DEFAULT_CLIP_SRS,
    DEFAULT_OUTPUT_PREFIX, MOSAIC_FILE_NAME,
};
pub use config::DemConfig;
pub use error::DemError;
pub use pipeline::{fetch_and_compose_raster, CompositionResult, CompositionStatus};
pub use tile::{
    tile_key, tile_url, tiles_for_bbox, TileBounds, TileGrid, TileKey, DEFAULT_BASE_URL,
    DEFAULT_FILE_PREFIX,
};

/// Result type for DEM operations.
pub type Result<T> = std::result::Result<T, DemError>;
