//! The work behind each subcommand.
//!
//! Each command writes a JSON summary to `out` and reports whether it
//! produced something. Errors are returned as [`anyhow::Error`] for the
//! binary to print.

use crate::config::RunnerConfig;
use anyhow::Context;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tnm_common::{BoundingBox, ProgressSink};
use tnm_dem::{fetch_and_compose_raster, tiles_for_bbox, Compositor, TileCache, TileKey};
use tnm_fetch::{Fetcher, HttpFetcher};
use tnm_topo::QuadrangleJob;
use tracing::info;

/// How a command ended, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The command produced its output or summary.
    Completed,
    /// The command ran but there is nothing to show for it.
    NoOutput,
}

impl Outcome {
    /// Process exit code: 0 for completed, 2 for no output.
    pub const fn exit_code(self) -> u8 {
        match self {
            Outcome::Completed => 0,
            Outcome::NoOutput => 2,
        }
    }
}

/// One line of `tnm tiles` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTile {
    /// Tile key.
    pub key: TileKey,
    /// Remote location.
    pub url: String,
    /// Cache location.
    pub path: PathBuf,
    /// Whether the cache already holds the tile.
    pub cached: bool,
}

fn http_fetcher(config: &RunnerConfig) -> anyhow::Result<Arc<dyn Fetcher>> {
    let fetcher = HttpFetcher::new(config.fetch.clone()).context("Cannot create HTTP client")?;
    Ok(Arc::new(fetcher))
}

fn write_json<T: Serialize>(out: &mut dyn Write, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("Cannot write summary")?;
    writeln!(out).context("Cannot write summary")?;
    Ok(())
}

/// `tnm dem` with the HTTP fetcher and GDAL tools from `config`.
pub fn run_dem(
    config: &RunnerConfig,
    bbox: &BoundingBox,
    sink: &dyn ProgressSink,
    out: &mut dyn Write,
) -> anyhow::Result<Outcome> {
    let cache = config.dem.tile_cache(&config.layout.dem_dir, http_fetcher(config)?);
    let compositor = config.dem.compositor(&config.layout.out_dir);
    compose(bbox, &cache, &compositor, sink, out)
}

/// Fetch and compose `bbox`, then print the result.
pub fn compose(
    bbox: &BoundingBox,
    cache: &TileCache,
    compositor: &Compositor,
    sink: &dyn ProgressSink,
    out: &mut dyn Write,
) -> anyhow::Result<Outcome> {
    let result = fetch_and_compose_raster(bbox, cache, compositor, sink)
        .with_context(|| format!("Raster job for {} failed", bbox))?;
    write_json(out, &result)?;

    let stats = cache.download_stats();
    info!(
        downloaded = stats.tiles_downloaded,
        bytes = stats.bytes_downloaded,
        "Raster job finished"
    );
    Ok(if result.is_produced() {
        Outcome::Completed
    } else {
        Outcome::NoOutput
    })
}

/// `tnm topo` with the HTTP fetcher and OGR index from `config`.
pub fn run_topo(
    config: &RunnerConfig,
    bbox: &BoundingBox,
    sink: &dyn ProgressSink,
    out: &mut dyn Write,
) -> anyhow::Result<Outcome> {
    let job = QuadrangleJob::from_config(&config.topo, &config.layout, http_fetcher(config)?);
    download(&job, bbox, sink, out)
}

/// Run a quadrangle job for `bbox`, then print the summary.
///
/// A summary is a completed run even when individual quadrangles failed;
/// only an empty result with failures counts as no output.
pub fn download(
    job: &QuadrangleJob,
    bbox: &BoundingBox,
    sink: &dyn ProgressSink,
    out: &mut dyn Write,
) -> anyhow::Result<Outcome> {
    let summary = job
        .download_by_bbox(bbox, sink)
        .with_context(|| format!("Quadrangle job for {} failed", bbox))?;
    write_json(out, &summary)?;

    Ok(if summary.successful == 0 && summary.failed > 0 {
        Outcome::NoOutput
    } else {
        Outcome::Completed
    })
}

/// `tnm tiles`: list the tiles for `bbox` and their cache state. No network access.
pub fn run_tiles(
    config: &RunnerConfig,
    bbox: &BoundingBox,
    out: &mut dyn Write,
) -> anyhow::Result<Outcome> {
    let tiles = plan_tiles(config, bbox);
    write_json(out, &tiles)?;
    Ok(if tiles.is_empty() {
        Outcome::NoOutput
    } else {
        Outcome::Completed
    })
}

/// The tiles covering `bbox` under the configured grid and cache directory.
pub fn plan_tiles(config: &RunnerConfig, bbox: &BoundingBox) -> Vec<PlannedTile> {
    let grid = &config.dem.grid;
    tiles_for_bbox(bbox)
        .into_iter()
        .map(|key| {
            let path = config.layout.dem_dir.join(grid.cache_file_name(&key));
            PlannedTile {
                url: grid.url(&key),
                cached: path.is_file(),
                path,
                key,
            }
        })
        .collect()
}
