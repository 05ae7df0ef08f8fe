//! Error types for the DEM crate.

use std::path::PathBuf;
use thiserror::Error;
use tnm_common::CommonError;

/// Errors that can occur while planning, caching or composing DEM tiles.
#[derive(Debug, Error)]
pub enum DemError {
    /// The bounding box was rejected before any I/O happened.
    #[error(transparent)]
    InvalidBoundingBox(#[from] CommonError),

    /// A string could not be parsed as a tile key like `n42w072`.
    #[error("Invalid tile key: {0}")]
    InvalidTileKey(String),

    /// A tile could not be downloaded. Nothing was written to the cache.
    #[error("Failed to fetch tile {key} from {url}: {reason}")]
    FetchFailure {
        /// Tile key.
        key: String,
        /// Remote URL.
        url: String,
        /// Reason reported by the fetcher.
        reason: String,
    },

    /// Composition was asked to merge an empty tile list.
    #[error("No tiles available to compose")]
    NoTilesAvailable,

    /// An external raster program failed or could not be started.
    #[error(
        "{tool} failed (exit status {}): {stderr}",
        .status.map_or_else(|| "none".to_string(), |code| code.to_string())
    )]
    ToolFailed {
        /// Program that was run.
        tool: String,
        /// Exit code, if the process ran to completion.
        status: Option<i32>,
        /// Captured standard error, or the spawn error.
        stderr: String,
    },

    /// Filesystem failure.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Download tracker lock was poisoned (a thread panicked while holding the lock).
    #[error("Tile download tracker lock was poisoned")]
    CacheLockPoisoned,
}

impl DemError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> DemError {
        let path = path.into();
        move |source| DemError::Io { path, source }
    }
}
