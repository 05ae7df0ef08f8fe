//! Error types for the quadrangle pipeline.

use std::path::PathBuf;
use thiserror::Error;
use tnm_fetch::{ArchiveError, FetchError};

/// Errors that can occur while resolving or downloading quadrangles.
///
/// Only [`TopoError::IndexUnavailable`] ends a bounding-box run; every other
/// variant is recorded against a single quadrangle.
#[derive(Debug, Error)]
pub enum TopoError {
    /// An index record cannot be turned into a quadrangle key.
    #[error("Invalid index record '{cell_name}': {reason}")]
    InvalidRecord {
        /// Cell name as found in the index.
        cell_name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The spatial index could not be opened or queried.
    #[error("Spatial index {} unavailable: {reason}", .path.display())]
    IndexUnavailable {
        /// Index location.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// The quadrangle archive could not be downloaded.
    #[error("Failed to fetch {key} from {url}: {source}")]
    FetchFailure {
        /// Quadrangle key.
        key: String,
        /// Remote URL.
        url: String,
        /// Fetcher error.
        #[source]
        source: FetchError,
    },

    /// The downloaded archive could not be extracted.
    #[error("Failed to extract {key}: {source}")]
    Extraction {
        /// Quadrangle key.
        key: String,
        /// Extraction error.
        #[source]
        source: ArchiveError,
    },
}

impl TopoError {
    /// Short label for summaries and metrics.
    pub fn kind_label(&self) -> &'static str {
        match self {
            TopoError::InvalidRecord { .. } => "invalid_record",
            TopoError::IndexUnavailable { .. } => "index_unavailable",
            TopoError::FetchFailure { .. } => "fetch",
            TopoError::Extraction { source, .. } => source.kind_label(),
        }
    }
}
