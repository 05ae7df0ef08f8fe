//! Error types shared across the toolkit.

use thiserror::Error;

/// Errors raised by the shared value types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommonError {
    /// The bounding box is degenerate or contains non-finite values.
    #[error("Invalid bounding box ({xmin}, {ymin}, {xmax}, {ymax}): {reason}")]
    InvalidBoundingBox {
        /// Requested west edge.
        xmin: f64,
        /// Requested south edge.
        ymin: f64,
        /// Requested east edge.
        xmax: f64,
        /// Requested north edge.
        ymax: f64,
        /// Which rule was violated.
        reason: String,
    },

    /// A bounding box string could not be parsed.
    #[error("Cannot parse bounding box '{0}': expected four comma-separated numbers")]
    UnparsableBoundingBox(String),
}
