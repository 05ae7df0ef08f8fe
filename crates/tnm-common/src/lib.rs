//! # tnm-common
//!
//! Types shared by every stage of The National Map tile toolkit.
//!
//! - [`BoundingBox`] - validated geographic rectangle that drives every job
//! - [`ProgressEvent`] / [`ProgressSink`] - structured progress reporting, so the
//!   pipelines never format console output themselves
//! - [`DataLayout`] - the on-disk directories (raw downloads, caches, outputs)
//!
//! ## Example
//!
//! ```
//! use tnm_common::{BoundingBox, DataLayout};
//!
//! let bbox = BoundingBox::new(-103.0, 42.8, -102.5, 43.2)?;
//! assert_eq!(bbox.coordinate_fragment(), "-103.0_42.8_-102.5_43.2");
//!
//! let layout = DataLayout::under("data");
//! assert!(layout.dem_dir.ends_with("extracted/dem"));
//! # Ok::<(), tnm_common::CommonError>(())
//! ```

mod bbox;
mod error;
mod layout;
mod progress;

pub use bbox::BoundingBox;
pub use error::CommonError;
pub use layout::DataLayout;
pub use progress::{CollectingSink, NullSink, Phase, ProgressEvent, ProgressSink};

/// Result type for shared operations.
pub type Result<T> = std::result::Result<T, CommonError>;
