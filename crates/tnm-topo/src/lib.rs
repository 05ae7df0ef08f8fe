//! # tnm-topo
//!
//! 7.5-minute topographic vector quadrangles from The National Map.
//!
//! ## Overview
//!
//! A quadrangle run asks a spatial index (the national map-index geodatabase,
//! layer `CellGrid_7_5Minute`) for every cell intersecting a bounding box.
//! Each record is normalized into a [`QuadrangleKey`] (`Hill City`/`SD,NE`
//! becomes `Hill_City`/`SD`), duplicates are dropped, and every distinct key
//! is downloaded as `VECTOR_{quad}_{STATE}_7_5_Min_{FORMAT}.zip` and
//! extracted next to the other cached products.
//!
//! The run is best-effort: a failed download or a broken archive is counted
//! in the [`QuadrangleSummary`] and the run moves on. Only an unreadable index
//! ends it early.
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use tnm_common::{BoundingBox, DataLayout, NullSink};
//! use tnm_fetch::{FetchConfig, HttpFetcher};
//! use tnm_topo::{QuadrangleJob, TopoConfig};
//!
//! let bbox = BoundingBox::new(-103.0, 42.8, -102.5, 43.2)?;
//! let fetcher = Arc::new(HttpFetcher::new(FetchConfig::default())?);
//! let job = QuadrangleJob::from_config(&TopoConfig::default(), &DataLayout::default(), fetcher);
//!
//! let summary = job.download_by_bbox(&bbox, &NullSink)?;
//! println!("{} of {} quadrangles ready", summary.successful, summary.unique_keys);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod config;
mod error;
mod index;
mod job;
mod quad;
mod resolver;

pub use config::TopoConfig;
pub use error::TopoError;
pub use index::{
    IndexConfig, IndexRecord, OgrIndex, SpatialIndex, DEFAULT_INDEX_PATH, DEFAULT_LAYER,
    DEFAULT_NAME_FIELD, DEFAULT_STATE_FIELD,
};
pub use job::{QuadrangleFailure, QuadrangleJob, QuadrangleSummary};
pub use quad::{QuadrangleKey, TopoProduct, DEFAULT_BASE_URL, DEFAULT_FORMAT};
pub use resolver::{resolve, Resolve};

/// Result type for quadrangle operations.
pub type Result<T> = std::result::Result<T, TopoError>;
