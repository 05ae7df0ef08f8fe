//! # tnm-fetch
//!
//! Byte transfer and archive handling for the tile toolkit.
//!
//! - [`Fetcher`] is the seam the caches download through; [`HttpFetcher`] is
//!   the production implementation (blocking `reqwest`, streamed in chunks,
//!   rate limited).
//! - [`extract_member`] pulls one file out of a ZIP archive, flattened and
//!   renamed, and always removes the archive afterwards.
//!
//! Downloads are written to a sibling `.part` file and renamed into place only
//! when complete, so a path that exists is always a whole file.
//!
//! ## Example
//!
//! ```no_run
//! use tnm_fetch::{FetchConfig, Fetcher, HttpFetcher};
//!
//! let fetcher = HttpFetcher::new(FetchConfig::default())?;
//! let bytes = fetcher.fetch(
//!     "https://prd-tnm.s3.amazonaws.com/StagedProducts/Elevation/1/TIFF/current/n42w103/USGS_1_n42w103.tif",
//!     "cache/n42w103.tif".as_ref(),
//! )?;
//! println!("{} bytes", bytes);
//! # Ok::<(), tnm_fetch::FetchError>(())
//! ```

mod archive;
mod error;
mod fetcher;

pub use archive::extract_member;
pub use error::{ArchiveError, FetchError};
pub use fetcher::{partial_path, FetchConfig, Fetcher, HttpFetcher, RateLimiter};

/// Result type for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;
