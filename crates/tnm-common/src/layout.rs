//! On-disk directory layout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default data root, relative to the working directory.
pub const DEFAULT_DATA_ROOT: &str = "data";

/// Directories used by the pipelines.
///
/// Every component receives the directory it needs explicitly; nothing is
/// derived from where the binary happens to be installed. Directories are
/// created lazily by the component that writes into them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataLayout {
    /// Raw archive downloads awaiting extraction.
    pub raw_dir: PathBuf,
    /// Elevation tile cache.
    pub dem_dir: PathBuf,
    /// Extracted topographic vector files.
    pub topo_dir: PathBuf,
    /// Final outputs.
    pub out_dir: PathBuf,
}

impl DataLayout {
    /// Standard layout below a data root:
    ///
    /// ```text
    /// <root>/raw/gpkg
    /// <root>/extracted/dem
    /// <root>/extracted/gpkg
    /// <root>/out
    /// ```
    pub fn under<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            raw_dir: root.join("raw").join("gpkg"),
            dem_dir: root.join("extracted").join("dem"),
            topo_dir: root.join("extracted").join("gpkg"),
            out_dir: root.join("out"),
        }
    }
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::under(DEFAULT_DATA_ROOT)
    }
}
