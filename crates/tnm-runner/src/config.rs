//! Runner configuration file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tnm_common::DataLayout;
use tnm_dem::DemConfig;
use tnm_fetch::FetchConfig;
use tnm_topo::TopoConfig;

/// Errors that can occur while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Cannot read configuration {path}: {source}")]
    Read {
        /// Configuration file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for [`RunnerConfig`].
    #[error("Invalid configuration {path}: {source}")]
    Parse {
        /// Configuration file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_yaml::Error,
    },
}

/// Everything the `tnm` binary needs, composed from the library settings.
///
/// Every section is optional in the file; missing sections keep their
/// defaults.
///
/// ```yaml
/// layout:
///   raw_dir: /srv/tnm/raw/gpkg
///   dem_dir: /srv/tnm/extracted/dem
///   topo_dir: /srv/tnm/extracted/gpkg
///   out_dir: /srv/tnm/out
/// fetch:
///   request_delay_ms: 1000
/// dem:
///   parallel: true
/// topo:
///   product:
///     format: GPKG
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Data directories.
    pub layout: DataLayout,
    /// Download settings shared by both jobs.
    pub fetch: FetchConfig,
    /// Raster job settings.
    pub dem: DemConfig,
    /// Quadrangle job settings.
    pub topo: TopoConfig,
}

impl RunnerConfig {
    /// Load a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document means "all defaults"
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Load `path` if given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
