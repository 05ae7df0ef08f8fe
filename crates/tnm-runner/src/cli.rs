//! Command-line arguments.

use crate::config::{ConfigError, RunnerConfig};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tnm_common::{BoundingBox, CommonError, DataLayout};

/// Fetch elevation tiles and topographic quadrangles from The National Map.
#[derive(Parser, Debug, Clone)]
#[command(name = "tnm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, global = true, env = "TNM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data root; replaces the configured layout with the standard one below it
    #[arg(long, global = true, env = "TNM_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Default log filter when RUST_LOG is not set
    #[arg(long, global = true, env = "TNM_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build a clipped elevation mosaic for a bounding box
    Dem(DemArgs),
    /// Download and extract the topographic quadrangles covering a bounding box
    Topo(TopoArgs),
    /// List the elevation tiles for a bounding box without downloading
    Tiles(TilesArgs),
}

/// Area of interest.
#[derive(Args, Debug, Clone)]
pub struct BboxArgs {
    /// Bounding box in degrees
    #[arg(
        long,
        num_args = 4,
        required = true,
        allow_negative_numbers = true,
        value_names = ["XMIN", "YMIN", "XMAX", "YMAX"]
    )]
    pub bbox: Vec<f64>,
}

impl BboxArgs {
    /// Validate the four values as a bounding box.
    pub fn bounding_box(&self) -> Result<BoundingBox, CommonError> {
        match self.bbox.as_slice() {
            &[xmin, ymin, xmax, ymax] => BoundingBox::new(xmin, ymin, xmax, ymax),
            values => Err(CommonError::UnparsableBoundingBox(format!("{:?}", values))),
        }
    }
}

/// Arguments of `tnm dem`.
#[derive(Args, Debug, Clone)]
pub struct DemArgs {
    #[command(flatten)]
    pub area: BboxArgs,

    /// Elevation tile cache directory
    #[arg(long, env = "TNM_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Output directory
    #[arg(long, env = "TNM_OUT_DIR")]
    pub out_dir: Option<PathBuf>,

    /// Download tiles concurrently
    #[arg(long)]
    pub parallel: bool,
}

/// Arguments of `tnm topo`.
#[derive(Args, Debug, Clone)]
pub struct TopoArgs {
    #[command(flatten)]
    pub area: BboxArgs,

    /// Map-index dataset
    #[arg(long, env = "TNM_INDEX")]
    pub index: Option<PathBuf>,

    /// Product format (GPKG, Shape, ...)
    #[arg(long, env = "TNM_FORMAT")]
    pub format: Option<String>,
}

/// Arguments of `tnm tiles`.
#[derive(Args, Debug, Clone)]
pub struct TilesArgs {
    #[command(flatten)]
    pub area: BboxArgs,

    /// Elevation tile cache directory
    #[arg(long, env = "TNM_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

impl Cli {
    /// Load the configuration file and apply the command-line overrides.
    pub fn runner_config(&self) -> Result<RunnerConfig, ConfigError> {
        let mut config = RunnerConfig::load_or_default(self.config.as_deref())?;
        if let Some(root) = &self.data_dir {
            config.layout = DataLayout::under(root);
        }

        match &self.command {
            Command::Dem(args) => {
                if let Some(dir) = &args.cache_dir {
                    config.layout.dem_dir = dir.clone();
                }
                if let Some(dir) = &args.out_dir {
                    config.layout.out_dir = dir.clone();
                }
                if args.parallel {
                    config.dem.parallel = true;
                }
            }
            Command::Topo(args) => {
                if let Some(index) = &args.index {
                    config.topo.index.path = index.clone();
                }
                if let Some(format) = &args.format {
                    config.topo.product.format = format.clone();
                }
            }
            Command::Tiles(args) => {
                if let Some(dir) = &args.cache_dir {
                    config.layout.dem_dir = dir.clone();
                }
            }
        }
        Ok(config)
    }

    /// The area argument of whichever command was given.
    pub fn area(&self) -> &BboxArgs {
        match &self.command {
            Command::Dem(args) => &args.area,
            Command::Topo(args) => &args.area,
            Command::Tiles(args) => &args.area,
        }
    }
}
