//! # tnm-runner
//!
//! The `tnm` command-line tool.
//!
//! ## Overview
//!
//! The binary wires the library crates together:
//!
//! - [`cli`] parses the command line (clap, with `TNM_*` environment fallbacks)
//! - [`config`] loads the YAML configuration that command-line flags override
//! - [`commands`] runs the raster, quadrangle and tile-listing jobs and prints
//!   JSON summaries
//! - [`sink`] renders pipeline progress as `tracing` records
//!
//! ## Example
//!
//! ```text
//! tnm dem --bbox -103.0 42.8 -102.5 43.2 --parallel
//! tnm topo --bbox -103.0 42.8 -102.5 43.2 --index data/MapIndices_National_GDB.gdb
//! tnm tiles --bbox -103.0 42.8 -102.5 43.2
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod sink;

pub use cli::{BboxArgs, Cli, Command, DemArgs, TilesArgs, TopoArgs};
pub use commands::{compose, download, plan_tiles, run_dem, run_tiles, run_topo, Outcome, PlannedTile};
pub use config::{ConfigError, RunnerConfig};
pub use sink::{describe, TracingSink};
