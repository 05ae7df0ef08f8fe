//! Mosaic and clip cached tiles into one output raster.

use crate::{DemError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tnm_common::{BoundingBox, NullSink, ProgressEvent, ProgressSink};
use tnm_metrics::{metric_defs, metrics};
use tracing::{debug, info, warn};

/// Spatial reference the clip window is expressed in.
pub const DEFAULT_CLIP_SRS: &str = "EPSG:4326";

/// Output filename prefix.
pub const DEFAULT_OUTPUT_PREFIX: &str = "DEM";

/// Name of the intermediate mosaic inside the output directory.
pub const MOSAIC_FILE_NAME: &str = "_tmp_mosaic.vrt";

/// The mosaic and clip algorithm.
pub trait RasterTool: Send + Sync {
    /// Build a virtual mosaic of `inputs` at `mosaic`.
    fn build_mosaic(&self, inputs: &[PathBuf], mosaic: &Path) -> Result<()>;

    /// Clip `mosaic` to `bbox` (expressed in `srs`) and write `output`,
    /// replacing any existing file.
    fn clip(&self, mosaic: &Path, bbox: &BoundingBox, srs: &str, output: &Path) -> Result<()>;
}

/// Program locations for [`GdalTool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GdalConfig {
    /// `gdalbuildvrt` executable.
    pub gdalbuildvrt: PathBuf,
    /// `gdalwarp` executable.
    pub gdalwarp: PathBuf,
}

impl Default for GdalConfig {
    fn default() -> Self {
        Self {
            gdalbuildvrt: PathBuf::from("gdalbuildvrt"),
            gdalwarp: PathBuf::from("gdalwarp"),
        }
    }
}

/// [`RasterTool`] backed by the GDAL command-line programs.
#[derive(Debug, Clone, Default)]
pub struct GdalTool {
    config: GdalConfig,
}

impl GdalTool {
    /// Create a tool using the given program locations.
    pub fn new(config: GdalConfig) -> Self {
        Self { config }
    }

    fn run(program: &Path, args: &[OsString]) -> Result<()> {
        let tool = program.display().to_string();
        debug!(tool = %tool, ?args, "Running raster tool");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| DemError::ToolFailed {
                tool: tool.clone(),
                status: None,
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(DemError::ToolFailed {
                tool,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl RasterTool for GdalTool {
    fn build_mosaic(&self, inputs: &[PathBuf], mosaic: &Path) -> Result<()> {
        let mut args: Vec<OsString> = vec![mosaic.into()];
        args.extend(inputs.iter().map(OsString::from));
        Self::run(&self.config.gdalbuildvrt, &args)
    }

    fn clip(&self, mosaic: &Path, bbox: &BoundingBox, srs: &str, output: &Path) -> Result<()> {
        let mut args: Vec<OsString> = vec!["-te".into()];
        args.extend(bbox.to_array().iter().map(|v| OsString::from(v.to_string())));
        args.extend(
            ["-te_srs", srs, "-dstalpha", "-overwrite"]
                .iter()
                .map(OsString::from),
        );
        args.push(mosaic.into());
        args.push(output.into());
        Self::run(&self.config.gdalwarp, &args)
    }
}

/// Output naming and tool settings for a [`Compositor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompositorConfig {
    /// Spatial reference of the clip window.
    pub clip_srs: String,
    /// Output filename prefix.
    pub output_prefix: String,
    /// GDAL program locations.
    pub gdal: GdalConfig,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            clip_srs: DEFAULT_CLIP_SRS.to_string(),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            gdal: GdalConfig::default(),
        }
    }
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}

/// Removes the intermediate mosaic when dropped.
struct RemoveOnDrop<'a>(&'a Path);

impl Drop for RemoveOnDrop<'_> {
    fn drop(&mut self) {
        remove_if_present(self.0);
    }
}

/// Merges tiles into `{out_dir}/{prefix}_{xmin}_{ymin}_{xmax}_{ymax}.tif`.
pub struct Compositor {
    out_dir: PathBuf,
    tool: Box<dyn RasterTool>,
    clip_srs: String,
    output_prefix: String,
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("out_dir", &self.out_dir)
            .field("clip_srs", &self.clip_srs)
            .field("output_prefix", &self.output_prefix)
            .finish()
    }
}

impl Compositor {
    /// Create a compositor writing into `out_dir` with default naming.
    pub fn new<P: AsRef<Path>>(out_dir: P, tool: impl RasterTool + 'static) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
            tool: Box::new(tool),
            clip_srs: DEFAULT_CLIP_SRS.to_string(),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
        }
    }

    /// Create a GDAL-backed compositor from settings.
    pub fn from_config<P: AsRef<Path>>(out_dir: P, config: &CompositorConfig) -> Self {
        Self::new(out_dir, GdalTool::new(config.gdal.clone()))
            .with_clip_srs(&config.clip_srs)
            .with_output_prefix(&config.output_prefix)
    }

    /// Set the spatial reference of the clip window.
    pub fn with_clip_srs(mut self, srs: &str) -> Self {
        self.clip_srs = srs.to_string();
        self
    }

    /// Set the output filename prefix.
    pub fn with_output_prefix(mut self, prefix: &str) -> Self {
        self.output_prefix = prefix.to_string();
        self
    }

    /// Get the output directory.
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Deterministic output path for a bounding box.
    pub fn output_path(&self, bbox: &BoundingBox) -> PathBuf {
        self.out_dir
            .join(format!("{}_{}.tif", self.output_prefix, bbox.coordinate_fragment()))
    }

    /// Location of the intermediate mosaic.
    pub fn mosaic_path(&self) -> PathBuf {
        self.out_dir.join(MOSAIC_FILE_NAME)
    }

    /// Merge `tile_paths` and clip to `bbox`.
    pub fn composite(&self, tile_paths: &[PathBuf], bbox: &BoundingBox) -> Result<PathBuf> {
        self.composite_with_sink(tile_paths, bbox, &NullSink)
    }

    /// Merge `tile_paths` and clip to `bbox`, reporting progress to `sink`.
    ///
    /// An empty tile list fails with [`DemError::NoTilesAvailable`] before
    /// anything is written. The intermediate mosaic is removed whether or not
    /// the clip succeeds, and a failed clip leaves no output behind.
    pub fn composite_with_sink(
        &self,
        tile_paths: &[PathBuf],
        bbox: &BoundingBox,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf> {
        if tile_paths.is_empty() {
            return Err(DemError::NoTilesAvailable);
        }

        fs::create_dir_all(&self.out_dir).map_err(DemError::io(&self.out_dir))?;
        let mosaic = self.mosaic_path();
        let output = self.output_path(bbox);
        let _cleanup = RemoveOnDrop(&mosaic);

        self.tool.build_mosaic(tile_paths, &mosaic)?;
        metrics::histogram!(metric_defs::COMPOSE_INPUTS.name).record(tile_paths.len() as f64);
        sink.emit(&ProgressEvent::MosaicBuilt {
            inputs: tile_paths.len(),
        });

        if let Err(e) = self.tool.clip(&mosaic, bbox, &self.clip_srs, &output) {
            remove_if_present(&output);
            return Err(e);
        }

        metrics::counter!(metric_defs::COMPOSE_OUTPUTS.name).increment(1);
        info!(output = %output.display(), tiles = tile_paths.len(), "Wrote clipped mosaic");
        sink.emit(&ProgressEvent::OutputWritten {
            path: output.clone(),
        });
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes the input list to the mosaic and copies it to the output.
    struct CopyTool {
        fail_clip: bool,
    }

    impl RasterTool for CopyTool {
        fn build_mosaic(&self, inputs: &[PathBuf], mosaic: &Path) -> Result<()> {
            let listing: Vec<String> = inputs.iter().map(|p| p.display().to_string()).collect();
            fs::write(mosaic, listing.join("\n")).unwrap();
            Ok(())
        }

        fn clip(&self, mosaic: &Path, _bbox: &BoundingBox, _srs: &str, output: &Path) -> Result<()> {
            fs::copy(mosaic, output).unwrap();
            if self.fail_clip {
                return Err(DemError::ToolFailed {
                    tool: "copy".to_string(),
                    status: Some(1),
                    stderr: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    fn bbox() -> BoundingBox {
        BoundingBox::new(-103.0, 42.8, -102.5, 43.2).unwrap()
    }

    #[test]
    fn test_output_path() {
        let compositor = Compositor::new("/data/out", CopyTool { fail_clip: false });
        assert_eq!(
            compositor.output_path(&bbox()),
            PathBuf::from("/data/out/DEM_-103.0_42.8_-102.5_43.2.tif")
        );

        let compositor = compositor.with_output_prefix("ELEV");
        assert!(compositor
            .output_path(&bbox())
            .ends_with("ELEV_-103.0_42.8_-102.5_43.2.tif"));
    }

    #[test]
    fn test_failed_clip_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let compositor = Compositor::new(dir.path(), CopyTool { fail_clip: true });

        let err = compositor
            .composite(&[PathBuf::from("n42w103.tif")], &bbox())
            .unwrap_err();

        assert!(matches!(err, DemError::ToolFailed { status: Some(1), .. }));
        assert!(!compositor.mosaic_path().exists());
        assert!(!compositor.output_path(&bbox()).exists());
    }

    #[test]
    fn test_missing_program_is_tool_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tool = GdalTool::new(GdalConfig {
            gdalbuildvrt: dir.path().join("no-such-gdalbuildvrt"),
            gdalwarp: dir.path().join("no-such-gdalwarp"),
        });
        let compositor = Compositor::new(dir.path().join("out"), tool);

        let err = compositor
            .composite(&[dir.path().join("n42w103.tif")], &bbox())
            .unwrap_err();

        assert!(matches!(err, DemError::ToolFailed { status: None, .. }));
        assert!(!compositor.mosaic_path().exists());
    }
}
