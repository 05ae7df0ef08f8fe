//! The spatial index of 7.5-minute cells.
//!
//! [`OgrIndex`] reads the national map-index geodatabase through the OGR
//! command-line programs: `ogr2ogr` streams the features intersecting a box as
//! GeoJSON sequences, and `ogrinfo` reports the layer's spatial reference.

use crate::{Result, TopoError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tnm_common::BoundingBox;
use tracing::debug;

/// Default index location, relative to the working directory.
pub const DEFAULT_INDEX_PATH: &str = "data/MapIndices_National_GDB.gdb";

/// Layer holding the 7.5-minute cell grid.
pub const DEFAULT_LAYER: &str = "CellGrid_7_5Minute";

/// Field with the quadrangle name.
pub const DEFAULT_NAME_FIELD: &str = "CELL_NAME";

/// Field with the (possibly comma-separated) state abbreviations.
pub const DEFAULT_STATE_FIELD: &str = "STATE_ALPHA";

/// One cell returned by an index query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexRecord {
    /// Quadrangle name as stored.
    pub cell_name: String,
    /// State field as stored; `None` when null.
    pub state_alpha: Option<String>,
}

impl IndexRecord {
    /// Create a record.
    pub fn new(cell_name: impl Into<String>, state_alpha: Option<&str>) -> Self {
        Self {
            cell_name: cell_name.into(),
            state_alpha: state_alpha.map(str::to_string),
        }
    }
}

/// A queryable index of quadrangle cells.
pub trait SpatialIndex: Send + Sync {
    /// Where the index lives, for diagnostics.
    fn location(&self) -> &Path;

    /// First line of the layer's spatial reference, if it can be read.
    fn spatial_ref(&self) -> Option<String>;

    /// All records whose geometry intersects `bbox`, in index order.
    ///
    /// # Errors
    /// [`TopoError::IndexUnavailable`] when the index or layer cannot be read.
    fn query(&self, bbox: &BoundingBox) -> Result<Vec<IndexRecord>>;
}

/// Index location, layer and field names, and OGR program paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Index dataset (a file geodatabase directory, or any OGR source).
    pub path: PathBuf,
    /// Layer name.
    pub layer: String,
    /// Quadrangle name field.
    pub name_field: String,
    /// State abbreviation field.
    pub state_field: String,
    /// Spatial reference of the query box, when it differs from the layer's.
    pub query_srs: Option<String>,
    /// `ogr2ogr` executable.
    pub ogr2ogr: PathBuf,
    /// `ogrinfo` executable.
    pub ogrinfo: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_INDEX_PATH),
            layer: DEFAULT_LAYER.to_string(),
            name_field: DEFAULT_NAME_FIELD.to_string(),
            state_field: DEFAULT_STATE_FIELD.to_string(),
            query_srs: None,
            ogr2ogr: PathBuf::from("ogr2ogr"),
            ogrinfo: PathBuf::from("ogrinfo"),
        }
    }
}

/// [`SpatialIndex`] backed by the OGR command-line programs.
#[derive(Debug, Clone)]
pub struct OgrIndex {
    config: IndexConfig,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: serde_json::Map<String, serde_json::Value>,
}

impl OgrIndex {
    /// Create an index reader.
    pub fn new(config: IndexConfig) -> Self {
        Self { config }
    }

    /// The active settings.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn unavailable(&self, reason: impl Into<String>) -> TopoError {
        TopoError::IndexUnavailable {
            path: self.config.path.clone(),
            reason: reason.into(),
        }
    }

    fn run(&self, command: &mut Command, program: &Path) -> Result<Output> {
        let output = command
            .output()
            .map_err(|e| self.unavailable(format!("cannot run {}: {}", program.display(), e)))?;
        if !output.status.success() {
            return Err(self.unavailable(format!(
                "{} failed: {}",
                program.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }

    /// Turn a GeoJSON feature stream into records.
    fn parse_features(&self, stream: &str) -> Result<Vec<IndexRecord>> {
        let mut records = Vec::new();
        for (number, line) in stream.lines().enumerate() {
            // GeoJSONSeq may prefix each feature with an RS character
            let line = line.trim_start_matches('\u{1e}').trim();
            if line.is_empty() {
                continue;
            }
            let feature: Feature = serde_json::from_str(line).map_err(|e| {
                self.unavailable(format!("malformed feature on line {}: {}", number + 1, e))
            })?;

            records.push(IndexRecord {
                cell_name: field_text(&feature.properties, &self.config.name_field)
                    .unwrap_or_default(),
                state_alpha: field_text(&feature.properties, &self.config.state_field),
            });
        }
        Ok(records)
    }
}

/// String form of a feature property; `None` for null or absent values.
fn field_text(
    properties: &serde_json::Map<String, serde_json::Value>,
    name: &str,
) -> Option<String> {
    match properties.get(name)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Pull the first WKT line out of `ogrinfo -so` output.
fn parse_spatial_ref(info: &str) -> Option<String> {
    let mut lines = info.lines();
    lines.find(|line| line.trim_start().starts_with("Layer SRS WKT"))?;
    let first = lines.next()?.trim();
    if first.is_empty() || first == "(unknown)" {
        None
    } else {
        Some(first.to_string())
    }
}

impl SpatialIndex for OgrIndex {
    fn location(&self) -> &Path {
        &self.config.path
    }

    fn spatial_ref(&self) -> Option<String> {
        let program = &self.config.ogrinfo;
        let mut command = Command::new(program);
        command
            .arg("-so")
            .arg(&self.config.path)
            .arg(&self.config.layer);

        match self.run(&mut command, program) {
            Ok(output) => parse_spatial_ref(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                debug!(error = %e, "Could not read index spatial reference");
                None
            }
        }
    }

    fn query(&self, bbox: &BoundingBox) -> Result<Vec<IndexRecord>> {
        if !self.config.path.exists() {
            return Err(self.unavailable("index not found"));
        }

        let program = &self.config.ogr2ogr;
        let mut command = Command::new(program);
        command.args(["-f", "GeoJSONSeq", "-spat"]);
        command.args(bbox.to_array().iter().map(|v| v.to_string()));
        if let Some(srs) = &self.config.query_srs {
            command.args(["-spat_srs", srs.as_str()]);
        }
        command
            .arg("-select")
            .arg(format!("{},{}", self.config.name_field, self.config.state_field))
            .arg("/vsistdout/")
            .arg(&self.config.path)
            .arg(&self.config.layer);

        debug!(index = %self.config.path.display(), layer = %self.config.layer, bbox = %bbox, "Querying index");
        let output = self.run(&mut command, program)?;
        self.parse_features(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_features() {
        let index = OgrIndex::new(IndexConfig::default());
        let stream = concat!(
            r#"{"type":"Feature","properties":{"CELL_NAME":"Hill City","STATE_ALPHA":"SD"},"geometry":null}"#,
            "\n",
            "\u{1e}",
            r#"{"type":"Feature","properties":{"CELL_NAME":"Ardmore","STATE_ALPHA":null}}"#,
            "\n\n",
            r#"{"type":"Feature","properties":{"CELL_NAME":"Edgemont","STATE_ALPHA":"SD,NE"}}"#,
            "\n"
        );

        let records = index.parse_features(stream).unwrap();
        assert_eq!(
            records,
            vec![
                IndexRecord::new("Hill City", Some("SD")),
                IndexRecord::new("Ardmore", None),
                IndexRecord::new("Edgemont", Some("SD,NE")),
            ]
        );
    }

    #[test]
    fn test_malformed_feature_is_index_error() {
        let index = OgrIndex::new(IndexConfig::default());
        let err = index.parse_features("{not json}\n").unwrap_err();
        assert!(matches!(err, TopoError::IndexUnavailable { ref reason, .. } if reason.contains("line 1")));
    }

    #[test]
    fn test_parse_spatial_ref() {
        let info = "INFO: Open of `index.gdb'\n      using driver `OpenFileGDB' successful.\n\n\
                    Layer name: CellGrid_7_5Minute\nGeometry: Multi Polygon\n\
                    Layer SRS WKT:\nGEOGCRS[\"NAD83\",\n    DATUM[\"North American Datum 1983\",\n";
        assert_eq!(parse_spatial_ref(info).as_deref(), Some("GEOGCRS[\"NAD83\","));

        assert_eq!(parse_spatial_ref("Layer SRS WKT:\n(unknown)\n"), None);
        assert_eq!(parse_spatial_ref("Layer name: x\n"), None);
    }

    #[test]
    fn test_missing_index_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let index = OgrIndex::new(IndexConfig {
            path: dir.path().join("absent.gdb"),
            ..IndexConfig::default()
        });

        let bbox = BoundingBox::new(-103.0, 42.8, -102.5, 43.2).unwrap();
        let err = index.query(&bbox).unwrap_err();
        assert!(matches!(err, TopoError::IndexUnavailable { .. }));
    }

    #[test]
    fn test_missing_program_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let index = OgrIndex::new(IndexConfig {
            path: dir.path().to_path_buf(),
            ogr2ogr: dir.path().join("no-such-ogr2ogr"),
            ogrinfo: dir.path().join("no-such-ogrinfo"),
            ..IndexConfig::default()
        });

        let bbox = BoundingBox::new(-103.0, 42.8, -102.5, 43.2).unwrap();
        assert!(matches!(
            index.query(&bbox),
            Err(TopoError::IndexUnavailable { .. })
        ));
        assert_eq!(index.spatial_ref(), None);
    }
}
