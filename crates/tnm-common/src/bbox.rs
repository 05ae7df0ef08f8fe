//! Geographic bounding box.

use crate::{CommonError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A WGS84 longitude/latitude rectangle.
///
/// The box is validated once on construction and is immutable afterwards:
/// every coordinate is finite, longitudes lie in `[-180, 180]`, latitudes in
/// `[-90, 90]`, `xmin <= xmax` and `ymin <= ymax`. Zero-width
/// boxes (a single meridian or parallel) are accepted since they still select
/// exactly one row or column of tiles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBoundingBox")]
pub struct BoundingBox {
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
}

#[derive(Deserialize)]
struct RawBoundingBox {
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
}

impl TryFrom<RawBoundingBox> for BoundingBox {
    type Error = CommonError;

    fn try_from(raw: RawBoundingBox) -> Result<Self> {
        BoundingBox::new(raw.xmin, raw.ymin, raw.xmax, raw.ymax)
    }
}

impl BoundingBox {
    /// Create a bounding box, rejecting inverted, out-of-range or non-finite rectangles.
    ///
    /// # Arguments
    /// * `xmin` - West edge (minimum longitude)
    /// * `ymin` - South edge (minimum latitude)
    /// * `xmax` - East edge (maximum longitude)
    /// * `ymax` - North edge (maximum latitude)
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Result<Self> {
        let invalid = |reason: &str| CommonError::InvalidBoundingBox {
            xmin,
            ymin,
            xmax,
            ymax,
            reason: reason.to_string(),
        };

        if ![xmin, ymin, xmax, ymax].iter().all(|v| v.is_finite()) {
            return Err(invalid("all coordinates must be finite"));
        }
        if !(-180.0..=180.0).contains(&xmin) || !(-180.0..=180.0).contains(&xmax) {
            return Err(invalid("longitudes must lie within [-180, 180]"));
        }
        if !(-90.0..=90.0).contains(&ymin) || !(-90.0..=90.0).contains(&ymax) {
            return Err(invalid("latitudes must lie within [-90, 90]"));
        }
        if xmin > xmax {
            return Err(invalid("xmin must not exceed xmax"));
        }
        if ymin > ymax {
            return Err(invalid("ymin must not exceed ymax"));
        }

        Ok(Self {
            xmin,
            ymin,
            xmax,
            ymax,
        })
    }

    /// Build a box from `[xmin, ymin, xmax, ymax]`.
    pub fn from_array(values: [f64; 4]) -> Result<Self> {
        Self::new(values[0], values[1], values[2], values[3])
    }

    /// West edge.
    pub fn xmin(&self) -> f64 {
        self.xmin
    }

    /// South edge.
    pub fn ymin(&self) -> f64 {
        self.ymin
    }

    /// East edge.
    pub fn xmax(&self) -> f64 {
        self.xmax
    }

    /// North edge.
    pub fn ymax(&self) -> f64 {
        self.ymax
    }

    /// The four coordinates in `xmin, ymin, xmax, ymax` order.
    pub fn to_array(&self) -> [f64; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }

    /// Check if a longitude/latitude point lies inside the box (edges included).
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.xmin && lon <= self.xmax && lat >= self.ymin && lat <= self.ymax
    }

    /// The coordinates joined as `xmin_ymin_xmax_ymax`.
    ///
    /// Each value keeps a fractional part (`-103.0`, not `-103`) so names built
    /// from the same box are identical across runs and tools.
    pub fn coordinate_fragment(&self) -> String {
        self.to_array()
            .iter()
            .map(|v| format_coordinate(*v))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Shortest round-trip decimal form, always with a fractional part.
fn format_coordinate(value: f64) -> String {
    format!("{:?}", value)
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            format_coordinate(self.xmin),
            format_coordinate(self.ymin),
            format_coordinate(self.xmax),
            format_coordinate(self.ymax)
        )
    }
}

impl FromStr for BoundingBox {
    type Err = CommonError;

    /// Parse `"xmin,ymin,xmax,ymax"` (whitespace around values is ignored).
    fn from_str(s: &str) -> Result<Self> {
        let values: Vec<f64> = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| CommonError::UnparsableBoundingBox(s.to_string()))?;

        let values: [f64; 4] = values
            .try_into()
            .map_err(|_| CommonError::UnparsableBoundingBox(s.to_string()))?;

        Self::from_array(values)
    }
}
