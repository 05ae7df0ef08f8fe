//! The 1x1 degree USGS elevation tile grid.
//!
//! Tiles are named by the integer cell that contains them:
//! hemisphere letter, zero-padded absolute latitude (2 digits), hemisphere
//! letter, zero-padded absolute longitude (3 digits). The cell with
//! `floor(lat) = 42`, `floor(lon) = -72` is `n42w072`.

use crate::{DemError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tnm_common::BoundingBox;

/// Staged-products location of the 1 arc-second GeoTIFF tiles.
pub const DEFAULT_BASE_URL: &str =
    "https://prd-tnm.s3.amazonaws.com/StagedProducts/Elevation/1/TIFF/current";

/// Remote filename prefix in front of the tile key.
pub const DEFAULT_FILE_PREFIX: &str = "USGS_1_";

/// Identifier of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// Integer latitude of the cell (negative for south).
    pub lat: i32,
    /// Integer longitude of the cell (negative for west).
    pub lon: i32,
}

impl TileKey {
    /// Create a key from integer cell coordinates.
    pub const fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }

    /// Key of the cell containing a coordinate.
    pub fn from_coord(lat: f64, lon: f64) -> Self {
        Self {
            lat: lat.floor() as i32,
            lon: lon.floor() as i32,
        }
    }

    /// Find a key embedded in a filename such as `USGS_1_n42w072_20230101.tif`.
    ///
    /// The first `[ns]<digits>[ew]<digits>` token wins.
    pub fn from_filename(filename: &str) -> Option<Self> {
        filename
            .char_indices()
            .filter(|(_, c)| *c == 'n' || *c == 's')
            .find_map(|(start, _)| parse_token(&filename[start..]).map(|(key, _)| key))
    }

    /// Geographic extent of the cell.
    pub fn bounds(&self) -> TileBounds {
        TileBounds {
            min_lat: self.lat as f64,
            max_lat: self.lat as f64 + 1.0,
            min_lon: self.lon as f64,
            max_lon: self.lon as f64 + 1.0,
        }
    }
}

/// Parse a key at the start of `s`, returning it and the number of bytes used.
fn parse_token(s: &str) -> Option<(TileKey, usize)> {
    let bytes = s.as_bytes();
    let north = match bytes.first()? {
        b'n' => true,
        b's' => false,
        _ => return None,
    };

    let lat_digits = count_digits(&bytes[1..]);
    if lat_digits == 0 {
        return None;
    }
    let lat_end = 1 + lat_digits;

    let east = match bytes.get(lat_end)? {
        b'e' => true,
        b'w' => false,
        _ => return None,
    };

    let lon_start = lat_end + 1;
    let lon_digits = count_digits(&bytes[lon_start..]);
    if lon_digits == 0 {
        return None;
    }
    let lon_end = lon_start + lon_digits;

    let lat: i32 = s[1..lat_end].parse().ok()?;
    let lon: i32 = s[lon_start..lon_end].parse().ok()?;
    if lat > 90 || lon > 180 {
        return None;
    }

    let key = TileKey {
        lat: if north { lat } else { -lat },
        lon: if east { lon } else { -lon },
    };
    Some((key, lon_end))
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = if self.lat >= 0 { 'n' } else { 's' };
        let ew = if self.lon >= 0 { 'e' } else { 'w' };
        write!(
            f,
            "{}{:02}{}{:03}",
            ns,
            self.lat.unsigned_abs(),
            ew,
            self.lon.unsigned_abs()
        )
    }
}

impl FromStr for TileKey {
    type Err = DemError;

    fn from_str(s: &str) -> Result<Self> {
        match parse_token(s) {
            Some((key, used)) if used == s.len() => Ok(key),
            _ => Err(DemError::InvalidTileKey(s.to_string())),
        }
    }
}

impl Serialize for TileKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Geographic bounds of a tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileBounds {
    /// Minimum latitude (south edge).
    pub min_lat: f64,
    /// Maximum latitude (north edge).
    pub max_lat: f64,
    /// Minimum longitude (west edge).
    pub min_lon: f64,
    /// Maximum longitude (east edge).
    pub max_lon: f64,
}

impl TileBounds {
    /// Check if a coordinate is within the bounds.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// Key of the cell at integer coordinates.
pub fn tile_key(lat: i32, lon: i32) -> TileKey {
    TileKey::new(lat, lon)
}

/// Every cell touched by a bounding box, latitude-outer, longitude-inner.
///
/// Cells are selected by flooring each edge, so a box edge lying exactly on an
/// integer line pulls in the cell on its north or east side.
pub fn tiles_for_bbox(bbox: &BoundingBox) -> Vec<TileKey> {
    let lon_range = bbox.xmin().floor() as i32..=bbox.xmax().floor() as i32;
    let lat_range = bbox.ymin().floor() as i32..=bbox.ymax().floor() as i32;

    lat_range
        .flat_map(|lat| lon_range.clone().map(move |lon| TileKey::new(lat, lon)))
        .collect()
}

/// Remote URL of a tile on the default grid.
pub fn tile_url(key: &TileKey) -> String {
    TileGrid::default().url(key)
}

/// Where tiles live remotely and what they are called locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TileGrid {
    /// URL prefix; each tile sits in a `<key>/` folder below it.
    pub base_url: String,
    /// Remote filename prefix in front of the key.
    pub file_prefix: String,
}

impl Default for TileGrid {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
        }
    }
}

impl TileGrid {
    /// Remote URL: `{base}/{key}/{prefix}{key}.tif`.
    pub fn url(&self, key: &TileKey) -> String {
        format!(
            "{}/{}/{}{}.tif",
            self.base_url.trim_end_matches('/'),
            key,
            self.file_prefix,
            key
        )
    }

    /// Local cache filename: `{key}.tif`.
    pub fn cache_file_name(&self, key: &TileKey) -> String {
        format!("{}.tif", key)
    }
}
