//! Quadrangle keys and product naming.

use crate::{Result, TopoError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Staged-products location of the topographic vector quadrangles.
pub const DEFAULT_BASE_URL: &str = "https://prd-tnm.s3.amazonaws.com/StagedProducts/TopoMapVector";

/// Default product format.
pub const DEFAULT_FORMAT: &str = "GPKG";

/// Normalized `(quad_name, state)` identity of a 7.5-minute quadrangle.
///
/// Two index records with the same key are one download unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QuadrangleKey {
    quad_name: String,
    state: String,
}

impl QuadrangleKey {
    /// Normalize a cell name and a (possibly multi-valued) state field.
    ///
    /// The trimmed name has each space replaced by `_`; the state is the first
    /// comma-separated token, trimmed and upper-cased. A missing or empty
    /// state, or an empty name, is rejected.
    pub fn normalize(cell_name: &str, state_field: Option<&str>) -> Result<Self> {
        Self::from_fields(cell_name, state_field).map_err(|reason| TopoError::InvalidRecord {
            cell_name: cell_name.to_string(),
            reason: reason.to_string(),
        })
    }

    /// Same rules as [`normalize`](Self::normalize), failing with the bare reason.
    pub(crate) fn from_fields(
        cell_name: &str,
        state_field: Option<&str>,
    ) -> std::result::Result<Self, &'static str> {
        let state = state_field
            .and_then(|field| field.split(',').next())
            .map(|token| token.trim().to_uppercase())
            .unwrap_or_default();
        if state.is_empty() {
            return Err("state field is empty");
        }

        let quad_name = cell_name.trim().replace(' ', "_");
        if quad_name.is_empty() {
            return Err("cell name is empty");
        }

        Ok(Self { quad_name, state })
    }

    /// Cell name with spaces replaced by `_`.
    pub fn quad_name(&self) -> &str {
        &self.quad_name
    }

    /// Upper-case state abbreviation.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Product file stem: `VECTOR_{quad}_{STATE}_7_5_Min_{FORMAT}`.
    pub fn product_stem(&self, format: &str) -> String {
        format!("VECTOR_{}_{}_7_5_Min_{}", self.quad_name, self.state, format)
    }

    /// Remote archive filename.
    pub fn archive_name(&self, format: &str) -> String {
        format!("{}.zip", self.product_stem(format))
    }

    /// Extracted filename, with the lower-cased format as extension.
    pub fn extracted_name(&self, format: &str) -> String {
        format!("{}.{}", self.product_stem(format), format.to_lowercase())
    }
}

impl fmt::Display for QuadrangleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.quad_name, self.state)
    }
}

/// Remote location and format of the quadrangle products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopoProduct {
    /// URL prefix; archives sit in `{STATE}/{FORMAT}/` below it.
    pub base_url: String,
    /// Product format, e.g. `GPKG` or `Shape`.
    pub format: String,
}

impl Default for TopoProduct {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            format: DEFAULT_FORMAT.to_string(),
        }
    }
}

impl TopoProduct {
    /// Archive URL: `{base}/{STATE}/{FORMAT}/{archive}`.
    pub fn url(&self, key: &QuadrangleKey) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            key.state(),
            self.format,
            key.archive_name(&self.format)
        )
    }

    /// Archive filename for a key.
    pub fn archive_name(&self, key: &QuadrangleKey) -> String {
        key.archive_name(&self.format)
    }

    /// Extracted filename for a key.
    pub fn extracted_name(&self, key: &QuadrangleKey) -> String {
        key.extracted_name(&self.format)
    }

    /// Extension of the archive member to extract, with a leading dot.
    pub fn member_extension(&self) -> String {
        format!(".{}", self.format.to_lowercase())
    }
}
