//! Settings for the quadrangle job.

use crate::index::IndexConfig;
use crate::quad::TopoProduct;
use serde::{Deserialize, Serialize};

/// Quadrangle job configuration.
///
/// ```yaml
/// product:
///   format: GPKG
/// index:
///   path: data/MapIndices_National_GDB.gdb
///   layer: CellGrid_7_5Minute
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopoConfig {
    /// Remote product location and format.
    pub product: TopoProduct,
    /// Spatial index settings.
    pub index: IndexConfig,
}
