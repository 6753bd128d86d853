use std::path::{Path, PathBuf};

use crate::common::FeatureResult;
use crate::domains::geometry::{AttributeTable, Layer};
use crate::domains::output::FeatureTable;

/// What a geometry source hands back: the layer in its declared CRS and the number of
/// features that could not be turned into geometry.
#[derive(Debug, Clone)]
pub struct SourceRead {
    pub layer: Layer,
    pub dropped: usize,
}

/// Port the geometry store depends on for reading vector sources.
/// Adapters provide file-backed or in-memory implementations.
pub trait GeometrySource: Send + Sync {
    fn read_layer(&self, path: &Path) -> FeatureResult<SourceRead>;
}

/// Port for reading non-spatial attribute tables.
pub trait AttributeTableSource: Send + Sync {
    fn read_table(&self, path: &Path) -> FeatureResult<AttributeTable>;
}

/// Port for persisting assembled feature tables.
pub trait FeatureSink: Send + Sync {
    /// Writes the table under the given dataset name and returns where it went.
    fn write_table(&self, name: &str, table: &FeatureTable) -> FeatureResult<PathBuf>;
}
