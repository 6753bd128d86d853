use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::common::{FeatureError, FeatureResult};
use crate::domains::geometry::Layer;
use crate::domains::ports::{GeometrySource, SourceRead};

/// Geometry source backed by layers registered in memory, keyed by path.
#[derive(Debug, Default)]
pub struct MemorySource {
    layers: RwLock<HashMap<PathBuf, Layer>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(self, path: impl Into<PathBuf>, layer: Layer) -> Self {
        self.insert(path, layer);
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, layer: Layer) {
        if let Ok(mut layers) = self.layers.write() {
            layers.insert(path.into(), layer);
        }
    }
}

impl GeometrySource for MemorySource {
    fn read_layer(&self, path: &Path) -> FeatureResult<SourceRead> {
        let layers = self
            .layers
            .read()
            .map_err(|_| FeatureError::format(path.display().to_string(), "layer registry poisoned"))?;
        let layer = layers.get(path).cloned().ok_or_else(|| {
            FeatureError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no layer registered at {}", path.display()),
            ))
        })?;
        Ok(SourceRead { layer, dropped: 0 })
    }
}
