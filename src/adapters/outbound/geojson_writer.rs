use geojson::{Feature, FeatureCollection, JsonObject};
use std::fs;
use std::path::Path;

use crate::common::{FeatureError, FeatureResult};
use crate::domains::geometry::{Layer, REFERENCE_EPSG};

/// Serializes layers, typically the region grid, as GeoJSON feature collections.
pub struct GeoJsonGridWriter;

impl GeoJsonGridWriter {
    pub fn to_collection(layer: &Layer) -> FeatureCollection {
        let features = layer
            .records
            .iter()
            .map(|record| {
                let properties: JsonObject = record
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(geojson::Value::from(&record.geometry))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        // Non-default systems are named with the legacy member so readers can tell.
        let foreign_members = (layer.crs.epsg() != REFERENCE_EPSG).then(|| {
            let mut members = JsonObject::new();
            members.insert(
                "crs".to_string(),
                serde_json::json!({
                    "type": "name",
                    "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", layer.crs.epsg()) }
                }),
            );
            members
        });

        FeatureCollection { bbox: None, features, foreign_members }
    }

    pub fn write(layer: &Layer, path: &Path) -> FeatureResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string(&Self::to_collection(layer))
            .map_err(|e| FeatureError::format(path.display().to_string(), e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }
}
