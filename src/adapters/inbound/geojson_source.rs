use geojson::GeoJson;
use std::fs;
use std::path::Path;

use crate::common::{AttrValue, Attributes, FeatureError, FeatureResult, ObservationRecord};
use crate::domains::geometry::{Crs, Layer};
use crate::domains::ports::{GeometrySource, SourceRead};

/// Reads GeoJSON files. A legacy `crs` member is honoured; otherwise coordinates are
/// EPSG:4326 as RFC 7946 requires.
#[derive(Debug, Default)]
pub struct GeoJsonSource;

impl GeoJsonSource {
    pub fn new() -> Self {
        Self
    }

    /// Parses GeoJSON text. `origin` names the source in errors and becomes the layer name.
    pub fn parse_str(&self, origin: &str, text: &str) -> FeatureResult<SourceRead> {
        let parsed: GeoJson = text
            .parse()
            .map_err(|e: geojson::Error| FeatureError::format(origin, e.to_string()))?;

        let (features, crs) = match parsed {
            GeoJson::FeatureCollection(fc) => {
                let crs = match fc.foreign_members.as_ref().and_then(|m| m.get("crs")) {
                    Some(member) => named_crs(origin, member)?,
                    None => Crs::wgs84(),
                };
                (fc.features, crs)
            }
            GeoJson::Feature(f) => (vec![f], Crs::wgs84()),
            GeoJson::Geometry(g) => (vec![geojson::Feature::from(g)], Crs::wgs84()),
        };

        let mut records = Vec::with_capacity(features.len());
        let mut dropped = 0usize;
        for feature in features {
            let geometry = feature
                .geometry
                .and_then(|g| geo::Geometry::<f64>::try_from(g).ok());
            let Some(geometry) = geometry else {
                dropped += 1;
                continue;
            };
            let attributes: Attributes = feature
                .properties
                .unwrap_or_default()
                .iter()
                .map(|(k, v)| (k.clone(), AttrValue::from_json(v)))
                .collect();
            records.push(ObservationRecord::new(geometry, attributes));
        }

        let name = Path::new(origin)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(origin)
            .to_string();
        Ok(SourceRead { layer: Layer::new(name, crs, records), dropped })
    }
}

fn named_crs(origin: &str, member: &serde_json::Value) -> FeatureResult<Crs> {
    let name = member
        .get("properties")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
        .ok_or_else(|| FeatureError::projection(format!("{}: crs member has no name", origin)))?;
    Crs::parse(name)
}

impl GeometrySource for GeoJsonSource {
    fn read_layer(&self, path: &Path) -> FeatureResult<SourceRead> {
        let text = fs::read_to_string(path)?;
        self.parse_str(&path.display().to_string(), &text)
    }
}
