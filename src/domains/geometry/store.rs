use geo::{CoordsIter, Geometry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::crs::Crs;
use super::layer::Layer;
use crate::common::{
    log_dropped, AttrValue, Attributes, ColumnKind, FeatureError, FeatureResult, ObservationRecord, Stage,
};
use crate::domains::ports::GeometrySource;

/// Non-spatial table merged into a layer on a key column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeTable {
    pub columns: Vec<String>,
    pub rows: Vec<Attributes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinKeys {
    /// Attribute on the geometry side.
    pub left: String,
    /// Column on the table side.
    pub right: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    #[default]
    Left,
}

/// A loaded working collection and the bookkeeping needed for row-loss reporting.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub layer: Layer,
    /// Features read from all sources, before any drop.
    pub read: usize,
    /// Features dropped because their geometry was unusable.
    pub dropped: usize,
}

/// Loads vector sources through a [`GeometrySource`], reprojects them onto one reference
/// system and concatenates them.
pub struct GeometryStore {
    source: Arc<dyn GeometrySource>,
    reference: Crs,
}

impl GeometryStore {
    pub fn new(source: Arc<dyn GeometrySource>) -> Self {
        Self { source, reference: Crs::wgs84() }
    }

    pub fn with_reference(mut self, reference: Crs) -> Self {
        self.reference = reference;
        self
    }

    pub fn load<P: AsRef<Path>>(&self, name: &str, paths: &[P]) -> FeatureResult<LoadOutcome> {
        let mut records: Vec<ObservationRecord> = Vec::new();
        let mut schema: BTreeMap<String, Option<ColumnKind>> = BTreeMap::new();
        let mut read = 0usize;
        let mut dropped = 0usize;

        for path in paths {
            let path = path.as_ref();
            let source_read = self.source.read_layer(path)?;
            read += source_read.layer.len() + source_read.dropped;
            dropped += source_read.dropped;

            let (normalized, unusable) = normalize(source_read.layer, &self.reference);
            dropped += unusable;

            let next = normalized.schema();
            reconcile(&schema, &next, &path.display().to_string())?;
            for (column, kind) in next {
                let slot = schema.entry(column).or_insert(None);
                if slot.is_none() {
                    *slot = kind;
                }
            }
            debug!(source = %path.display(), records = normalized.len(), "source loaded");
            records.extend(normalized.records);
        }

        for record in &mut records {
            for column in schema.keys() {
                record.attributes.entry(column.clone()).or_insert(AttrValue::Null);
            }
        }

        log_dropped(Stage::Load, "unusable geometry", dropped, read);
        info!(dataset = name, sources = paths.len(), records = records.len(), "geometry loaded");
        Ok(LoadOutcome { layer: Layer::new(name, self.reference, records), read, dropped })
    }
}

/// Reprojects onto `reference`, explodes multi-points and drops geometry that cannot take
/// part in a join. Returns the layer and the number of records dropped.
fn normalize(layer: Layer, reference: &Crs) -> (Layer, usize) {
    let from = layer.crs;
    let mut out = Vec::with_capacity(layer.records.len());
    let mut dropped = 0usize;

    for record in layer.records {
        let usable = record.geometry.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite());
        let geometry = if usable {
            super::crs::reproject(&record.geometry, &from, reference).ok()
        } else {
            None
        };
        match geometry {
            Some(Geometry::Point(p)) => out.push(record.with_geometry(Geometry::Point(p))),
            Some(Geometry::MultiPoint(mp)) if !mp.0.is_empty() => {
                for p in mp {
                    out.push(record.with_geometry(Geometry::Point(p)));
                }
            }
            Some(Geometry::Polygon(p)) => out.push(record.with_geometry(Geometry::Polygon(p))),
            Some(Geometry::MultiPolygon(mp)) if !mp.0.is_empty() => {
                out.push(record.with_geometry(Geometry::MultiPolygon(mp)))
            }
            _ => dropped += 1,
        }
    }
    (Layer::new(layer.name, *reference, out), dropped)
}

fn reconcile(
    acc: &BTreeMap<String, Option<ColumnKind>>,
    next: &BTreeMap<String, Option<ColumnKind>>,
    origin: &str,
) -> FeatureResult<()> {
    if !acc.is_empty() && !next.is_empty() && !next.keys().any(|k| acc.contains_key(k)) {
        return Err(FeatureError::schema(format!(
            "source {} shares no attribute with previously loaded sources",
            origin
        )));
    }
    for (column, kind) in next {
        if let (Some(Some(a)), Some(b)) = (acc.get(column), kind) {
            if a != b {
                return Err(FeatureError::schema(format!(
                    "column `{}` is {:?} in earlier sources but {:?} in {}",
                    column, a, b, origin
                )));
            }
        }
    }
    Ok(())
}

/// Merges a non-spatial table into the layer. One output record per matching table row;
/// unmatched records are dropped (inner) or kept with null table columns (left).
pub fn attach_attributes(layer: Layer, table: &AttributeTable, keys: &JoinKeys, how: JoinType) -> FeatureResult<Layer> {
    if !table.columns.iter().any(|c| c == &keys.right) {
        return Err(FeatureError::MissingColumn { column: keys.right.clone() });
    }
    if !layer.is_empty() && !layer.records.iter().any(|r| r.attributes.contains_key(&keys.left)) {
        return Err(FeatureError::MissingColumn { column: keys.left.clone() });
    }

    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        if let Some(label) = row.get(&keys.right).and_then(AttrValue::label) {
            index.entry(label).or_default().push(i);
        }
    }

    let incoming: Vec<(&String, String)> = table
        .columns
        .iter()
        .filter(|c| !(*c == &keys.right && keys.right == keys.left))
        .map(|c| {
            let target = if c != &keys.right && layer_has_column(&layer, c) {
                format!("{}_right", c)
            } else {
                c.clone()
            };
            (c, target)
        })
        .collect();

    let total = layer.len();
    let mut unmatched = 0usize;
    let mut out = Vec::with_capacity(total);
    for record in &layer.records {
        let matches = record
            .attr(&keys.left)
            .label()
            .and_then(|label| index.get(&label))
            .filter(|rows| !rows.is_empty());
        match matches {
            Some(rows) => {
                for &i in rows {
                    let mut merged = record.clone();
                    for (column, target) in &incoming {
                        let value = table.rows[i].get(*column).cloned().unwrap_or_default();
                        merged.attributes.insert(target.clone(), value);
                    }
                    out.push(merged);
                }
            }
            None => {
                unmatched += 1;
                if how == JoinType::Left {
                    let mut kept = record.clone();
                    for (_, target) in &incoming {
                        kept.attributes.insert(target.clone(), AttrValue::Null);
                    }
                    out.push(kept);
                }
            }
        }
    }

    if how == JoinType::Inner {
        log_dropped(Stage::Attach, "no matching attribute row", unmatched, total);
    } else if unmatched > 0 {
        debug!(unmatched, total, "left join kept records without attribute rows");
    }
    Ok(layer.with_records(out))
}

fn layer_has_column(layer: &Layer, column: &str) -> bool {
    layer.records.iter().any(|r| r.attributes.contains_key(column))
}

/// Reads the year of every record from `column`. Accepts numbers, integer text, ISO-like
/// dates (`2016-05-01`) and US dates (`05/01/2016`). Records without a readable year are
/// dropped.
pub fn assign_years(layer: Layer, column: &str) -> Layer {
    let total = layer.len();
    let mut dropped = 0usize;
    let records: Vec<ObservationRecord> = layer
        .records
        .iter()
        .filter_map(|record| match parse_year(record.attr(column)) {
            Some(year) => Some(ObservationRecord { year: Some(year), ..record.clone() }),
            None => {
                dropped += 1;
                None
            }
        })
        .collect();
    log_dropped(Stage::Load, "unreadable year", dropped, total);
    layer.with_records(records)
}

/// Stamps every record with the same year, for datasets observed once.
pub fn assign_static_year(layer: Layer, year: i32) -> Layer {
    let records = layer
        .records
        .into_iter()
        .map(|mut record| {
            record.year = Some(year);
            record
        })
        .collect();
    Layer { records, ..layer }
}

fn parse_year(value: &AttrValue) -> Option<i32> {
    match value {
        AttrValue::Number(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i32),
        AttrValue::Text(s) => {
            let date = s.split_whitespace().next()?;
            if let Ok(year) = date.parse::<i32>() {
                return Some(year);
            }
            let parts: Vec<&str> = date.split(['-', '/']).collect();
            if parts.len() != 3 {
                return None;
            }
            let year = if parts[0].len() == 4 {
                parts[0]
            } else if date.contains('/') && parts[2].len() == 4 {
                parts[2]
            } else {
                return None;
            };
            if !year.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            year.parse().ok()
        }
        _ => None,
    }
}
