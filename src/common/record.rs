use geo::Geometry;
use std::collections::BTreeMap;

use super::error::{FeatureError, FeatureResult};
use super::value::{AttrValue, Attributes, Tabular, CELL_COLUMN, YEAR_COLUMN};

/// One source measurement moving through the join and aggregation stages.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub geometry: Geometry<f64>,
    pub year: Option<i32>,
    /// Grid cell code, set by the spatial joiner.
    pub cell: Option<String>,
    pub attributes: Attributes,
}

impl ObservationRecord {
    pub fn new(geometry: Geometry<f64>, attributes: Attributes) -> Self {
        Self { geometry, year: None, cell: None, attributes }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_geometry(&self, geometry: Geometry<f64>) -> Self {
        Self {
            geometry,
            year: self.year,
            cell: self.cell.clone(),
            attributes: self.attributes.clone(),
        }
    }

    pub fn attr(&self, column: &str) -> &AttrValue {
        static NULL: AttrValue = AttrValue::Null;
        self.attributes.get(column).unwrap_or(&NULL)
    }
}

impl Tabular for ObservationRecord {
    fn value(&self, column: &str) -> AttrValue {
        match column {
            CELL_COLUMN => self.cell.clone().map(AttrValue::Text).unwrap_or_default(),
            YEAR_COLUMN => self.year.map(|y| AttrValue::Number(y as f64)).unwrap_or_default(),
            _ => self.attr(column).clone(),
        }
    }
}

/// Unit of output: one row per (cell, year).
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub cell: String,
    pub year: i32,
    pub features: Attributes,
}

impl FeatureRecord {
    pub fn new(cell: impl Into<String>, year: i32) -> Self {
        Self { cell: cell.into(), year, features: Attributes::new() }
    }

    pub fn with_feature(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.features.insert(name.into(), value.into());
        self
    }

    pub fn feature(&self, name: &str) -> Option<f64> {
        self.features.get(name).and_then(AttrValue::as_f64)
    }
}

impl Tabular for FeatureRecord {
    fn value(&self, column: &str) -> AttrValue {
        match column {
            CELL_COLUMN => AttrValue::Text(self.cell.clone()),
            YEAR_COLUMN => AttrValue::Number(self.year as f64),
            _ => self.features.get(column).cloned().unwrap_or_default(),
        }
    }
}

/// Result row of a key-based reduction: the grouping key plus the reduced values.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub key: BTreeMap<String, AttrValue>,
    pub values: Attributes,
}

impl GroupRow {
    /// Converts a row keyed by `TOWNSHIP_RANGE` and `YEAR` into a [`FeatureRecord`].
    /// Any other key columns are kept as features.
    pub fn into_feature(self) -> FeatureResult<FeatureRecord> {
        let cell = self
            .key
            .get(CELL_COLUMN)
            .and_then(AttrValue::label)
            .ok_or_else(|| FeatureError::MissingColumn { column: CELL_COLUMN.to_string() })?;
        let year = self
            .key
            .get(YEAR_COLUMN)
            .and_then(AttrValue::as_f64)
            .ok_or_else(|| FeatureError::MissingColumn { column: YEAR_COLUMN.to_string() })?;

        let mut features = self.values;
        for (name, value) in self.key {
            if name != CELL_COLUMN && name != YEAR_COLUMN {
                features.insert(name, value);
            }
        }
        Ok(FeatureRecord { cell, year: year as i32, features })
    }
}

impl Tabular for GroupRow {
    fn value(&self, column: &str) -> AttrValue {
        self.key
            .get(column)
            .or_else(|| self.values.get(column))
            .cloned()
            .unwrap_or_default()
    }
}

/// Converts reduced rows into feature records, failing on rows without a cell or year.
pub fn into_features(rows: Vec<GroupRow>) -> FeatureResult<Vec<FeatureRecord>> {
    rows.into_iter().map(GroupRow::into_feature).collect()
}
