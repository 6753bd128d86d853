use std::collections::BTreeMap;

use super::crs::{reproject, Crs};
use crate::common::{ColumnKind, FeatureError, FeatureResult, ObservationRecord};

/// A named collection of observation records sharing one coordinate reference system.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub crs: Crs,
    pub records: Vec<ObservationRecord>,
}

impl Layer {
    pub fn new(name: impl Into<String>, crs: Crs, records: Vec<ObservationRecord>) -> Self {
        Self { name: name.into(), crs, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column name → kind, inferred from the non-null values of every record.
    /// A column that only ever holds nulls has no kind.
    pub fn schema(&self) -> BTreeMap<String, Option<ColumnKind>> {
        let mut schema: BTreeMap<String, Option<ColumnKind>> = BTreeMap::new();
        for record in &self.records {
            for (name, value) in &record.attributes {
                let slot = schema.entry(name.clone()).or_insert(None);
                if slot.is_none() {
                    *slot = value.kind();
                }
            }
        }
        schema
    }

    /// Spatial operations refuse to mix coordinate systems.
    pub fn ensure_crs(&self, expected: &Crs) -> FeatureResult<()> {
        if &self.crs == expected {
            Ok(())
        } else {
            Err(FeatureError::projection(format!(
                "layer `{}` is in {} but the operation requires {}",
                self.name, self.crs, expected
            )))
        }
    }

    pub fn reproject(self, to: &Crs) -> FeatureResult<Layer> {
        if &self.crs == to {
            return Ok(self);
        }
        let from = self.crs;
        let records = self
            .records
            .into_iter()
            .map(|mut record| {
                record.geometry = reproject(&record.geometry, &from, to)?;
                Ok(record)
            })
            .collect::<FeatureResult<Vec<_>>>()?;
        Ok(Layer { name: self.name, crs: *to, records })
    }

    /// Splits records by year, ascending, records without a year first.
    pub fn partition_by_year(self) -> BTreeMap<Option<i32>, Vec<ObservationRecord>> {
        let mut parts: BTreeMap<Option<i32>, Vec<ObservationRecord>> = BTreeMap::new();
        for record in self.records {
            parts.entry(record.year).or_default().push(record);
        }
        parts
    }

    pub fn with_records(&self, records: Vec<ObservationRecord>) -> Layer {
        Layer { name: self.name.clone(), crs: self.crs, records }
    }
}
