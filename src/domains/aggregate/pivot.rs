use geo::{Area, Geometry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::common::{log_dropped, AttrValue, FeatureRecord, FeatureResult, Stage};
use crate::domains::geometry::{reproject, Crs, Layer};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AreaOptions {
    /// Prefix of generated category columns.
    #[serde(default)]
    pub prefix: String,
    /// Equal-area system areas are measured in; the layer's own CRS when unset.
    #[serde(default)]
    pub area_crs: Option<Crs>,
}

fn piece_area(geometry: &Geometry<f64>, layer_crs: &Crs, area_crs: Option<&Crs>) -> FeatureResult<f64> {
    match area_crs {
        Some(target) if target != layer_crs => Ok(reproject(geometry, layer_crs, target)?.unsigned_area()),
        _ => Ok(geometry.unsigned_area()),
    }
}

/// Converts categorical coverage into per-(cell, year) area shares.
///
/// Each category present anywhere in the input becomes a `{prefix}{category}` column holding
/// the category's share of the categorized area of that cell and year, 0 where absent.
/// Shares of a row sum to 1. Pieces without a cell, year or category are left out.
pub fn area_weighted_pivot(layer: &Layer, category_column: &str, options: &AreaOptions) -> FeatureResult<Vec<FeatureRecord>> {
    let mut areas: BTreeMap<(String, i32), BTreeMap<String, f64>> = BTreeMap::new();
    let mut categories: BTreeSet<String> = BTreeSet::new();
    let mut skipped = 0usize;

    for record in &layer.records {
        let (Some(cell), Some(year), Some(category)) =
            (record.cell.as_ref(), record.year, record.attr(category_column).label())
        else {
            skipped += 1;
            continue;
        };
        let area = piece_area(&record.geometry, &layer.crs, options.area_crs.as_ref())?;
        *areas
            .entry((cell.clone(), year))
            .or_default()
            .entry(category.clone())
            .or_insert(0.0) += area;
        categories.insert(category);
    }
    log_dropped(Stage::Aggregate, "no cell, year or category", skipped, layer.len());

    let mut out = Vec::with_capacity(areas.len());
    for ((cell, year), by_category) in areas {
        let total: f64 = by_category.values().sum();
        if total <= 0.0 {
            warn!(%cell, year, "no categorized area, row left out");
            continue;
        }
        let mut record = FeatureRecord::new(cell, year);
        for category in &categories {
            let share = by_category.get(category).copied().unwrap_or(0.0) / total;
            record.features.insert(format!("{}{}", options.prefix, category), AttrValue::Number(share));
        }
        out.push(record);
    }
    Ok(out)
}

/// Per-(cell, year) mean of each value column weighted by piece area. Missing values are
/// left out of both the sum and the weight; a cell with no value stays missing.
pub fn area_weighted_mean<S: AsRef<str>>(
    layer: &Layer,
    value_columns: &[S],
    options: &AreaOptions,
) -> FeatureResult<Vec<FeatureRecord>> {
    let mut sums: BTreeMap<(String, i32), Vec<(f64, f64)>> = BTreeMap::new();
    let mut skipped = 0usize;

    for record in &layer.records {
        let (Some(cell), Some(year)) = (record.cell.as_ref(), record.year) else {
            skipped += 1;
            continue;
        };
        let area = piece_area(&record.geometry, &layer.crs, options.area_crs.as_ref())?;
        let slot = sums
            .entry((cell.clone(), year))
            .or_insert_with(|| vec![(0.0, 0.0); value_columns.len()]);
        for (i, column) in value_columns.iter().enumerate() {
            if let Some(v) = record.attr(column.as_ref()).as_f64() {
                slot[i].0 += v * area;
                slot[i].1 += area;
            }
        }
    }
    log_dropped(Stage::Aggregate, "no cell or year", skipped, layer.len());

    Ok(sums
        .into_iter()
        .map(|((cell, year), columns)| {
            let mut record = FeatureRecord::new(cell, year);
            for (column, (weighted, weight)) in value_columns.iter().zip(columns) {
                let value = if weight > 0.0 {
                    AttrValue::Number(weighted / weight)
                } else {
                    AttrValue::Null
                };
                record.features.insert(format!("{}{}", options.prefix, column.as_ref()), value);
            }
            record
        })
        .collect())
}
