use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::common::{AttrValue, ColumnKind, FeatureRecord, CELL_COLUMN, YEAR_COLUMN};

/// Flat, geometry-free output: feature columns plus rows sorted by (year, cell).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureTable {
    /// Feature columns, without the key columns.
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRecord>,
}

impl FeatureTable {
    /// Full header: key columns first, then features.
    pub fn header(&self) -> Vec<String> {
        let mut header = vec![CELL_COLUMN.to_string(), YEAR_COLUMN.to_string()];
        header.extend(self.columns.iter().cloned());
        header
    }

    pub fn row(&self, cell: &str, year: i32) -> Option<&FeatureRecord> {
        self.rows.iter().find(|r| r.cell == cell && r.year == year)
    }

    pub fn cells_in_year(&self, year: i32) -> Vec<&str> {
        self.rows.iter().filter(|r| r.year == year).map(|r| r.cell.as_str()).collect()
    }

    /// Rescales `columns` so each row sums to 1. Rows summing to 0 are left alone.
    pub fn renormalized<S: AsRef<str>>(self, columns: &[S]) -> FeatureTable {
        let rows = self
            .rows
            .into_iter()
            .map(|mut row| {
                let total: f64 = columns.iter().filter_map(|c| row.feature(c.as_ref())).sum();
                if total > 0.0 {
                    for column in columns {
                        if let Some(v) = row.feature(column.as_ref()) {
                            row.features.insert(column.as_ref().to_string(), AttrValue::Number(v / total));
                        }
                    }
                }
                row
            })
            .collect();
        FeatureTable { columns: self.columns, rows }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub table: FeatureTable,
    /// Numeric columns removed because their maximum stayed below the coverage threshold.
    pub pruned: Vec<String>,
}

/// Builds the output table: removes `drop_columns`, prunes numeric columns whose maximum
/// is below `min_coverage`, gives every row every column (missing as null) and sorts by
/// year, then cell.
///
/// Pruning category share columns breaks their row sums; see [`FeatureTable::renormalized`].
pub fn to_table<S: AsRef<str>>(records: Vec<FeatureRecord>, drop_columns: &[S], min_coverage: Option<f64>) -> Assembled {
    let dropped: BTreeSet<&str> = drop_columns.iter().map(|c| c.as_ref()).collect();

    let mut maxima: BTreeMap<String, (Option<ColumnKind>, f64)> = BTreeMap::new();
    for record in &records {
        for (name, value) in &record.features {
            if dropped.contains(name.as_str()) {
                continue;
            }
            let entry = maxima.entry(name.clone()).or_insert((None, f64::NEG_INFINITY));
            match value {
                AttrValue::Number(v) => {
                    entry.1 = entry.1.max(*v);
                    entry.0.get_or_insert(ColumnKind::Numeric);
                }
                AttrValue::Text(_) => entry.0 = Some(ColumnKind::Text),
                AttrValue::Null => {}
            }
        }
    }

    let mut pruned = Vec::new();
    let mut columns = Vec::new();
    for (name, (kind, max)) in maxima {
        match (kind, min_coverage) {
            (Some(ColumnKind::Numeric), Some(threshold)) if max < threshold => pruned.push(name),
            _ => columns.push(name),
        }
    }

    let mut rows: Vec<FeatureRecord> = records
        .into_iter()
        .map(|record| {
            let features = columns
                .iter()
                .map(|c| (c.clone(), record.features.get(c).cloned().unwrap_or_default()))
                .collect();
            FeatureRecord { cell: record.cell, year: record.year, features }
        })
        .collect();
    rows.sort_by(|a, b| a.year.cmp(&b.year).then_with(|| a.cell.cmp(&b.cell)));

    if !pruned.is_empty() {
        info!(pruned = ?pruned, "pruned low-coverage columns");
    }
    Assembled { table: FeatureTable { columns, rows }, pruned }
}
