use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::common::{log_dropped, AttrValue, Attributes, GroupRow, KeyPart, Stage, Tabular};

/// Reduction applied to each group of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunc {
    Mean,
    Median,
    Min,
    Max,
    Count,
    Sum,
}

impl AggFunc {
    /// Reduces the non-missing values of one group. `None` means the result is missing.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return match self {
                AggFunc::Count => Some(0.0),
                _ => None,
            };
        }
        let n = values.len() as f64;
        Some(match self {
            AggFunc::Mean => values.iter().sum::<f64>() / n,
            AggFunc::Median => median(values),
            AggFunc::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            AggFunc::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            AggFunc::Count => n,
            AggFunc::Sum => values.iter().sum(),
        })
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Substitute for a group result that came out missing. Never applied implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// Missing stays missing.
    #[default]
    None,
    GlobalMean,
    GlobalMedian,
    GlobalMin,
    GlobalMax,
    Zero,
}

impl Fallback {
    /// Value substituted for a missing result, computed over the whole input column.
    fn resolve(&self, column: &[f64]) -> Option<f64> {
        match self {
            Fallback::None => None,
            Fallback::GlobalMean => AggFunc::Mean.apply(column),
            Fallback::GlobalMedian => AggFunc::Median.apply(column),
            Fallback::GlobalMin => AggFunc::Min.apply(column),
            Fallback::GlobalMax => AggFunc::Max.apply(column),
            Fallback::Zero => Some(0.0),
        }
    }
}

/// Groups rows by `group_keys` and reduces each value column with `func`.
///
/// Only numeric, non-missing values take part. Rows whose key has a missing part are left
/// out. Output rows come in key order.
pub fn group_reduce<T: Tabular, S: AsRef<str>>(
    records: &[T],
    group_keys: &[S],
    value_columns: &[S],
    func: AggFunc,
    fallback: Fallback,
) -> Vec<GroupRow> {
    let mut groups: BTreeMap<Vec<KeyPart>, Vec<Vec<f64>>> = BTreeMap::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); value_columns.len()];
    let mut unkeyed = 0usize;

    for record in records {
        let key: Vec<KeyPart> = group_keys.iter().map(|k| KeyPart::from(&record.value(k.as_ref()))).collect();
        if key.iter().any(|part| *part == KeyPart::Null) {
            unkeyed += 1;
            continue;
        }
        let slot = groups.entry(key).or_insert_with(|| vec![Vec::new(); value_columns.len()]);
        for (i, column) in value_columns.iter().enumerate() {
            if let Some(v) = record.value(column.as_ref()).as_f64() {
                slot[i].push(v);
                columns[i].push(v);
            }
        }
    }
    log_dropped(Stage::Aggregate, "a missing group key", unkeyed, records.len());

    let substitutes: Vec<Option<f64>> = columns.iter().map(|c| fallback.resolve(c)).collect();

    groups
        .into_iter()
        .map(|(key, values)| {
            let key = group_keys
                .iter()
                .zip(&key)
                .map(|(name, part)| (name.as_ref().to_string(), AttrValue::from(part)))
                .collect();
            let values: Attributes = value_columns
                .iter()
                .zip(values)
                .zip(&substitutes)
                .map(|((name, group), substitute)| {
                    let reduced = func.apply(&group).or(*substitute);
                    (name.as_ref().to_string(), reduced.map(AttrValue::Number).unwrap_or_default())
                })
                .collect();
            GroupRow { key, values }
        })
        .collect()
}

/// Counts category occurrences per group: one `{prefix}{category}` column per category
/// seen anywhere in the input, zero where a group has none.
pub fn count_by_category<T: Tabular, S: AsRef<str>>(
    records: &[T],
    group_keys: &[S],
    category_column: &str,
    prefix: &str,
) -> Vec<GroupRow> {
    let mut groups: BTreeMap<Vec<KeyPart>, BTreeMap<String, f64>> = BTreeMap::new();
    let mut categories: BTreeSet<String> = BTreeSet::new();
    let mut skipped = 0usize;

    for record in records {
        let key: Vec<KeyPart> = group_keys.iter().map(|k| KeyPart::from(&record.value(k.as_ref()))).collect();
        let category = record.value(category_column).label();
        match category {
            Some(category) if !key.contains(&KeyPart::Null) => {
                *groups.entry(key).or_default().entry(category.clone()).or_insert(0.0) += 1.0;
                categories.insert(category);
            }
            _ => skipped += 1,
        }
    }
    log_dropped(Stage::Aggregate, "a missing key or category", skipped, records.len());

    groups
        .into_iter()
        .map(|(key, counts)| {
            let key = group_keys
                .iter()
                .zip(&key)
                .map(|(name, part)| (name.as_ref().to_string(), AttrValue::from(part)))
                .collect();
            let values = categories
                .iter()
                .map(|c| {
                    let count = counts.get(c).copied().unwrap_or(0.0);
                    (format!("{}{}", prefix, c), AttrValue::Number(count))
                })
                .collect();
            GroupRow { key, values }
        })
        .collect()
}
