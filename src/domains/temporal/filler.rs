use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use crate::common::{log_dropped, AttrValue, FeatureError, FeatureRecord, FeatureResult, Stage};

/// Makes `year` hold exactly one record per cell in `all_cells`.
///
/// Missing cells are inserted with `default` in every feature column seen in `records`.
/// Records of that year for undeclared cells are dropped; other years pass through.
pub fn fill_missing_cells(
    records: Vec<FeatureRecord>,
    all_cells: &[String],
    year: i32,
    default: &AttrValue,
) -> FeatureResult<Vec<FeatureRecord>> {
    let declared: HashSet<&str> = all_cells.iter().map(String::as_str).collect();
    let columns: BTreeSet<String> = records.iter().flat_map(|r| r.features.keys().cloned()).collect();

    let mut present: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(records.len() + all_cells.len());
    let mut foreign = 0usize;
    let mut in_year = 0usize;
    for record in records {
        if record.year != year {
            out.push(record);
            continue;
        }
        in_year += 1;
        if !declared.contains(record.cell.as_str()) {
            foreign += 1;
            continue;
        }
        if !present.insert(record.cell.clone()) {
            return Err(FeatureError::DuplicateRecord { cell: record.cell, year });
        }
        out.push(record);
    }
    log_dropped(Stage::Fill, "an undeclared cell code", foreign, in_year);

    let mut inserted = 0usize;
    for cell in all_cells {
        if present.insert(cell.clone()) {
            let mut filler = FeatureRecord::new(cell.clone(), year);
            for column in &columns {
                filler.features.insert(column.clone(), default.clone());
            }
            out.push(filler);
            inserted += 1;
        }
    }
    debug!(year, inserted, "filled missing cells");
    Ok(out)
}

/// [`fill_missing_cells`] for every study year.
pub fn fill_years(
    records: Vec<FeatureRecord>,
    all_cells: &[String],
    years: &[i32],
    default: &AttrValue,
) -> FeatureResult<Vec<FeatureRecord>> {
    years
        .iter()
        .try_fold(records, |acc, &year| fill_missing_cells(acc, all_cells, year, default))
}

/// Returns `records` plus a copy of every `source_year` record for each target year,
/// differing only in the year. Existing records of a target year are replaced; the
/// input is left untouched.
pub fn propagate_year(records: &[FeatureRecord], source_year: i32, target_years: &[i32]) -> FeatureResult<Vec<FeatureRecord>> {
    let source: Vec<&FeatureRecord> = records.iter().filter(|r| r.year == source_year).collect();
    if source.is_empty() {
        return Err(FeatureError::schema(format!("no records for source year {}", source_year)));
    }
    let targets: BTreeSet<i32> = target_years.iter().copied().filter(|&y| y != source_year).collect();

    let mut out: Vec<FeatureRecord> = records.iter().filter(|r| !targets.contains(&r.year)).cloned().collect();
    for &year in &targets {
        out.extend(source.iter().map(|r| FeatureRecord { year, ..(*r).clone() }));
    }
    debug!(source_year, targets = targets.len(), copies = source.len() * targets.len(), "propagated year");
    Ok(out)
}
