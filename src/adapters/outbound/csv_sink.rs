use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::common::FeatureResult;
use crate::domains::output::FeatureTable;
use crate::domains::ports::FeatureSink;

/// Writes each feature table to `<dir>/<name>.csv`. Missing values are written as empty
/// fields.
pub struct CsvFeatureSink {
    dir: PathBuf,
}

impl CsvFeatureSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FeatureSink for CsvFeatureSink {
    fn write_table(&self, name: &str, table: &FeatureTable) -> FeatureResult<PathBuf> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        let path = self.dir.join(format!("{}.csv", name));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(table.header())?;
        for row in &table.rows {
            let mut fields = vec![row.cell.clone(), row.year.to_string()];
            fields.extend(
                table
                    .columns
                    .iter()
                    .map(|c| row.features.get(c).map(|v| v.to_string()).unwrap_or_default()),
            );
            writer.write_record(&fields)?;
        }
        writer.flush()?;
        info!(dataset = name, rows = table.rows.len(), path = %path.display(), "feature table written");
        Ok(path)
    }
}
