use std::fs;
use std::path::Path;

use crate::common::{AttrValue, Attributes, FeatureError, FeatureResult};
use crate::domains::geometry::AttributeTable;
use crate::domains::ports::AttributeTableSource;

/// Reads delimited attribute tables. The delimiter is `;` when the header line holds more
/// semicolons than commas, `,` otherwise.
#[derive(Debug, Clone, Default)]
pub struct CsvTableSource;

impl CsvTableSource {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_str(&self, origin: &str, text: &str) -> FeatureResult<AttributeTable> {
        let header_line = text.lines().next().unwrap_or_default();
        let delimiter = if header_line.matches(';').count() > header_line.matches(',').count() {
            b';'
        } else {
            b','
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() || columns.iter().all(String::is_empty) {
            return Err(FeatureError::format(origin, "missing header row"));
        }

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| FeatureError::format(origin, format!("row {}: {}", line + 1, e)))?;
            let row: Attributes = columns
                .iter()
                .zip(record.iter())
                .map(|(column, raw)| (column.clone(), AttrValue::parse_cell(raw)))
                .collect();
            rows.push(row);
        }
        Ok(AttributeTable { columns, rows })
    }
}

impl AttributeTableSource for CsvTableSource {
    fn read_table(&self, path: &Path) -> FeatureResult<AttributeTable> {
        let text = fs::read_to_string(path)?;
        self.parse_str(&path.display().to_string(), &text)
    }
}
