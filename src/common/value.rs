use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Output column holding the grid cell code.
pub const CELL_COLUMN: &str = "TOWNSHIP_RANGE";
/// Output column holding the year.
pub const YEAR_COLUMN: &str = "YEAR";

/// A single attribute value. `Null` is a missing value and is never read as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum AttrValue {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

pub type Attributes = BTreeMap<String, AttrValue>;

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Number(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }

    /// Text label used for join keys and category column names.
    /// Integral numbers print without a fractional part, so `10.0` and `"10"` match.
    pub fn label(&self) -> Option<String> {
        match self {
            AttrValue::Null => None,
            AttrValue::Number(v) => Some(format_number(*v)),
            AttrValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }

    /// Parses a raw delimited-text cell: empty is Null, numeric text is a Number.
    pub fn parse_cell(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return AttrValue::Null;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => AttrValue::Number(v),
            _ => AttrValue::Text(trimmed.to_string()),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => AttrValue::Null,
            serde_json::Value::Bool(b) => AttrValue::Number(if *b { 1.0 } else { 0.0 }),
            serde_json::Value::Number(n) => n.as_f64().map(AttrValue::Number).unwrap_or_default(),
            serde_json::Value::String(s) => AttrValue::Text(s.clone()),
            other => AttrValue::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttrValue::Null => serde_json::Value::Null,
            AttrValue::Number(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            AttrValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            AttrValue::Null => None,
            AttrValue::Number(_) => Some(ColumnKind::Numeric),
            AttrValue::Text(_) => Some(ColumnKind::Text),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => Ok(()),
            AttrValue::Number(v) => f.write_str(&format_number(*v)),
            AttrValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Number(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// Totally ordered form of an [`AttrValue`], used as a grouping key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyPart {
    Null,
    Number(OrderedFloat<f64>),
    Text(String),
}

impl From<&AttrValue> for KeyPart {
    fn from(value: &AttrValue) -> Self {
        match value {
            AttrValue::Null => KeyPart::Null,
            AttrValue::Number(v) => KeyPart::Number(OrderedFloat(*v)),
            AttrValue::Text(s) => KeyPart::Text(s.clone()),
        }
    }
}

impl From<&KeyPart> for AttrValue {
    fn from(key: &KeyPart) -> Self {
        match key {
            KeyPart::Null => AttrValue::Null,
            KeyPart::Number(v) => AttrValue::Number(v.into_inner()),
            KeyPart::Text(s) => AttrValue::Text(s.clone()),
        }
    }
}

/// Column lookup shared by everything that can be grouped or pivoted.
/// `TOWNSHIP_RANGE` and `YEAR` resolve to the cell and year of the row.
pub trait Tabular {
    fn value(&self, column: &str) -> AttrValue;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_normalize_integral_numbers() {
        assert_eq!(AttrValue::Number(10.0).label().as_deref(), Some("10"));
        assert_eq!(AttrValue::Number(2.5).label().as_deref(), Some("2.5"));
        assert_eq!(AttrValue::from(" 07N 02E ").label().as_deref(), Some("07N 02E"));
        assert_eq!(AttrValue::from("  ").label(), None);
    }

    #[test]
    fn parse_cell_keeps_missing_distinct_from_zero() {
        assert_eq!(AttrValue::parse_cell(""), AttrValue::Null);
        assert_eq!(AttrValue::parse_cell("0"), AttrValue::Number(0.0));
        assert_eq!(AttrValue::parse_cell("NaN"), AttrValue::Text("NaN".into()));
        assert_eq!(AttrValue::parse_cell("loam"), AttrValue::Text("loam".into()));
    }
}
