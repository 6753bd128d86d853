use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Format error in {origin}: {reason}")]
    Format { origin: String, reason: String },

    #[error("Schema mismatch: {reason}")]
    SchemaMismatch { reason: String },

    #[error("Projection error: {reason}")]
    Projection { reason: String },

    #[error("Degenerate geometry: {reason}")]
    GeometryDegenerate { reason: String },

    #[error("{unmatched} record(s) did not match any grid cell")]
    JoinCoverage { unmatched: usize },

    #[error("Duplicate record for cell {cell} in year {year}")]
    DuplicateRecord { cell: String, year: i32 },

    #[error("Missing column `{column}`")]
    MissingColumn { column: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl FeatureError {
    pub fn format(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Format { origin: origin.into(), reason: reason.into() }
    }

    pub fn schema(reason: impl Into<String>) -> Self {
        Self::SchemaMismatch { reason: reason.into() }
    }

    pub fn projection(reason: impl Into<String>) -> Self {
        Self::Projection { reason: reason.into() }
    }

    pub fn degenerate(reason: impl Into<String>) -> Self {
        Self::GeometryDegenerate { reason: reason.into() }
    }
}

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Attach,
    Preprocess,
    Clip,
    Tessellate,
    Assign,
    Aggregate,
    Fill,
    Propagate,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Attach => "attach",
            Stage::Preprocess => "preprocess",
            Stage::Clip => "clip",
            Stage::Tessellate => "tessellate",
            Stage::Assign => "assign",
            Stage::Aggregate => "aggregate",
            Stage::Fill => "fill",
            Stage::Propagate => "propagate",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
#[error("dataset `{dataset}` failed during {stage} ({records} records affected): {cause}")]
pub struct PipelineError {
    pub dataset: String,
    pub stage: Stage,
    pub records: usize,
    #[source]
    pub cause: FeatureError,
}

pub type FeatureResult<T> = Result<T, FeatureError>;

/// Logs a dropped-row count with its share of the input, the way every stage reports
/// unusable rows.
pub fn log_dropped(stage: Stage, what: &str, dropped: usize, total: usize) {
    if dropped == 0 {
        return;
    }
    let pct = if total == 0 { 0.0 } else { dropped as f64 * 100.0 / total as f64 };
    tracing::warn!(%stage, dropped, total, "dropped {} of {} rows ({:.1}%) with {}", dropped, total, pct, what);
}
