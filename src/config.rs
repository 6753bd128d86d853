use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::application::DatasetConfig;
use crate::common::CELL_COLUMN;
use crate::domains::geometry::Crs;
use crate::domains::grid::Squaring;

/// Prefix of environment overrides, e.g. `TRGRID__OUTPUT__DIR=/tmp/out`.
pub const ENV_PREFIX: &str = "TRGRID";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub grid: GridConfig,
    #[serde(default)]
    pub study: StudyConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Polygon survey the cells are dissolved from.
    pub source: PathBuf,
    #[serde(default = "default_group_key")]
    pub group_key: String,
    #[serde(default)]
    pub squaring: Squaring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    #[serde(default)]
    pub years: Vec<i32>,
    #[serde(default = "Crs::wgs84")]
    pub reference_crs: Crs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_group_key() -> String {
    CELL_COLUMN.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self { years: Vec::new(), reference_crs: Crs::wgs84() }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: default_output_dir() }
    }
}

impl Config {
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// File settings overlaid with `TRGRID__*` environment variables.
    pub fn load_layered<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Config = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()).format(::config::FileFormat::Toml))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).prefix_separator("__").separator("__"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for dataset in &self.datasets {
            if !seen.insert(dataset.name.as_str()) {
                anyhow::bail!("dataset `{}` is declared twice", dataset.name);
            }
            if dataset.sources.is_empty() {
                anyhow::bail!("dataset `{}` has no sources", dataset.name);
            }
            if dataset.year_column.is_none() && dataset.static_year.is_none() {
                anyhow::bail!("dataset `{}` needs either `year_column` or `static_year`", dataset.name);
            }
        }
        Ok(())
    }
}
