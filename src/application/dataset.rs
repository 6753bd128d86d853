use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::common::AttrValue;
use crate::domains::aggregate::{AggFunc, Fallback};
use crate::domains::geometry::{Crs, JoinKeys, JoinType};
use crate::domains::join::{JoinOptions, OverlayMode, PointMissPolicy};
use crate::domains::voronoi::DegenerateYearPolicy;

/// Everything that distinguishes one dataset pipeline from another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub sources: Vec<PathBuf>,
    #[serde(default)]
    pub attributes: Option<AttributeJoinConfig>,
    /// Attribute holding the observation year: a number, `YYYY`, `YYYY-MM-DD`, `YYYY/MM/DD`
    /// or `MM/DD/YYYY`, optionally followed by a time.
    #[serde(default)]
    pub year_column: Option<String>,
    /// Year stamped on every record of a dataset observed once.
    #[serde(default)]
    pub static_year: Option<i32>,
    #[serde(default)]
    pub arealize: ArealizeSpec,
    #[serde(default)]
    pub overlay: OverlayMode,
    #[serde(default)]
    pub point_miss: PointMissPolicy,
    pub features: FeatureSpec,
    /// Equal-area system for area shares and weights.
    #[serde(default)]
    pub area_crs: Option<Crs>,
    /// Value given to cells without an observation in a year.
    #[serde(default)]
    pub fill_default: AttrValue,
    #[serde(default)]
    pub propagate: Option<PropagateSpec>,
    #[serde(default)]
    pub drop_columns: Vec<String>,
    #[serde(default)]
    pub min_coverage: Option<f64>,
    /// Rescale category shares to sum to 1 again after low-coverage pruning.
    #[serde(default)]
    pub renormalize: bool,
}

impl DatasetConfig {
    pub fn new(name: impl Into<String>, sources: Vec<PathBuf>, features: FeatureSpec) -> Self {
        Self {
            name: name.into(),
            sources,
            attributes: None,
            year_column: None,
            static_year: None,
            arealize: ArealizeSpec::None,
            overlay: OverlayMode::default(),
            point_miss: PointMissPolicy::default(),
            features,
            area_crs: None,
            fill_default: AttrValue::Null,
            propagate: None,
            drop_columns: Vec::new(),
            min_coverage: None,
            renormalize: false,
        }
    }

    pub fn join_options(&self) -> JoinOptions {
        JoinOptions { overlay: self.overlay, miss: self.point_miss }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeJoinConfig {
    pub path: PathBuf,
    /// Attribute on the geometry side.
    pub left: String,
    /// Column on the table side.
    pub right: String,
    #[serde(default)]
    pub how: JoinType,
}

impl AttributeJoinConfig {
    pub fn keys(&self) -> JoinKeys {
        JoinKeys { left: self.left.clone(), right: self.right.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArealizeSpec {
    /// Points are joined to the cell containing them.
    #[default]
    None,
    /// Points are spread over their Voronoi region before the join.
    Voronoi {
        #[serde(default)]
        on_degenerate: DegenerateYearPolicy,
    },
}

/// How joined records become per-(cell, year) features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureSpec {
    Numeric {
        columns: Vec<String>,
        func: AggFunc,
        #[serde(default)]
        fallback: Fallback,
    },
    AreaWeightedMean {
        columns: Vec<String>,
    },
    /// Area share of each category.
    Categorical {
        column: String,
        #[serde(default)]
        prefix: String,
    },
    CategoryCount {
        column: String,
        #[serde(default)]
        prefix: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagateSpec {
    pub source_year: i32,
    pub target_years: Vec<i32>,
}
