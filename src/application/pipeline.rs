use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, info_span};

use super::dataset::{ArealizeSpec, DatasetConfig, FeatureSpec};
use crate::common::{
    into_features, log_dropped, FeatureError, FeatureRecord, FeatureResult, PipelineError, Stage, CELL_COLUMN,
    YEAR_COLUMN,
};
use crate::domains::aggregate::{area_weighted_mean, area_weighted_pivot, count_by_category, group_reduce, AreaOptions};
use crate::domains::geometry::{assign_static_year, assign_years, attach_attributes, GeometryStore, Layer};
use crate::domains::grid::RegionGrid;
use crate::domains::join::{assign_to_cells, clip_to_grid};
use crate::domains::output::{to_table, FeatureTable};
use crate::domains::ports::AttributeTableSource;
use crate::domains::temporal::{fill_years, propagate_year};
use crate::domains::voronoi::tessellate_by_year;

/// Dataset-specific fix-up applied to the loaded layer before years are read.
pub type Preprocess = Arc<dyn Fn(Layer) -> FeatureResult<Layer> + Send + Sync>;

/// Summary of one dataset run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunReport {
    pub dataset: String,
    /// Features read from the sources.
    pub loaded: usize,
    /// Features dropped at load for unusable geometry.
    pub dropped_at_load: usize,
    /// Overlay remainders kept without a cell code.
    pub unassigned: usize,
    /// Years left out of tessellation for having too few sites.
    pub skipped_years: Vec<i32>,
    pub rows: usize,
    pub columns: usize,
    pub pruned: Vec<String>,
}

/// Runs one dataset from its sources to a feature table on a shared grid.
pub struct FeaturePipeline {
    grid: Arc<RegionGrid>,
    store: GeometryStore,
    tables: Option<Arc<dyn AttributeTableSource>>,
    years: Vec<i32>,
    preprocess: Vec<Preprocess>,
}

impl FeaturePipeline {
    pub fn new(grid: Arc<RegionGrid>, store: GeometryStore) -> Self {
        Self { grid, store, tables: None, years: Vec::new(), preprocess: Vec::new() }
    }

    pub fn with_tables(mut self, tables: Arc<dyn AttributeTableSource>) -> Self {
        self.tables = Some(tables);
        self
    }

    /// Study years every output must cover. Without them the observed years are used.
    pub fn with_years(mut self, years: Vec<i32>) -> Self {
        self.years = years;
        self
    }

    pub fn with_preprocess<F>(mut self, step: F) -> Self
    where
        F: Fn(Layer) -> FeatureResult<Layer> + Send + Sync + 'static,
    {
        self.preprocess.push(Arc::new(step));
        self
    }

    pub fn run(&self, dataset: &DatasetConfig) -> Result<(FeatureTable, RunReport), PipelineError> {
        let name = dataset.name.as_str();
        let at = |stage: Stage, records: usize| {
            move |cause: FeatureError| PipelineError { dataset: name.to_string(), stage, records, cause }
        };
        // Stage logs, dropped-row counts included, are attributed through this span.
        let span = info_span!("dataset", dataset = name);
        let _entered = span.enter();
        info!(sources = dataset.sources.len(), "pipeline started");

        let loaded = self.store.load(name, dataset.sources.as_slice()).map_err(at(Stage::Load, 0))?;
        let mut report = RunReport {
            dataset: name.to_string(),
            loaded: loaded.read,
            dropped_at_load: loaded.dropped,
            ..RunReport::default()
        };
        let mut layer = loaded.layer;

        if let Some(join) = &dataset.attributes {
            let records = layer.len();
            let tables = self
                .tables
                .as_ref()
                .ok_or_else(|| FeatureError::format(join.path.display().to_string(), "no attribute table reader configured"))
                .map_err(at(Stage::Attach, records))?;
            let table = tables.read_table(&join.path).map_err(at(Stage::Attach, records))?;
            layer = attach_attributes(layer, &table, &join.keys(), join.how).map_err(at(Stage::Attach, records))?;
        }

        for step in &self.preprocess {
            let records = layer.len();
            layer = step(layer).map_err(at(Stage::Preprocess, records))?;
        }

        layer = match (&dataset.year_column, dataset.static_year) {
            (Some(column), _) => assign_years(layer, column),
            (None, Some(year)) => assign_static_year(layer, year),
            (None, None) => {
                let cause = FeatureError::schema("dataset declares neither a year column nor a static year");
                return Err(at(Stage::Load, layer.len())(cause));
            }
        };
        let layer = self.keep_study_years(layer, dataset.propagate.as_ref().map(|p| p.source_year));

        let records = layer.len();
        let layer = layer
            .reproject(&self.grid.crs())
            .and_then(|layer| clip_to_grid(layer, &self.grid, dataset.point_miss))
            .map_err(at(Stage::Clip, records))?;

        let layer = match dataset.arealize {
            ArealizeSpec::None => layer,
            ArealizeSpec::Voronoi { on_degenerate } => {
                let records = layer.len();
                let outcome = tessellate_by_year(layer, &self.grid, on_degenerate).map_err(at(Stage::Tessellate, records))?;
                report.skipped_years = outcome.skipped_years.into_iter().flatten().collect();
                outcome.layer
            }
        };

        let records = layer.len();
        let joined = assign_to_cells(layer, &self.grid, &dataset.join_options()).map_err(at(Stage::Assign, records))?;
        report.unassigned = joined.unassigned;

        let records = joined.layer.len();
        let features = aggregate(&joined.layer, dataset).map_err(at(Stage::Aggregate, records))?;

        let features = match &dataset.propagate {
            Some(spec) => propagate_year(&features, spec.source_year, &spec.target_years)
                .map_err(at(Stage::Propagate, features.len()))?,
            None => features,
        };

        let years = self.output_years(&features);
        let features: Vec<FeatureRecord> = features.into_iter().filter(|r| years.contains(&r.year)).collect();
        let records = features.len();
        let features =
            fill_years(features, &self.grid.codes(), &years, &dataset.fill_default).map_err(at(Stage::Fill, records))?;

        let assembled = to_table(features, dataset.drop_columns.as_slice(), dataset.min_coverage);
        let mut table = assembled.table;
        if dataset.renormalize && !assembled.pruned.is_empty() {
            if let FeatureSpec::Categorical { prefix, .. } = &dataset.features {
                let shares: Vec<String> =
                    table.columns.iter().filter(|c| c.starts_with(prefix.as_str())).cloned().collect();
                table = table.renormalized(&shares);
            }
        }

        report.rows = table.rows.len();
        report.columns = table.columns.len();
        report.pruned = assembled.pruned;
        info!(
            loaded = report.loaded,
            dropped = report.dropped_at_load,
            unassigned = report.unassigned,
            rows = report.rows,
            columns = report.columns,
            "pipeline finished"
        );
        Ok((table, report))
    }

    /// Drops records outside the study years. `extra` keeps a baseline year that is only
    /// used as a propagation source.
    fn keep_study_years(&self, layer: Layer, extra: Option<i32>) -> Layer {
        if self.years.is_empty() {
            return layer;
        }
        let total = layer.len();
        let records: Vec<_> = layer
            .records
            .iter()
            .filter(|r| r.year.is_some_and(|y| self.years.contains(&y) || Some(y) == extra))
            .cloned()
            .collect();
        log_dropped(Stage::Load, "a year outside the study period", total - records.len(), total);
        layer.with_records(records)
    }

    fn output_years(&self, features: &[FeatureRecord]) -> Vec<i32> {
        if !self.years.is_empty() {
            return self.years.clone();
        }
        let observed: BTreeSet<i32> = features.iter().map(|r| r.year).collect();
        debug!(years = ?observed, "no study years configured, using observed years");
        observed.into_iter().collect()
    }
}

fn aggregate(layer: &Layer, dataset: &DatasetConfig) -> FeatureResult<Vec<FeatureRecord>> {
    let keys = [CELL_COLUMN.to_string(), YEAR_COLUMN.to_string()];
    let area = |prefix: &str| AreaOptions { prefix: prefix.to_string(), area_crs: dataset.area_crs };
    match &dataset.features {
        FeatureSpec::Numeric { columns, func, fallback } => {
            into_features(group_reduce(&layer.records, &keys, columns.as_slice(), *func, *fallback))
        }
        FeatureSpec::AreaWeightedMean { columns } => area_weighted_mean(layer, columns.as_slice(), &area("")),
        FeatureSpec::Categorical { column, prefix } => area_weighted_pivot(layer, column, &area(prefix.as_str())),
        FeatureSpec::CategoryCount { column, prefix } => {
            into_features(count_by_category(&layer.records, &keys, column, prefix.as_str()))
        }
    }
}
