use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use township_grid::adapters::inbound::{CsvTableSource, GeoJsonSource};
use township_grid::adapters::outbound::{CsvFeatureSink, GeoJsonGridWriter};
use township_grid::application::run_datasets;
use township_grid::domains::geometry::GeometryStore;
use township_grid::{Config, FeaturePipeline, RegionGrid};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = Config::from_file(&path).await?;
    info!(config = %path.display(), datasets = config.datasets.len(), "configuration loaded");

    let store = GeometryStore::new(Arc::new(GeoJsonSource::new())).with_reference(config.study.reference_crs);
    let survey = store
        .load("grid", std::slice::from_ref(&config.grid.source))
        .context("loading grid survey")?;
    let grid = RegionGrid::build_from_survey(&survey.layer, &config.grid.group_key, config.grid.squaring)
        .context("building region grid")?;
    let grid = Arc::new(grid);
    info!(cells = grid.cells().len(), crs = %grid.crs(), "region grid ready");

    GeoJsonGridWriter::write(&grid.to_layer("grid"), &config.output.dir.join("grid.geojson"))
        .context("writing grid.geojson")?;

    let pipeline = Arc::new(
        FeaturePipeline::new(grid.clone(), store)
            .with_tables(Arc::new(CsvTableSource::new()))
            .with_years(config.study.years.clone()),
    );

    let sink = CsvFeatureSink::new(&config.output.dir);
    let summary = run_datasets(pipeline, &config.datasets, &sink).await;
    if !summary.is_success() {
        anyhow::bail!("{} of {} datasets failed: {}", summary.failed.len(), config.datasets.len(), summary.failed.join(", "));
    }
    info!("all datasets complete");
    Ok(())
}
