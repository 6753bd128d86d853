mod common;

use common::*;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

use township_grid::adapters::inbound::MemorySource;
use township_grid::adapters::outbound::CsvFeatureSink;
use township_grid::application::{run_datasets, DatasetConfig, FeaturePipeline, FeatureSpec};
use township_grid::common::AttrValue;
use township_grid::domains::geometry::GeometryStore;

fn counted(name: &str, source: &str) -> DatasetConfig {
    let mut dataset = DatasetConfig::new(
        name,
        vec![source.into()],
        FeatureSpec::CategoryCount { column: "KIND".into(), prefix: "N_".into() },
    );
    dataset.static_year = Some(2016);
    dataset
}

#[tokio::test]
async fn a_panicking_dataset_does_not_stop_the_others() {
    let dir = tempdir().unwrap();
    let source = MemorySource::new()
        .with_layer("wells", layer("wells", vec![point(0.5, 0.5, 2016, &[("KIND", AttrValue::from("domestic"))])]));
    let pipeline = FeaturePipeline::new(Arc::new(four_cell_grid()), GeometryStore::new(Arc::new(source)))
        .with_preprocess(|layer| {
            if layer.name == "broken" {
                panic!("preprocess blew up");
            }
            Ok(layer)
        });
    let datasets = vec![counted("broken", "wells"), counted("wells", "wells"), counted("ghost", "nowhere")];

    let sink = CsvFeatureSink::new(dir.path());
    let summary = run_datasets(Arc::new(pipeline), &datasets, &sink).await;

    assert!(!summary.is_success());
    assert_eq!(summary.failed, vec!["broken", "ghost"]);
    assert_eq!(summary.completed.len(), 1);
    let (report, written) = &summary.completed[0];
    assert_eq!(report.dataset, "wells");
    assert!(fs::read_to_string(written).unwrap().starts_with("TOWNSHIP_RANGE,YEAR,N_domestic"));
}

#[tokio::test]
async fn write_failures_count_as_failed_datasets() {
    let dir = tempdir().unwrap();
    let blocked = dir.path().join("blocked");
    fs::write(&blocked, "not a directory").unwrap();
    let source = MemorySource::new()
        .with_layer("wells", layer("wells", vec![point(0.5, 0.5, 2016, &[("KIND", AttrValue::from("domestic"))])]));
    let pipeline = FeaturePipeline::new(Arc::new(four_cell_grid()), GeometryStore::new(Arc::new(source)));

    let sink = CsvFeatureSink::new(&blocked);
    let summary = run_datasets(Arc::new(pipeline), &[counted("wells", "wells")], &sink).await;

    assert_eq!(summary.failed, vec!["wells"]);
    assert!(summary.completed.is_empty());
}
