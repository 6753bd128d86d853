use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use super::dataset::DatasetConfig;
use super::pipeline::{FeaturePipeline, RunReport};
use crate::common::{PipelineError, Stage};
use crate::domains::ports::FeatureSink;

/// Outcome of a batch run over every configured dataset.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub completed: Vec<(RunReport, PathBuf)>,
    /// Names of datasets that failed, panicked or could not be written.
    pub failed: Vec<String>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs every dataset on a blocking worker and writes the results in configuration order.
/// A failing dataset never stops the others.
pub async fn run_datasets(
    pipeline: Arc<FeaturePipeline>,
    datasets: &[DatasetConfig],
    sink: &dyn FeatureSink,
) -> BatchSummary {
    let handles: Vec<_> = datasets
        .iter()
        .cloned()
        .map(|dataset| {
            let pipeline = pipeline.clone();
            let name = dataset.name.clone();
            (name, tokio::task::spawn_blocking(move || pipeline.run(&dataset)))
        })
        .collect();

    let mut summary = BatchSummary::default();
    for (name, handle) in handles {
        match handle.await {
            Ok(Ok((table, report))) => match sink.write_table(&report.dataset, &table) {
                Ok(written) => {
                    info!(
                        dataset = %report.dataset,
                        path = %written.display(),
                        loaded = report.loaded,
                        dropped = report.dropped_at_load,
                        unassigned = report.unassigned,
                        rows = report.rows,
                        columns = report.columns,
                        pruned = ?report.pruned,
                        skipped_years = ?report.skipped_years,
                        "dataset complete"
                    );
                    summary.completed.push((report, written));
                }
                Err(cause) => {
                    let err = PipelineError { dataset: name.clone(), stage: Stage::Write, records: table.rows.len(), cause };
                    error!("{}", err);
                    summary.failed.push(name);
                }
            },
            Ok(Err(err)) => {
                error!("{}", err);
                summary.failed.push(name);
            }
            Err(join) => {
                error!(dataset = %name, "dataset task did not complete: {}", join);
                summary.failed.push(name);
            }
        }
    }
    summary
}
