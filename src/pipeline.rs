use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use tracing::Instrument;
use uuid::Uuid;

use crate::engine::{LabelingEngine, RunOutput};
use crate::errors::PipelineError;
use crate::sinks::LabelSink;
use crate::sources::{SnapshotWindow, StatisticsSource};

/// One labeling run:
/// 1. Fetch the statistics snapshot for `window`
/// 2. Load labels from earlier runs
/// 3. Evaluate and merge on `workers` tasks
/// 4. Persist the result
/// 5. Report
///
/// Source and sink failures abort the run and come back as distinct
/// `PipelineError` variants; per-address data problems only show up in the summary.
pub async fn run_once<S, K>(
    source: &S,
    sink: &K,
    engine: &LabelingEngine,
    window: SnapshotWindow,
    run_time: DateTime<Utc>,
    workers: usize,
) -> Result<RunOutput, PipelineError>
where
    S: StatisticsSource + Sync,
    K: LabelSink + Sync,
{
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("labeling_run", %run_id);

    async move {
        let start = Instant::now();
        tracing::info!(
            start = %window.start,
            end = %window.end,
            workers,
            "Labeling run started"
        );

        let snapshot = source.fetch(&window).await?;
        counter!("malformed_source_records_total").increment(snapshot.malformed as u64);

        sink.prepare().await?;
        let existing = sink.load_existing().await?;
        tracing::info!(
            records = snapshot.records.len(),
            existing = existing.len(),
            "Inputs loaded"
        );

        let mut output = engine
            .run_parallel(snapshot.records, &existing, run_time, workers)
            .await?;
        output.summary.malformed_source_records = snapshot.malformed;

        let written = sink.persist(&output.labels).await?;

        let elapsed = start.elapsed().as_secs_f64();
        histogram!("run_duration_seconds").record(elapsed);

        output.summary.log();
        tracing::info!(written, elapsed_secs = elapsed, "Labeling run finished");

        Ok(output)
    }
    .instrument(span)
    .await
}
