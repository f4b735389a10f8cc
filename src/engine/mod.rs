pub mod merge;
pub mod summary;

pub use merge::{carry_forward, merge_candidates, MergeStats};
pub use summary::{ConfidenceStats, RunSummary, HIGH_CONFIDENCE};

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::Thresholds;
use crate::errors::{ConfigError, DataError, PipelineError};
use crate::intelligence::{default_evaluators, Evaluator, RuleDescription};
use crate::metrics;
use crate::models::{
    canonical_address, AddressLabel, AddressStatistics, ExistingLabels, LabelCandidate, LabelKind,
};

/// Labels and report produced by one run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Sorted by (address, label).
    pub labels: Vec<AddressLabel>,
    pub summary: RunSummary,
}

impl RunOutput {
    pub fn labels_of_kind(&self, kind: &LabelKind) -> Vec<&AddressLabel> {
        self.labels.iter().filter(|l| &l.kind == kind).collect()
    }

    /// Case-insensitive address lookup.
    pub fn labels_for_address(&self, address: &str) -> Vec<&AddressLabel> {
        let wanted = address.trim().to_ascii_lowercase();
        self.labels.iter().filter(|l| l.address == wanted).collect()
    }
}

/// Records that passed address validation, plus what was rejected on the way.
struct PreparedSnapshot {
    records: Vec<AddressStatistics>,
    rejected: Vec<DataError>,
    received: usize,
}

/// Everything the evaluators said about one address.
struct RecordOutcome {
    candidates: Vec<LabelCandidate>,
    errors: Vec<DataError>,
}

/// Applies every registered evaluator to every address and merges the result
/// with earlier runs.
///
/// Holds no mutable state: evaluators and thresholds are shared read-only, so
/// `run` and `run_parallel` produce identical output for identical input.
#[derive(Clone)]
pub struct LabelingEngine {
    thresholds: Arc<Thresholds>,
    evaluators: Arc<[Box<dyn Evaluator>]>,
}

impl LabelingEngine {
    /// Validates the thresholds up front; a bad configuration never reaches evaluation.
    pub fn new(
        thresholds: Thresholds,
        evaluators: Vec<Box<dyn Evaluator>>,
    ) -> Result<Self, ConfigError> {
        thresholds.validate()?;
        if evaluators.is_empty() {
            return Err(ConfigError::NoEvaluators);
        }
        Ok(Self {
            thresholds: Arc::new(thresholds),
            evaluators: Arc::from(evaluators),
        })
    }

    pub fn with_default_evaluators(thresholds: Thresholds) -> Result<Self, ConfigError> {
        Self::new(thresholds, default_evaluators())
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn describe_rules(&self) -> Vec<RuleDescription> {
        self.evaluators
            .iter()
            .map(|e| e.describe(&self.thresholds))
            .collect()
    }

    /// Evaluate sequentially on the calling thread.
    pub fn run<I>(&self, statistics: I, existing: &ExistingLabels, run_time: DateTime<Utc>) -> RunOutput
    where
        I: IntoIterator<Item = AddressStatistics>,
    {
        let prepared = prepare(statistics);
        let outcomes = prepared
            .records
            .iter()
            .map(|stats| evaluate_record(&self.evaluators, &self.thresholds, stats, run_time))
            .collect();
        self.finish(prepared.received, prepared.rejected, outcomes, existing, run_time)
    }

    /// Evaluate on up to `workers` blocking tasks. Chunks are collected in input
    /// order, so the output equals `run` on the same input.
    pub async fn run_parallel(
        &self,
        statistics: Vec<AddressStatistics>,
        existing: &ExistingLabels,
        run_time: DateTime<Utc>,
        workers: usize,
    ) -> Result<RunOutput, PipelineError> {
        let prepared = prepare(statistics);
        let received = prepared.received;
        let rejected = prepared.rejected;

        let chunk_size = prepared.records.len().div_ceil(workers.max(1)).max(1);
        let mut records = prepared.records.into_iter();
        let mut handles = Vec::new();
        loop {
            let chunk: Vec<AddressStatistics> = records.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            let evaluators = Arc::clone(&self.evaluators);
            let thresholds = Arc::clone(&self.thresholds);
            handles.push(tokio::task::spawn_blocking(move || {
                chunk
                    .iter()
                    .map(|stats| evaluate_record(&evaluators, &thresholds, stats, run_time))
                    .collect::<Vec<_>>()
            }));
        }

        tracing::debug!(chunks = handles.len(), chunk_size, "Evaluation chunks dispatched");

        let mut outcomes = Vec::new();
        for handle in handles {
            let chunk = handle
                .await
                .map_err(|e| PipelineError::Worker(e.to_string()))?;
            outcomes.extend(chunk);
        }

        Ok(self.finish(received, rejected, outcomes, existing, run_time))
    }

    fn finish(
        &self,
        received: usize,
        rejected: Vec<DataError>,
        outcomes: Vec<RecordOutcome>,
        existing: &ExistingLabels,
        run_time: DateTime<Utc>,
    ) -> RunOutput {
        let mut addresses_skipped = rejected.len();
        let mut data_errors = rejected.len();
        let mut candidates = Vec::new();

        for outcome in outcomes {
            if !outcome.errors.is_empty() {
                addresses_skipped += 1;
                data_errors += outcome.errors.len();
            }
            candidates.extend(outcome.candidates);
        }

        let (labels, merge_stats) = merge_candidates(candidates, existing, run_time);
        let summary = RunSummary::build(
            run_time,
            received,
            addresses_skipped,
            data_errors,
            merge_stats,
            &labels,
        );
        metrics::record_run(&summary, &labels);

        RunOutput { labels, summary }
    }
}

/// Canonicalise addresses and drop records that cannot be keyed. The first
/// record for an address wins; later duplicates are data errors.
fn prepare<I>(statistics: I) -> PreparedSnapshot
where
    I: IntoIterator<Item = AddressStatistics>,
{
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    let mut rejected = Vec::new();
    let mut received = 0usize;

    for mut stats in statistics {
        received += 1;

        let Some(address) = canonical_address(&stats.address) else {
            let err = DataError::InvalidAddress(stats.address.clone());
            tracing::warn!(error = %err, "Rejecting statistics record");
            rejected.push(err);
            continue;
        };

        if !seen.insert(address.clone()) {
            let err = DataError::DuplicateAddress(address);
            tracing::warn!(error = %err, "Rejecting statistics record");
            rejected.push(err);
            continue;
        }

        stats.address = address;
        records.push(stats);
    }

    PreparedSnapshot {
        records,
        rejected,
        received,
    }
}

/// Apply every evaluator to one record. A failing evaluator only affects itself.
fn evaluate_record(
    evaluators: &[Box<dyn Evaluator>],
    thresholds: &Thresholds,
    stats: &AddressStatistics,
    as_of: DateTime<Utc>,
) -> RecordOutcome {
    let mut candidates = Vec::new();
    let mut errors = Vec::new();

    for evaluator in evaluators {
        match evaluator.evaluate(stats, thresholds, as_of) {
            Ok(Some(candidate)) => candidates.push(candidate),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(
                    address = %stats.address,
                    rule = %evaluator.kind(),
                    error = %err,
                    "Skipping rule for address"
                );
                errors.push(err);
            }
        }
    }

    RecordOutcome { candidates, errors }
}
