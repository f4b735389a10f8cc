use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::merge::MergeStats;
use crate::intelligence::scoring::round_to;
use crate::models::{AddressLabel, LabelKind};

/// Labels at or above this confidence count as high-confidence in reports.
pub const HIGH_CONFIDENCE: f64 = 0.8;

const TOP_MULTI_LABEL: usize = 5;

/// Distribution of confidence values across a label set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceStats {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub high_confidence: usize,
}

impl ConfidenceStats {
    /// `None` for an empty label set.
    pub fn from_labels(labels: &[AddressLabel]) -> Option<Self> {
        if labels.is_empty() {
            return None;
        }

        let mut values: Vec<f64> = labels.iter().map(|l| l.confidence).collect();
        values.sort_by(f64::total_cmp);

        let n = values.len();
        let mean = values.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 0 {
            (values[n / 2 - 1] + values[n / 2]) / 2.0
        } else {
            values[n / 2]
        };

        Some(Self {
            mean,
            median,
            min: values[0],
            max: values[n - 1],
            high_confidence: values.iter().filter(|c| **c >= HIGH_CONFIDENCE).count(),
        })
    }
}

/// Run-level report: partial success is visible, never silent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_time: DateTime<Utc>,
    /// Records received from the source, valid or not.
    pub addresses_processed: usize,
    /// Addresses for which at least one rule was skipped (or the whole record was rejected).
    pub addresses_skipped: usize,
    /// Individual rule/record failures behind `addresses_skipped`.
    pub data_errors: usize,
    /// Records the source could not decode at all; set by the caller.
    pub malformed_source_records: usize,
    pub labels_by_kind: BTreeMap<LabelKind, usize>,
    pub new_labels: usize,
    pub updated_labels: usize,
    pub labeled_addresses: usize,
    pub multi_label_addresses: usize,
    /// Up to five addresses carrying the most labels.
    pub top_multi_label: Vec<(String, Vec<LabelKind>)>,
    pub confidence: Option<ConfidenceStats>,
}

impl RunSummary {
    pub fn build(
        run_time: DateTime<Utc>,
        addresses_processed: usize,
        addresses_skipped: usize,
        data_errors: usize,
        merge: MergeStats,
        labels: &[AddressLabel],
    ) -> Self {
        let mut labels_by_kind: BTreeMap<LabelKind, usize> = BTreeMap::new();
        let mut by_address: BTreeMap<&str, Vec<LabelKind>> = BTreeMap::new();
        for label in labels {
            *labels_by_kind.entry(label.kind.clone()).or_default() += 1;
            by_address
                .entry(label.address.as_str())
                .or_default()
                .push(label.kind.clone());
        }

        let mut multi: Vec<(String, Vec<LabelKind>)> = by_address
            .iter()
            .filter(|(_, kinds)| kinds.len() > 1)
            .map(|(addr, kinds)| (addr.to_string(), kinds.clone()))
            .collect();
        let multi_label_addresses = multi.len();
        // Most labels first; BTreeMap order breaks ties by address.
        multi.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        multi.truncate(TOP_MULTI_LABEL);

        Self {
            run_time,
            addresses_processed,
            addresses_skipped,
            data_errors,
            malformed_source_records: 0,
            labels_by_kind,
            new_labels: merge.created,
            updated_labels: merge.updated,
            labeled_addresses: by_address.len(),
            multi_label_addresses,
            top_multi_label: multi,
            confidence: ConfidenceStats::from_labels(labels),
        }
    }

    pub fn total_labels(&self) -> usize {
        self.labels_by_kind.values().sum()
    }

    pub fn count_for(&self, kind: &LabelKind) -> usize {
        self.labels_by_kind.get(kind).copied().unwrap_or(0)
    }

    /// Emit the report through `tracing`.
    pub fn log(&self) {
        tracing::info!(
            processed = self.addresses_processed,
            skipped = self.addresses_skipped,
            data_errors = self.data_errors,
            malformed = self.malformed_source_records,
            labels = self.total_labels(),
            new = self.new_labels,
            updated = self.updated_labels,
            labeled_addresses = self.labeled_addresses,
            "Labeling run summary"
        );

        for (kind, count) in &self.labels_by_kind {
            tracing::info!(label = %kind, count, "Label breakdown");
        }

        match &self.confidence {
            Some(c) => tracing::info!(
                mean = round_to(c.mean, 3),
                median = round_to(c.median, 3),
                min = round_to(c.min, 3),
                max = round_to(c.max, 3),
                high_confidence = c.high_confidence,
                "Confidence statistics"
            ),
            None => tracing::warn!("No labels generated"),
        }

        if self.multi_label_addresses > 0 {
            tracing::info!(count = self.multi_label_addresses, "Addresses with multiple labels");
            for (address, kinds) in &self.top_multi_label {
                let kinds: Vec<&str> = kinds.iter().map(LabelKind::as_str).collect();
                tracing::info!(address = %address, labels = ?kinds, "Multi-label address");
            }
        }
    }
}
