use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::engine::RunSummary;
use crate::models::AddressLabel;

/// Install the Prometheus recorder and pre-register the run metrics.
/// `render()` on the returned handle produces the text exposition payload.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    counter!("addresses_processed_total").absolute(0);
    counter!("addresses_skipped_total").absolute(0);
    counter!("data_errors_total").absolute(0);
    counter!("malformed_source_records_total").absolute(0);

    gauge!("labeled_addresses").set(0.0);

    histogram!("run_duration_seconds").record(0.0);

    handle
}

/// Record one run. A no-op when no recorder is installed.
pub fn record_run(summary: &RunSummary, labels: &[AddressLabel]) {
    counter!("addresses_processed_total").increment(summary.addresses_processed as u64);
    counter!("addresses_skipped_total").increment(summary.addresses_skipped as u64);
    counter!("data_errors_total").increment(summary.data_errors as u64);
    gauge!("labeled_addresses").set(summary.labeled_addresses as f64);

    for (kind, count) in &summary.labels_by_kind {
        counter!("labels_emitted_total", "label" => kind.to_string()).increment(*count as u64);
    }

    for label in labels {
        histogram!("label_confidence", "label" => label.kind.to_string()).record(label.confidence);
    }
}
