pub mod csv_sink;
pub mod pg_sink;

pub use csv_sink::CsvLabelSink;
pub use pg_sink::PgLabelSink;

use std::future::Future;

use crate::config::AppConfig;
use crate::errors::SinkError;
use crate::models::{AddressLabel, ExistingLabels};

/// Storage for the label set. Persisting never prunes: labels missing from a
/// run stay stored with their previous values.
pub trait LabelSink {
    /// Labels from earlier runs, keyed by (address, label).
    fn load_existing(&self) -> impl Future<Output = Result<ExistingLabels, SinkError>> + Send;

    /// Store this run's labels. Returns how many records were written.
    fn persist(&self, labels: &[AddressLabel]) -> impl Future<Output = Result<usize, SinkError>> + Send;

    /// Create whatever the sink needs before the first write.
    fn prepare(&self) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Read-only health check used by `validate`.
    fn check(&self) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Sink selected by configuration: Postgres when `DATABASE_URL` is set,
/// timestamped CSV files otherwise.
#[derive(Debug, Clone)]
pub enum ConfiguredSink {
    Csv(CsvLabelSink),
    Postgres(PgLabelSink),
}

impl ConfiguredSink {
    pub async fn connect(config: &AppConfig) -> Result<Self, SinkError> {
        match &config.database_url {
            Some(url) => {
                tracing::info!("Connecting to database...");
                let sink = PgLabelSink::connect(url).await?;
                tracing::info!("Database connected");
                Ok(ConfiguredSink::Postgres(sink))
            }
            None => Ok(ConfiguredSink::Csv(CsvLabelSink::new(config.output_dir.clone()))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConfiguredSink::Csv(_) => "csv",
            ConfiguredSink::Postgres(_) => "postgres",
        }
    }
}

impl LabelSink for ConfiguredSink {
    async fn load_existing(&self) -> Result<ExistingLabels, SinkError> {
        match self {
            ConfiguredSink::Csv(sink) => sink.load_existing().await,
            ConfiguredSink::Postgres(sink) => sink.load_existing().await,
        }
    }

    async fn persist(&self, labels: &[AddressLabel]) -> Result<usize, SinkError> {
        match self {
            ConfiguredSink::Csv(sink) => sink.persist(labels).await,
            ConfiguredSink::Postgres(sink) => sink.persist(labels).await,
        }
    }

    async fn prepare(&self) -> Result<(), SinkError> {
        match self {
            ConfiguredSink::Csv(sink) => sink.prepare().await,
            ConfiguredSink::Postgres(sink) => sink.prepare().await,
        }
    }

    async fn check(&self) -> Result<(), SinkError> {
        match self {
            ConfiguredSink::Csv(sink) => sink.check().await,
            ConfiguredSink::Postgres(sink) => sink.check().await,
        }
    }
}
