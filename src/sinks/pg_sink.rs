use sqlx::PgPool;

use crate::db::{self, label_repo};
use crate::errors::SinkError;
use crate::models::{index_labels, AddressLabel, ExistingLabels};
use crate::sinks::LabelSink;

/// Labels kept in the `address_labels` table, one row per (address, label).
#[derive(Debug, Clone)]
pub struct PgLabelSink {
    pool: PgPool,
}

impl PgLabelSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, SinkError> {
        Ok(Self::new(db::init_pool(database_url).await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl LabelSink for PgLabelSink {
    async fn load_existing(&self) -> Result<ExistingLabels, SinkError> {
        let labels = label_repo::load_all(&self.pool).await?;
        tracing::info!(count = labels.len(), "Loaded existing labels from database");
        Ok(index_labels(labels))
    }

    async fn persist(&self, labels: &[AddressLabel]) -> Result<usize, SinkError> {
        let written = label_repo::upsert_labels(&self.pool, labels).await?;
        tracing::info!(written, "Labels upserted");
        Ok(written)
    }

    async fn prepare(&self) -> Result<(), SinkError> {
        db::ensure_schema(&self.pool).await?;
        Ok(())
    }

    async fn check(&self) -> Result<(), SinkError> {
        match label_repo::count_labels(&self.pool).await {
            Ok(count) => {
                tracing::info!(count, "Label table reachable");
                Ok(())
            }
            Err(SinkError::Database(sqlx::Error::Database(e))) if e.code().as_deref() == Some("42P01") => {
                tracing::warn!("Label table does not exist yet; it is created on the first run");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
