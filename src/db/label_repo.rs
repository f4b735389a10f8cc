use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::errors::SinkError;
use crate::models::{AddressLabel, Evidence, LabelKind};

#[derive(Debug, sqlx::FromRow)]
struct LabelRow {
    address: String,
    label: String,
    confidence: f64,
    source_rule: String,
    evidence: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LabelRow> for AddressLabel {
    type Error = SinkError;

    fn try_from(row: LabelRow) -> Result<Self, Self::Error> {
        let evidence: Evidence = serde_json::from_str(&row.evidence)?;
        Ok(AddressLabel {
            address: row.address,
            kind: LabelKind::from(row.label),
            confidence: row.confidence,
            source_rule: row.source_rule,
            evidence,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Fetch every stored label.
pub async fn load_all(pool: &PgPool) -> Result<Vec<AddressLabel>, SinkError> {
    let rows = sqlx::query_as::<_, LabelRow>(
        r#"
        SELECT address, label, confidence, source_rule, evidence, created_at, updated_at
        FROM address_labels
        ORDER BY address, label
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AddressLabel::try_from).collect()
}

/// Insert or refresh labels in one transaction. An existing row keeps its
/// `created_at`; the computed fields and `updated_at` are overwritten.
pub async fn upsert_labels(pool: &PgPool, labels: &[AddressLabel]) -> Result<usize, SinkError> {
    let mut tx = pool.begin().await?;

    for label in labels {
        let evidence = serde_json::to_string(&label.evidence)?;
        sqlx::query(
            r#"
            INSERT INTO address_labels
                (address, label, confidence, source_rule, evidence, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (address, label) DO UPDATE
            SET confidence = EXCLUDED.confidence,
                source_rule = EXCLUDED.source_rule,
                evidence = EXCLUDED.evidence,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&label.address)
        .bind(label.kind.as_str())
        .bind(label.confidence)
        .bind(&label.source_rule)
        .bind(evidence)
        .bind(label.created_at)
        .bind(label.updated_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(labels.len())
}

/// Count stored labels.
pub async fn count_labels(pool: &PgPool) -> Result<i64, SinkError> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM address_labels")
        .fetch_one(pool)
        .await?;
    Ok(count.0)
}
