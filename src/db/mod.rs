pub mod label_repo;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    // Verify connectivity
    sqlx::query("SELECT 1").execute(&pool).await?;

    Ok(pool)
}

/// Create the label table if it does not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS address_labels (
            address      TEXT             NOT NULL,
            label        TEXT             NOT NULL,
            confidence   DOUBLE PRECISION NOT NULL CHECK (confidence >= 0 AND confidence <= 1),
            source_rule  TEXT             NOT NULL,
            evidence     TEXT             NOT NULL DEFAULT '{}',
            created_at   TIMESTAMPTZ      NOT NULL,
            updated_at   TIMESTAMPTZ      NOT NULL,
            PRIMARY KEY (address, label)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_address_labels_label ON address_labels (label)")
        .execute(pool)
        .await?;

    Ok(())
}
