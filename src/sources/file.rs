use std::path::PathBuf;

use crate::errors::SourceError;
use crate::sources::{decode_records, Snapshot, SnapshotWindow, StatisticsSource};

/// Statistics exported to a local file: one JSON object per line, or a single
/// JSON array. The export is assumed to already cover the requested window.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn parse(content: &str) -> Result<Vec<serde_json::Value>, SourceError> {
        if content.trim_start().starts_with('[') {
            return Ok(serde_json::from_str(content)?);
        }

        let mut values = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(line) {
                Ok(value) => values.push(value),
                Err(e) => {
                    tracing::warn!(line = line_no + 1, error = %e, "Unparsable statistics line");
                    // Keep it so the decoder counts it as malformed.
                    values.push(serde_json::Value::Null);
                }
            }
        }
        Ok(values)
    }
}

impl StatisticsSource for JsonLinesSource {
    async fn fetch(&self, window: &SnapshotWindow) -> Result<Snapshot, SourceError> {
        tracing::info!(path = %self.path.display(), "Reading statistics export");

        let content = tokio::fs::read_to_string(&self.path).await?;
        let (records, malformed) = decode_records(Self::parse(&content)?);

        tracing::info!(
            records = records.len(),
            malformed,
            start = %window.start,
            end = %window.end,
            "Statistics export loaded"
        );

        Ok(Snapshot {
            window: *window,
            records,
            malformed,
        })
    }

    async fn check(&self) -> Result<(), SourceError> {
        let meta = tokio::fs::metadata(&self.path).await?;
        if !meta.is_file() {
            return Err(SourceError::Unexpected(format!(
                "{} is not a file",
                self.path.display()
            )));
        }
        Ok(())
    }
}
