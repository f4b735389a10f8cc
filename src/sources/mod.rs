pub mod file;
pub mod http;

pub use file::JsonLinesSource;
pub use http::HttpStatisticsSource;

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::StatisticsLocation;
use crate::errors::SourceError;
use crate::models::AddressStatistics;

/// Time range the statistics were aggregated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapshotWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SnapshotWindow {
    /// The `lookback_days` days ending at `end`.
    pub fn ending_at(end: DateTime<Utc>, lookback_days: u32) -> Self {
        Self {
            start: end - Duration::days(i64::from(lookback_days)),
            end,
        }
    }
}

/// Decoded statistics for one window.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub window: SnapshotWindow,
    pub records: Vec<AddressStatistics>,
    /// Records that could not be decoded at all and were dropped.
    pub malformed: usize,
}

/// Supplies per-address statistics. Implementations own retries and paging;
/// the engine only needs the records.
pub trait StatisticsSource {
    fn fetch(&self, window: &SnapshotWindow) -> impl Future<Output = Result<Snapshot, SourceError>> + Send;

    /// Cheap reachability check used by `validate`.
    fn check(&self) -> impl Future<Output = Result<(), SourceError>> + Send;
}

/// Source selected by configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredSource {
    File(JsonLinesSource),
    Http(HttpStatisticsSource),
}

impl ConfiguredSource {
    pub fn from_location(location: &StatisticsLocation) -> Self {
        match location {
            StatisticsLocation::File(path) => ConfiguredSource::File(JsonLinesSource::new(path.clone())),
            StatisticsLocation::Http {
                url,
                api_key,
                page_size,
            } => ConfiguredSource::Http(HttpStatisticsSource::new(
                reqwest::Client::new(),
                url.clone(),
                api_key.clone(),
                *page_size,
            )),
        }
    }
}

impl StatisticsSource for ConfiguredSource {
    async fn fetch(&self, window: &SnapshotWindow) -> Result<Snapshot, SourceError> {
        match self {
            ConfiguredSource::File(source) => source.fetch(window).await,
            ConfiguredSource::Http(source) => source.fetch(window).await,
        }
    }

    async fn check(&self) -> Result<(), SourceError> {
        match self {
            ConfiguredSource::File(source) => source.check().await,
            ConfiguredSource::Http(source) => source.check().await,
        }
    }
}

/// Decode records one at a time so a single bad record only loses itself.
pub fn decode_records<I>(values: I) -> (Vec<AddressStatistics>, usize)
where
    I: IntoIterator<Item = serde_json::Value>,
{
    let mut records = Vec::new();
    let mut malformed = 0usize;
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<AddressStatistics>(value) {
            Ok(stats) => records.push(stats),
            Err(e) => {
                malformed += 1;
                tracing::warn!(index, error = %e, "Dropping malformed statistics record");
            }
        }
    }
    (records, malformed)
}
