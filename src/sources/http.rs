use reqwest::{Client, Url};
use serde::Deserialize;

use crate::errors::SourceError;
use crate::sources::{decode_records, Snapshot, SnapshotWindow, StatisticsSource};

const STATISTICS_PATH: &str = "/v1/address-statistics";
const HEALTH_PATH: &str = "/health";

/// Safety stop for a service that never stops returning cursors.
const MAX_PAGES: usize = 10_000;

/// One page from the statistics query service.
#[derive(Debug, Deserialize)]
struct StatisticsPage {
    #[serde(default)]
    records: Vec<serde_json::Value>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Client for a remote analytical query service exposing aggregated
/// per-address statistics, paged by cursor.
#[derive(Debug, Clone)]
pub struct HttpStatisticsSource {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    page_size: usize,
}

impl HttpStatisticsSource {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: Option<String>, page_size: usize) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            page_size: page_size.max(1),
        }
    }

    fn page_url(&self, window: &SnapshotWindow, cursor: Option<&str>) -> Result<Url, SourceError> {
        let mut params = vec![
            ("start", window.start.to_rfc3339()),
            ("end", window.end.to_rfc3339()),
            ("limit", self.page_size.to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }

        let url = format!("{}{}", self.base_url, STATISTICS_PATH);
        Url::parse_with_params(&url, &params).map_err(|e| SourceError::Url(format!("{url}: {e}")))
    }

    async fn get_page(&self, url: Url) -> Result<StatisticsPage, SourceError> {
        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let page = request
            .send()
            .await?
            .error_for_status()?
            .json::<StatisticsPage>()
            .await?;
        Ok(page)
    }
}

impl StatisticsSource for HttpStatisticsSource {
    async fn fetch(&self, window: &SnapshotWindow) -> Result<Snapshot, SourceError> {
        let mut records = Vec::new();
        let mut malformed = 0usize;
        let mut cursor: Option<String> = None;

        for page_no in 1..=MAX_PAGES {
            let url = self.page_url(window, cursor.as_deref())?;
            let page = self.get_page(url).await?;

            let (decoded, bad) = decode_records(page.records);
            tracing::debug!(page = page_no, records = decoded.len(), malformed = bad, "Statistics page received");
            records.extend(decoded);
            malformed += bad;

            match page.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => {
                    tracing::info!(
                        pages = page_no,
                        records = records.len(),
                        malformed,
                        "Statistics fetched from query service"
                    );
                    return Ok(Snapshot {
                        window: *window,
                        records,
                        malformed,
                    });
                }
            }
        }

        Err(SourceError::Unexpected(format!(
            "query service still paging after {MAX_PAGES} pages"
        )))
    }

    async fn check(&self) -> Result<(), SourceError> {
        let url = format!("{}{}", self.base_url, HEALTH_PATH);
        self.http.get(&url).send().await?.error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn source() -> HttpStatisticsSource {
        HttpStatisticsSource::new(Client::new(), "https://stats.example.com/", None, 500)
    }

    fn window() -> SnapshotWindow {
        SnapshotWindow::ending_at(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(), 30)
    }

    #[test]
    fn test_page_url_without_cursor() {
        let url = source().page_url(&window(), None).unwrap();
        assert_eq!(url.path(), "/v1/address-statistics");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("limit".into(), "500".into())));
        assert!(pairs.contains(&("start".into(), "2024-05-02T00:00:00+00:00".into())));
        assert!(!pairs.iter().any(|(k, _)| k == "cursor"));
    }

    #[test]
    fn test_page_url_with_cursor() {
        let url = source().page_url(&window(), Some("abc 123")).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("cursor".into(), "abc 123".into())));
    }

    #[test]
    fn test_page_decoding_defaults() {
        let page: StatisticsPage = serde_json::from_str(r#"{"records":[{"address":"0xa"}]}"#).unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(page.next_cursor.is_none());
    }
}
