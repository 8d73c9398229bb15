// src/services/tickers.rs

//! CIK to ticker lookup backed by the SEC `company_tickers.json` dataset.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::normalize_cik;
use crate::services::fetcher::{ConditionalFetcher, FetchMode, FetchOutcome};

#[derive(Debug, Deserialize)]
struct TickerRecord {
    #[serde(default)]
    cik_str: Option<serde_json::Value>,
    #[serde(default)]
    cik: Option<serde_json::Value>,
    #[serde(default)]
    ticker: Option<String>,
}

/// In-memory ticker directory refreshed from upstream on an interval.
#[derive(Debug)]
pub struct TickerDirectory {
    url: String,
    refresh_every: Duration,
    mapping: HashMap<String, String>,
    loaded_at: Option<Instant>,
    /// Earliest retry after a failed refresh
    retry_at: Option<Instant>,
}

const RETRY_AFTER_FAILURE: Duration = Duration::from_secs(300);

impl TickerDirectory {
    pub fn new(url: impl Into<String>, refresh_every: Duration) -> Self {
        Self {
            url: url.into(),
            refresh_every: refresh_every.max(Duration::from_secs(60)),
            mapping: HashMap::new(),
            loaded_at: None,
            retry_at: None,
        }
    }

    /// A fixed directory that never refreshes.
    pub fn from_mapping<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mapping = pairs
            .into_iter()
            .filter_map(|(cik, ticker)| {
                normalize_cik(cik.as_ref()).map(|c| (c, ticker.as_ref().trim().to_uppercase()))
            })
            .collect();
        Self {
            url: String::new(),
            refresh_every: Duration::MAX,
            mapping,
            loaded_at: Some(Instant::now()),
            retry_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Ticker for a CIK in any zero-padded form.
    pub fn lookup(&self, cik: &str) -> Option<String> {
        let key = normalize_cik(cik)?;
        self.mapping.get(&key).cloned()
    }

    pub fn is_stale(&self) -> bool {
        match self.loaded_at {
            Some(at) => at.elapsed() >= self.refresh_every,
            None => true,
        }
    }

    /// Reload the dataset when stale. Returns whether the mapping was replaced.
    pub async fn refresh_if_stale(&mut self, fetcher: &ConditionalFetcher) -> Result<bool> {
        if !self.is_stale() || self.retry_at.is_some_and(|at| Instant::now() < at) {
            return Ok(false);
        }
        let result = self.refresh(fetcher).await;
        self.retry_at = match &result {
            Ok(_) => None,
            Err(_) => Some(Instant::now() + RETRY_AFTER_FAILURE.min(self.refresh_every)),
        };
        result
    }

    async fn refresh(&mut self, fetcher: &ConditionalFetcher) -> Result<bool> {
        let mode = if self.mapping.is_empty() {
            FetchMode::Revalidate
        } else {
            FetchMode::IfChanged
        };
        match fetcher.fetch(&self.url, mode).await? {
            FetchOutcome::NotModified => {
                self.loaded_at = Some(Instant::now());
                Ok(false)
            }
            FetchOutcome::Fresh { body, .. } => {
                let mapping = parse_dataset(&body)?;
                if mapping.is_empty() {
                    return Err(AppError::parse(&self.url, "ticker dataset is empty"));
                }
                log::info!("Loaded {} ticker mappings", mapping.len());
                self.mapping = mapping;
                self.loaded_at = Some(Instant::now());
                Ok(true)
            }
        }
    }
}

fn value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse `{"0": {"cik_str": 320193, "ticker": "AAPL", ...}, ...}`.
pub fn parse_dataset(body: &str) -> Result<HashMap<String, String>> {
    let records: HashMap<String, TickerRecord> =
        serde_json::from_str(body).map_err(|e| AppError::parse("ticker dataset", e))?;

    // Walk rows in dataset order so a CIK with several share classes
    // resolves the same way on every load; the last row wins.
    let mut rows: Vec<(String, TickerRecord)> = records.into_iter().collect();
    rows.sort_by_cached_key(|(key, _)| (key.parse::<u64>().unwrap_or(u64::MAX), key.clone()));

    let mut mapping = HashMap::with_capacity(rows.len());
    for (_, record) in rows {
        let cik = record
            .cik_str
            .as_ref()
            .or(record.cik.as_ref())
            .and_then(value_to_string)
            .and_then(|c| normalize_cik(&c));
        let ticker = record
            .ticker
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty());
        if let (Some(cik), Some(ticker)) = (cik, ticker) {
            mapping.insert(cik, ticker);
        }
    }
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dataset_with_numeric_and_string_ciks() {
        let mapping = parse_dataset(
            r#"{
                "0": {"cik_str": 320193, "ticker": "aapl", "title": "Apple Inc."},
                "1": {"cik_str": "0000789019", "ticker": "MSFT", "title": "Microsoft"},
                "2": {"cik_str": 1, "ticker": "", "title": "No ticker"}
            }"#,
        )
        .unwrap();

        assert_eq!(mapping.get("320193").map(String::as_str), Some("AAPL"));
        assert_eq!(mapping.get("789019").map(String::as_str), Some("MSFT"));
        assert!(!mapping.contains_key("1"));
    }

    #[test]
    fn share_classes_resolve_to_the_last_row() {
        let body = r#"{
            "0": {"cik_str": 1652044, "ticker": "GOOGL", "title": "Alphabet Inc."},
            "1": {"cik_str": 1652044, "ticker": "GOOG", "title": "Alphabet Inc."},
            "2": {"cik_str": 1067983, "ticker": "BRK-B", "title": "Berkshire Hathaway"},
            "10": {"cik_str": 1067983, "ticker": "BRK-A", "title": "Berkshire Hathaway"}
        }"#;
        for _ in 0..50 {
            let mapping = parse_dataset(body).unwrap();
            assert_eq!(mapping.get("1652044").map(String::as_str), Some("GOOG"));
            assert_eq!(mapping.get("1067983").map(String::as_str), Some("BRK-A"));
        }
    }

    #[test]
    fn rejects_invalid_dataset() {
        assert!(parse_dataset("not json").is_err());
    }

    #[test]
    fn lookup_ignores_zero_padding() {
        let directory = TickerDirectory::from_mapping([("320193", "aapl")]);
        assert_eq!(directory.lookup("0000320193").as_deref(), Some("AAPL"));
        assert_eq!(directory.lookup("999"), None);
        assert!(!directory.is_stale());
    }

    #[tokio::test]
    async fn failed_refresh_is_not_retried_every_poll() {
        use std::sync::Arc;

        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        use crate::models::SecConfig;
        use crate::pipeline::RateLimiter;

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/company_tickers.json"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let config = SecConfig {
            user_agent: "Acme Research ops@acme-research.io".to_string(),
            ..SecConfig::default()
        };
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(1)));
        let fetcher = ConditionalFetcher::new(&config, limiter).unwrap();
        let mut directory = TickerDirectory::new(
            format!("{}/files/company_tickers.json", server.uri()),
            Duration::from_secs(3600),
        );

        assert!(directory.refresh_if_stale(&fetcher).await.is_err());
        assert!(!directory.refresh_if_stale(&fetcher).await.unwrap());
        assert!(directory.is_empty());
    }
}
