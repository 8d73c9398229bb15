// src/models/config.rs

//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Longest allowed cooldown between polls (one day).
const MAX_BACKOFF_DELAY_SECS: u64 = 24 * 60 * 60;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream endpoints, identification and request pacing
    #[serde(default)]
    pub sec: SecConfig,

    /// Poll loop timing
    #[serde(default)]
    pub poller: PollerConfig,

    /// Cooldown behavior after upstream failures
    #[serde(default)]
    pub backoff: BackoffSettings,

    /// Dedup ledger location
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Ticker reference dataset
    #[serde(default)]
    pub tickers: TickerConfig,

    /// Record output format
    #[serde(default)]
    pub output: OutputConfig,

    /// Chat webhook forwarding
    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        crate::utils::http::validate_user_agent(&self.sec.user_agent)
            .map_err(|reason| AppError::validation(format!("sec.user_agent: {reason}")))?;
        if self.sec.timeout_secs == 0 {
            return Err(AppError::validation("sec.timeout_secs must be > 0"));
        }
        if self.sec.feed_count == 0 {
            return Err(AppError::validation("sec.feed_count must be > 0"));
        }
        url::Url::parse(&self.sec.base_url)?;
        if self.poller.poll_interval_secs == 0 {
            return Err(AppError::validation("poller.poll_interval_secs must be > 0"));
        }
        if !self.backoff.multiplier.is_finite() || self.backoff.multiplier < 1.0 {
            return Err(AppError::validation(
                "backoff.multiplier must be a finite number >= 1.0",
            ));
        }
        if self.backoff.max_delay_secs > MAX_BACKOFF_DELAY_SECS {
            return Err(AppError::validation(format!(
                "backoff.max_delay_secs must not exceed {MAX_BACKOFF_DELAY_SECS}"
            )));
        }
        if self.backoff.max_delay_secs < self.poller.poll_interval_secs {
            return Err(AppError::validation(
                "backoff.max_delay_secs must not be below poller.poll_interval_secs",
            ));
        }
        if self.ledger.path.as_os_str().is_empty() {
            return Err(AppError::validation("ledger.path is empty"));
        }
        if self.notify.enabled && self.notify.targets.is_empty() {
            return Err(AppError::validation(
                "notify.enabled is set but no notify.targets are configured",
            ));
        }
        Ok(())
    }

    /// Feed URL: the explicit override, or one built from base/owner/count.
    pub fn feed_url(&self) -> String {
        if let Some(url) = &self.sec.feed_url {
            return url.clone();
        }
        format!(
            "{}/cgi-bin/browse-edgar?action=getcurrent&owner={}&count={}&output=atom",
            self.sec.base_url.trim_end_matches('/'),
            self.sec.owner,
            self.sec.feed_count.max(1)
        )
    }

    pub fn tickers_url(&self) -> String {
        format!(
            "{}{}",
            self.sec.base_url.trim_end_matches('/'),
            self.tickers.dataset_path
        )
    }
}

/// Upstream host settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecConfig {
    /// Identification header; must name a real, contactable operator
    #[serde(default)]
    pub user_agent: String,

    /// Scheme and host of the upstream (no trailing path)
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Rows requested per feed poll
    #[serde(default = "defaults::feed_count")]
    pub feed_count: u32,

    /// Value of the feed's `owner` parameter
    #[serde(default = "defaults::owner")]
    pub owner: String,

    /// Replaces the generated feed URL entirely
    #[serde(default)]
    pub feed_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Minimum spacing between request starts, in milliseconds
    #[serde(default = "defaults::min_request_interval")]
    pub min_request_interval_ms: u64,
}

impl SecConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }
}

impl Default for SecConfig {
    fn default() -> Self {
        Self {
            user_agent: String::new(),
            base_url: defaults::base_url(),
            feed_count: defaults::feed_count(),
            owner: defaults::owner(),
            feed_url: None,
            timeout_secs: defaults::timeout(),
            min_request_interval_ms: defaults::min_request_interval(),
        }
    }
}

/// Poll loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Baseline delay between polls in seconds
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_secs: u64,

    /// Interval after which the feed is refetched ignoring cache validators
    #[serde(default = "defaults::revalidate")]
    pub revalidate_secs: u64,

    /// Pause between resolved filings in milliseconds
    #[serde(default = "defaults::document_delay")]
    pub document_delay_ms: u64,

    /// Stop after emitting this many filings
    #[serde(default)]
    pub max_results: Option<usize>,
}

impl PollerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn revalidate_interval(&self) -> Duration {
        Duration::from_secs(self.revalidate_secs)
    }

    pub fn document_delay(&self) -> Duration {
        Duration::from_millis(self.document_delay_ms)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: defaults::poll_interval(),
            revalidate_secs: defaults::revalidate(),
            document_delay_ms: defaults::document_delay(),
            max_results: None,
        }
    }
}

/// Cooldown escalation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffSettings {
    /// Minimum cooldown after a blocked response, in seconds
    #[serde(default = "defaults::blocked_cooldown")]
    pub blocked_cooldown_secs: u64,

    /// Growth factor applied on each consecutive failure
    #[serde(default = "defaults::multiplier")]
    pub multiplier: f64,

    /// Cooldown ceiling in seconds
    #[serde(default = "defaults::max_delay")]
    pub max_delay_secs: u64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            blocked_cooldown_secs: defaults::blocked_cooldown(),
            multiplier: defaults::multiplier(),
            max_delay_secs: defaults::max_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Append log of emitted accession numbers
    #[serde(default = "defaults::ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: defaults::ledger_path(),
        }
    }
}

/// Ticker reference dataset settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Path of the dataset on the upstream host
    #[serde(default = "defaults::tickers_path")]
    pub dataset_path: String,

    /// Refresh interval in seconds
    #[serde(default = "defaults::ticker_refresh")]
    pub refresh_secs: u64,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dataset_path: defaults::tickers_path(),
            refresh_secs: defaults::ticker_refresh(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// One line per record instead of pretty-printed JSON
    #[serde(default)]
    pub compact: bool,

    /// Attach per-document NDJSON rows to each record
    #[serde(default = "defaults::enabled")]
    pub ndjson: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            compact: false,
            ndjson: true,
        }
    }
}

/// Chat webhook forwarding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub enabled: bool,

    /// JSON payload template with `{path}` placeholders
    #[serde(default = "defaults::template_path")]
    pub template: PathBuf,

    #[serde(default)]
    pub targets: Vec<WebhookTarget>,

    /// Only forward these form types (all when empty)
    #[serde(default)]
    pub forms: Vec<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            template: defaults::template_path(),
            targets: Vec::new(),
            forms: Vec::new(),
        }
    }
}

/// A webhook endpoint, optionally posting into an existing thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookTarget {
    pub url: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Upstream defaults
    pub fn base_url() -> String {
        "https://www.sec.gov".into()
    }
    pub fn feed_count() -> u32 {
        40
    }
    pub fn owner() -> String {
        "exclude".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn min_request_interval() -> u64 {
        150
    }

    // Poller defaults
    pub fn poll_interval() -> u64 {
        7
    }
    pub fn revalidate() -> u64 {
        600
    }
    pub fn document_delay() -> u64 {
        600
    }

    // Backoff defaults
    pub fn blocked_cooldown() -> u64 {
        60
    }
    pub fn multiplier() -> f64 {
        2.0
    }
    pub fn max_delay() -> u64 {
        900
    }

    pub fn ledger_path() -> PathBuf {
        PathBuf::from("data/ledger.log")
    }

    pub fn enabled() -> bool {
        true
    }
    pub fn tickers_path() -> String {
        "/files/company_tickers.json".into()
    }
    pub fn ticker_refresh() -> u64 {
        12 * 60 * 60
    }

    pub fn template_path() -> PathBuf {
        PathBuf::from("data/webhook_template.json")
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
