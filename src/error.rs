// src/error.rs

//! Unified error handling for the filing watcher.
//!
//! Upstream failures are classified into an [`ErrorKind`] so the backoff
//! controller can react to a typed value instead of inspecting messages.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Classification of a failed upstream interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Identification rejected or excessive-traffic signal.
    Blocked,
    /// Unexpected upstream status (5xx, 404, ...).
    Upstream,
    /// Transport-level failure.
    Network,
    /// Body fetched but structurally unrecognized.
    Parse,
}

impl ErrorKind {
    /// Whether this kind points at upstream trouble and should slow polling.
    pub fn escalates_backoff(self) -> bool {
        !matches!(self, ErrorKind::Parse)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Blocked => "BLOCKED",
            ErrorKind::Upstream => "UPSTREAM_ERROR",
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Parse => "PARSE_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Upstream refused us: bad identification or rate limited
    #[error("Blocked by {url} (status {status:?}): {reason}")]
    Blocked {
        url: String,
        status: Option<u16>,
        reason: String,
        retry_after: Option<Duration>,
    },

    /// Upstream answered with an unexpected status
    #[error("Upstream error from {url}: status {status}")]
    Upstream { url: String, status: u16 },

    /// Transport failure talking to upstream
    #[error("Network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Document fetched but not understood
    #[error("Parse error in {context}: {message}")]
    Parse { context: String, message: String },

    /// Dedup ledger persistence failed
    #[error("Ledger error at {path}: {message}")]
    Ledger { path: String, message: String },

    /// Output sink rejected a record
    #[error("Sink error: {0}")]
    Sink(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built or a non-upstream request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a blocked error that did not come from an HTTP response.
    pub fn blocked(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Blocked {
            url: url.into(),
            status: None,
            reason: reason.into(),
            retry_after: None,
        }
    }

    /// Create a parse error with context.
    pub fn parse(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a ledger error.
    pub fn ledger(path: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::Ledger {
            path: path.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Upstream classification, if this error came from talking to upstream.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AppError::Blocked { .. } => Some(ErrorKind::Blocked),
            AppError::Upstream { .. } => Some(ErrorKind::Upstream),
            AppError::Network { .. } => Some(ErrorKind::Network),
            AppError::Parse { .. } => Some(ErrorKind::Parse),
            _ => None,
        }
    }

    /// Status code reported by upstream, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Blocked { status, .. } => *status,
            AppError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-provided wait hint attached to a blocked response.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AppError::Blocked { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Errors the watch loop must not survive.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Ledger { .. })
    }
}
