// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::SecConfig;

/// Substrings that mark an identification header as a template value.
const PLACEHOLDER_TOKENS: &[&str] = &[
    "example.com",
    "example.org",
    "contact@example",
    "name@example",
];

/// Create a configured asynchronous HTTP client for the upstream host.
pub fn create_async_client(config: &SecConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.trim())
        .timeout(config.timeout())
        .build()?;
    Ok(client)
}

/// Check that a user agent names a real operator.
///
/// Returns the reason when it is missing or still a template placeholder.
pub fn validate_user_agent(user_agent: &str) -> std::result::Result<(), String> {
    let trimmed = user_agent.trim();
    if trimmed.is_empty() {
        return Err("identification header is missing".to_string());
    }
    let lowered = trimmed.to_lowercase();
    if let Some(token) = PLACEHOLDER_TOKENS.iter().find(|t| lowered.contains(**t)) {
        return Err(format!(
            "identification header '{trimmed}' contains placeholder '{token}'"
        ));
    }
    Ok(())
}

/// Parse a `Retry-After` header value: delta seconds or an HTTP date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    (at.with_timezone(&Utc) - now).to_std().ok()
}
