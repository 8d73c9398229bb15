// src/services/fetcher.rs

//! Conditional HTTP fetcher.
//!
//! Wraps the shared client with cache validators (ETag / Last-Modified),
//! the global rate limiter, and upstream error classification.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::{
    ACCEPT, ETAG, HeaderMap, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, RETRY_AFTER,
};

use crate::error::{AppError, Result};
use crate::models::SecConfig;
use crate::pipeline::RateLimiter;
use crate::utils::http::{create_async_client, parse_retry_after, validate_user_agent};

/// Caching preconditions remembered for one URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheValidators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheValidators {
    fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            etag: header_string(headers, ETAG),
            last_modified: header_string(headers, LAST_MODIFIED),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// How stored validators are used for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Send validators; upstream may answer "not modified".
    IfChanged,
    /// Download the body unconditionally but remember the new validators.
    Revalidate,
    /// Download the body; validators are neither sent nor stored.
    Always,
}

/// Successful fetch result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fresh {
        body: String,
        validators: CacheValidators,
    },
    NotModified,
}

/// HTTP GET with validators, pacing, and typed failures.
pub struct ConditionalFetcher {
    client: reqwest::Client,
    user_agent: String,
    limiter: Arc<RateLimiter>,
    validators: Mutex<HashMap<String, CacheValidators>>,
}

impl ConditionalFetcher {
    /// Build a fetcher with its own client for the given upstream settings.
    pub fn new(config: &SecConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let client = create_async_client(config)?;
        Ok(Self::with_client(client, config.user_agent.trim(), limiter))
    }

    pub fn with_client(
        client: reqwest::Client,
        user_agent: impl Into<String>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            limiter,
            validators: Mutex::new(HashMap::new()),
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Validators currently stored for `url`.
    pub fn validators_for(&self, url: &str) -> Option<CacheValidators> {
        self.lock_validators().get(url).cloned()
    }

    fn lock_validators(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheValidators>> {
        // A poisoned map only holds cache hints; keep using it.
        self.validators
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetch `url`, sending stored validators when `mode` allows it.
    pub async fn fetch(&self, url: &str, mode: FetchMode) -> Result<FetchOutcome> {
        self.fetch_with_accept(url, mode, None).await
    }

    pub async fn fetch_with_accept(
        &self,
        url: &str,
        mode: FetchMode,
        accept: Option<&str>,
    ) -> Result<FetchOutcome> {
        // Local rule: never spend a request with a placeholder identity.
        validate_user_agent(&self.user_agent).map_err(|reason| AppError::blocked(url, reason))?;

        let stored = match mode {
            FetchMode::IfChanged => self.validators_for(url),
            FetchMode::Revalidate | FetchMode::Always => None,
        };

        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        if let Some(validators) = &stored {
            if let Some(etag) = &validators.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &validators.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        self.limiter.acquire().await;
        log::debug!("GET {}", url);
        let response = request.send().await.map_err(|source| AppError::Network {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            log::debug!("Not modified: {}", url);
            return Ok(FetchOutcome::NotModified);
        }
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_retry_after(v, Utc::now()));
            let reason = if status == StatusCode::FORBIDDEN {
                format!(
                    "request refused; verify the identification header '{}'",
                    self.user_agent
                )
            } else {
                "excessive request rate".to_string()
            };
            return Err(AppError::Blocked {
                url: url.to_string(),
                status: Some(status.as_u16()),
                reason,
                retry_after,
            });
        }
        if !status.is_success() {
            return Err(AppError::Upstream {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let validators = CacheValidators::from_headers(response.headers());
        let body = response.text().await.map_err(|source| AppError::Network {
            url: url.to_string(),
            source,
        })?;

        if mode != FetchMode::Always {
            let mut map = self.lock_validators();
            if validators.is_empty() {
                map.remove(url);
            } else {
                map.insert(url.to_string(), validators.clone());
            }
        }

        Ok(FetchOutcome::Fresh { body, validators })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::error::ErrorKind;

    const UA: &str = "Acme Research ops@acme-research.io";

    fn fetcher(user_agent: &str) -> ConditionalFetcher {
        let config = SecConfig {
            user_agent: user_agent.to_string(),
            ..SecConfig::default()
        };
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(1)));
        ConditionalFetcher::new(&config, limiter).unwrap()
    }

    #[tokio::test]
    async fn stores_validators_and_returns_not_modified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(header("if-none-match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"v1\"")
                    .insert_header("Last-Modified", "Wed, 14 Oct 2026 12:00:00 GMT")
                    .set_body_string("<feed/>"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher(UA);
        let url = format!("{}/feed", server.uri());

        let first = fetcher.fetch(&url, FetchMode::IfChanged).await.unwrap();
        assert!(matches!(first, FetchOutcome::Fresh { ref body, .. } if body == "<feed/>"));
        assert_eq!(
            fetcher.validators_for(&url).unwrap().etag.as_deref(),
            Some("\"v1\"")
        );

        let second = fetcher.fetch(&url, FetchMode::IfChanged).await.unwrap();
        assert_eq!(second, FetchOutcome::NotModified);
        assert_eq!(fetcher.limiter().issued(), 2);
    }

    #[tokio::test]
    async fn always_mode_skips_validators() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/idx"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"v1\"")
                    .set_body_string("page"),
            )
            .expect(2)
            .mount(&server)
            .await;

        let fetcher = fetcher(UA);
        let url = format!("{}/idx", server.uri());
        for _ in 0..2 {
            let outcome = fetcher.fetch(&url, FetchMode::Always).await.unwrap();
            assert!(matches!(outcome, FetchOutcome::Fresh { .. }));
        }
        assert!(fetcher.validators_for(&url).is_none());
    }

    #[tokio::test]
    async fn classifies_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(path("/forbidden"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(path("/slow-down"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .mount(&server)
            .await;
        Mock::given(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = fetcher(UA);

        let err = fetcher
            .fetch(&format!("{}/forbidden", server.uri()), FetchMode::IfChanged)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Blocked));
        assert_eq!(err.status(), Some(403));

        let err = fetcher
            .fetch(&format!("{}/slow-down", server.uri()), FetchMode::IfChanged)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Blocked));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));

        let err = fetcher
            .fetch(&format!("{}/broken", server.uri()), FetchMode::IfChanged)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Upstream));
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let fetcher = fetcher(UA);
        // Port 9 (discard) on localhost is expected to refuse connections.
        let err = fetcher
            .fetch("http://127.0.0.1:9/feed", FetchMode::IfChanged)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Network));
    }

    #[tokio::test]
    async fn placeholder_user_agent_is_blocked_before_rate_limiter() {
        let fetcher = fetcher("FilingFetcher/0.1 (contact@example.com)");
        let err = fetcher
            .fetch("http://127.0.0.1:9/feed", FetchMode::IfChanged)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Blocked));
        assert_eq!(fetcher.limiter().issued(), 0);

        let fetcher = fetcher_with_empty_agent();
        assert_eq!(
            fetcher
                .fetch("http://127.0.0.1:9/feed", FetchMode::Always)
                .await
                .unwrap_err()
                .kind(),
            Some(ErrorKind::Blocked)
        );
        assert_eq!(fetcher.limiter().issued(), 0);
    }

    fn fetcher_with_empty_agent() -> ConditionalFetcher {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(1)));
        ConditionalFetcher::with_client(reqwest::Client::new(), "", limiter)
    }
}
