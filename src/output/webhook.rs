// src/output/webhook.rs

//! Chat webhook forwarding.
//!
//! Renders a JSON message template against each filing record and posts it
//! to every configured webhook. Template strings may reference record fields
//! with `{feed_entry.company}` or `${documents.documents.0.url}`.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{FilingRecord, NotifyConfig, WebhookTarget};
use crate::output::Notifier;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(20);
const EDGAR_BROWSE_URL: &str = "https://www.sec.gov/edgar/browse/";

static DOLLAR_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^{}]+)\}").expect("valid placeholder regex"));
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("valid placeholder regex"));

/// Posts rendered filing messages to chat webhooks.
pub struct WebhookNotifier {
    client: reqwest::Client,
    template: Value,
    targets: Vec<WebhookTarget>,
    forms: Vec<String>,
}

impl WebhookNotifier {
    pub fn new(
        client: reqwest::Client,
        template: Value,
        targets: Vec<WebhookTarget>,
        forms: &[String],
    ) -> Result<Self> {
        if targets.is_empty() {
            return Err(AppError::config("at least one webhook target is required"));
        }
        Ok(Self {
            client,
            template,
            targets,
            forms: forms.iter().map(|f| f.trim().to_uppercase()).collect(),
        })
    }

    /// Load the template file named by the notify settings.
    pub async fn from_config(config: &NotifyConfig, client: reqwest::Client) -> Result<Self> {
        let template = load_template(&config.template).await?;
        Self::new(client, template, config.targets.clone(), &config.forms)
    }

    /// Whether records of this form type are forwarded.
    pub fn accepts(&self, form_type: &str) -> bool {
        self.forms.is_empty() || self.forms.iter().any(|f| f == &form_type.trim().to_uppercase())
    }

    /// Template with every placeholder resolved against `record`.
    pub fn render(&self, record: &FilingRecord) -> Result<Value> {
        let context = build_context(record)?;
        Ok(transform(&self.template, &context))
    }

    async fn post(&self, target: &WebhookTarget, payload: &Value) -> Result<()> {
        let mut params = vec![("wait", "true")];
        if let Some(thread) = target.thread_id.as_deref().filter(|t| !t.is_empty()) {
            params.push(("thread_id", thread));
        }
        self.client
            .post(&target.url)
            .query(&params)
            .json(payload)
            .timeout(WEBHOOK_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, record: &FilingRecord) -> Result<()> {
        if !self.accepts(&record.feed_entry.form_type) {
            log::debug!(
                "Not forwarding {} (form {})",
                record.accession(),
                record.feed_entry.form_type
            );
            return Ok(());
        }

        let payload = self.render(record)?;
        let results = join_all(self.targets.iter().map(|t| self.post(t, &payload))).await;

        let mut delivered = 0;
        for (target, result) in self.targets.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => log::warn!("Webhook {} failed: {}", redact(&target.url), e),
            }
        }
        if delivered == 0 {
            return Err(AppError::Sink(format!(
                "no webhook accepted {}",
                record.accession()
            )));
        }
        log::debug!(
            "Forwarded {} to {}/{} webhooks",
            record.accession(),
            delivered,
            self.targets.len()
        );
        Ok(())
    }
}

async fn load_template(path: &Path) -> Result<Value> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::config(format!("webhook template {}: {e}", path.display())))?;
    let template = serde_json::from_str(&text)?;
    Ok(template)
}

/// Webhook URLs embed a token; log only the host and path prefix.
fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => format!("{}://{}/…", parsed.scheme(), parsed.host_str().unwrap_or("")),
        Err(_) => "<invalid url>".to_string(),
    }
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Markdown link line: the filing itself, plus social searches when a ticker is known.
pub fn build_links(doc_url: Option<&str>, ticker: Option<&str>) -> String {
    let mut links = vec![format!(
        "[SEC EDGAR]({})",
        doc_url.unwrap_or(EDGAR_BROWSE_URL)
    )];
    if let Some(query) = ticker.map(str::trim).filter(|t| !t.is_empty()) {
        let query = encode(query);
        links.push(format!(
            "[Twitter](https://x.com/search?q={query}&src=typed_query)"
        ));
        links.push(format!("[Stocktwits](https://stocktwits.com/symbol/{query})"));
    }
    links.join(" | ")
}

fn build_context(record: &FilingRecord) -> Result<Value> {
    let doc_url = record
        .documents
        .primary_document_url()
        .unwrap_or(&record.feed_entry.filing_url);
    let links = Value::String(build_links(Some(doc_url), record.ticker.as_deref()));

    let mut context = serde_json::to_value(record)?;
    if let Some(entry) = context.get_mut("feed_entry").and_then(Value::as_object_mut) {
        entry.insert("links".to_string(), links.clone());
    }
    if let Some(root) = context.as_object_mut() {
        root.insert("links".to_string(), links);
    }
    Ok(context)
}

fn transform(value: &Value, context: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), transform(v, context)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| transform(v, context)).collect()),
        Value::String(text) => Value::String(replace_tokens(text, context)),
        other => other.clone(),
    }
}

fn replace_tokens(text: &str, context: &Value) -> String {
    let lookup = |caps: &Captures<'_>| resolve_path(context, &caps[1]);
    let text = DOLLAR_PLACEHOLDER_RE.replace_all(text, lookup);
    PLACEHOLDER_RE.replace_all(&text, lookup).into_owned()
}

/// Walk a dotted path; lists are indexed by number. Missing values render empty.
fn resolve_path(context: &Value, path: &str) -> String {
    let mut current = context;
    for token in path.split('.').map(str::trim).filter(|t| !t.is_empty()) {
        let next = match current {
            Value::Array(items) => token.parse::<usize>().ok().and_then(|i| items.get(i)),
            Value::Object(map) => map.get(token),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return String::new(),
        }
    }
    match current {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::models::fixtures::sample_record;

    fn template() -> Value {
        json!({
            "content": "New {feed_entry.form_type} from ${feed_entry.company}",
            "embeds": [{
                "title": "{feed_entry.company} ({ticker})",
                "url": "{documents.documents.0.url}",
                "description": "{feed_entry.links}",
                "footer": {"text": "{documents.documents.9.url}{feed_entry.missing.path}"},
                "color": 5814783
            }]
        })
    }

    fn notifier(targets: Vec<WebhookTarget>, forms: &[String]) -> WebhookNotifier {
        WebhookNotifier::new(reqwest::Client::new(), template(), targets, forms).unwrap()
    }

    fn target(url: String, thread: Option<&str>) -> WebhookTarget {
        WebhookTarget {
            url,
            thread_id: thread.map(str::to_string),
        }
    }

    #[test]
    fn test_render_resolves_placeholders() {
        let rendered = notifier(vec![target("http://hook".into(), None)], &[])
            .render(&sample_record())
            .unwrap();

        assert_eq!(rendered["content"], "New 8-K from Acme Corp");
        let embed = &rendered["embeds"][0];
        assert_eq!(embed["title"], "Acme Corp (ACME)");
        assert_eq!(embed["url"], "https://www.sec.gov/form8k.htm");
        assert_eq!(embed["footer"]["text"], "");
        assert_eq!(embed["color"], 5814783);
        assert_eq!(
            embed["description"],
            "[SEC EDGAR](https://www.sec.gov/form8k.htm) | \
             [Twitter](https://x.com/search?q=ACME&src=typed_query) | \
             [Stocktwits](https://stocktwits.com/symbol/ACME)"
        );
    }

    #[test]
    fn test_links_without_ticker() {
        assert_eq!(
            build_links(None, Some("  ")),
            "[SEC EDGAR](https://www.sec.gov/edgar/browse/)"
        );
        assert!(build_links(Some("u"), Some("BRK B")).contains("q=BRK+B"));
    }

    #[test]
    fn test_form_filter() {
        let hook = notifier(
            vec![target("http://hook".into(), None)],
            &["8-k".to_string(), "SC 13D".to_string()],
        );
        assert!(hook.accepts("8-K"));
        assert!(hook.accepts("sc 13d"));
        assert!(!hook.accepts("4"));
    }

    #[test]
    fn test_requires_targets() {
        assert!(WebhookNotifier::new(reqwest::Client::new(), template(), vec![], &[]).is_err());
    }

    #[tokio::test]
    async fn posts_to_every_target_with_wait_and_thread() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/a"))
            .and(query_param("wait", "true"))
            .and(query_param("thread_id", "42"))
            .and(body_partial_json(json!({"content": "New 8-K from Acme Corp"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/hooks/b"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let hook = notifier(
            vec![
                target(format!("{}/hooks/a", server.uri()), Some("42")),
                target(format!("{}/hooks/b", server.uri()), None),
            ],
            &[],
        );
        // One target accepting is enough.
        hook.notify(&sample_record()).await.unwrap();
    }

    #[tokio::test]
    async fn filtered_form_is_not_posted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let hook = notifier(
            vec![target(format!("{}/hooks/a", server.uri()), None)],
            &["10-K".to_string()],
        );
        hook.notify(&sample_record()).await.unwrap();
    }
}
