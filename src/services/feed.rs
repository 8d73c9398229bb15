// src/services/feed.rs

//! Latest-filings feed poller.
//!
//! Fetches the Atom feed through the conditional fetcher, maps each row onto
//! a strict [`FeedEntry`], collapses role-tagged duplicates to one canonical
//! entry per accession, and returns the batch oldest first.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use chrono::DateTime;
use regex::Regex;
use scraper::Html;
use serde::Deserialize;

use crate::error::{AppError, ErrorKind, Result};
use crate::models::{Accession, FeedEntry, FeedSummary, FilerRole};
use crate::services::fetcher::{ConditionalFetcher, FetchMode, FetchOutcome};
use crate::services::tickers::TickerDirectory;
use crate::utils::resolve;

const ATOM_ACCEPT: &str = "application/atom+xml,application/xml";

static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)Filed:\s*(?P<filed>\d{4}-\d{2}-\d{2}).*?AccNo:\s*(?P<acc>\d{10}-\d{2}-\d{6}).*?Size:\s*(?P<size>[\w\s]+)",
    )
    .expect("valid summary regex")
});

static PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]+)\)").expect("valid paren regex"));

// --- Atom wire structures ---

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    #[serde(default)]
    summary: Option<AtomText>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
    #[serde(rename = "@href", default)]
    href: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term", default)]
    term: Option<String>,
}

/// Result of parsing one feed document.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    /// Valid rows in feed order (newest first)
    pub entries: Vec<FeedEntry>,
    /// Rows dropped for missing mandatory fields
    pub rejected: usize,
}

/// Pieces of `"{FORM} - {Company} ({CIK}) ({Role})"`.
#[derive(Debug, Default, PartialEq, Eq)]
struct TitleParts {
    form: Option<String>,
    company: Option<String>,
    cik: Option<String>,
    role: Option<FilerRole>,
}

fn split_title(title: &str) -> TitleParts {
    let (form, subject) = match title.split_once(" - ") {
        Some((form, subject)) => (Some(form.trim().to_string()), subject.trim()),
        None => (None, title.trim()),
    };

    let groups: Vec<(usize, &str)> = PAREN_RE
        .captures_iter(subject)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let inner = caps.get(1)?;
            Some((whole.start(), inner.as_str().trim()))
        })
        .collect();

    let cik_index = groups
        .iter()
        .rposition(|(_, inner)| !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()));

    let (company_end, cik, role) = match cik_index {
        Some(i) => (
            groups[i].0,
            Some(groups[i].1.to_string()),
            groups.get(i + 1).map(|(_, r)| FilerRole::from(*r)),
        ),
        None => (subject.find('(').unwrap_or(subject.len()), None, None),
    };

    let company = subject[..company_end].trim();
    TitleParts {
        form: form.filter(|f| !f.is_empty()),
        company: (!company.is_empty()).then(|| company.to_string()),
        cik,
        role,
    }
}

fn summary_fields(summary_html: &str) -> (FeedSummary, Option<Accession>) {
    if summary_html.trim().is_empty() {
        return (FeedSummary::default(), None);
    }
    let fragment = Html::parse_fragment(summary_html);
    let text = fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut summary = FeedSummary {
        text: (!text.is_empty()).then(|| text.clone()),
        ..FeedSummary::default()
    };
    let mut accession = None;
    if let Some(caps) = SUMMARY_RE.captures(&text) {
        summary.filed = caps.name("filed").map(|m| m.as_str().to_string());
        summary.size = caps.name("size").map(|m| m.as_str().trim().to_string());
        accession = caps.name("acc").and_then(|m| m.as_str().parse().ok());
    }
    (summary, accession)
}

fn map_entry(raw: AtomEntry, base_url: &str) -> std::result::Result<FeedEntry, String> {
    let title = raw.title.map(|t| t.value.trim().to_string()).unwrap_or_default();
    let parts = split_title(&title);

    let (summary, summary_accession) =
        summary_fields(raw.summary.as_ref().map_or("", |s| s.value.as_str()));

    let link = raw
        .links
        .iter()
        .find(|l| l.rel.as_deref().unwrap_or("alternate") == "alternate")
        .or_else(|| raw.links.first())
        .and_then(|l| l.href.as_deref())
        .map(|href| resolve(base_url, href).unwrap_or_else(|| href.to_string()));

    let accession = summary_accession
        .or_else(|| {
            [link.as_deref(), raw.id.as_deref(), Some(title.as_str())]
                .into_iter()
                .flatten()
                .find_map(Accession::find_in)
        })
        .ok_or_else(|| format!("no accession number in '{title}'"))?;

    let form_type = raw
        .categories
        .iter()
        .find_map(|c| c.term.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or(parts.form)
        .ok_or_else(|| format!("{accession}: no form type"))?;

    let company = parts
        .company
        .ok_or_else(|| format!("{accession}: no entity name"))?;
    let cik = parts.cik.ok_or_else(|| format!("{accession}: no CIK"))?;
    let filing_url = link.ok_or_else(|| format!("{accession}: no filing link"))?;

    let updated = raw.updated.as_deref().map(str::trim).unwrap_or_default();
    let published = DateTime::parse_from_rfc3339(updated)
        .map_err(|e| format!("{accession}: bad updated timestamp '{updated}': {e}"))?;

    Ok(FeedEntry {
        accession,
        company,
        cik,
        role: parts.role,
        ticker: None,
        form_type,
        title,
        summary,
        published,
        filing_url,
    })
}

/// Parse an Atom feed body into validated rows.
pub fn parse_feed(xml: &str, base_url: &str) -> Result<ParsedFeed> {
    let feed: AtomFeed =
        quick_xml::de::from_str(xml).map_err(|e| AppError::parse("latest filings feed", e))?;

    let mut parsed = ParsedFeed::default();
    for raw in feed.entries {
        match map_entry(raw, base_url) {
            Ok(entry) => parsed.entries.push(entry),
            Err(reason) => {
                parsed.rejected += 1;
                log::warn!("Rejected feed row: {}", reason);
            }
        }
    }
    Ok(parsed)
}

/// Collapse rows sharing an accession and reverse into oldest-first order.
///
/// Within a group the lowest [`FilerRole::priority`] wins and ties keep the
/// earliest row, so a "Subject" row beats a "Filed by" row.
pub fn canonicalize(rows: Vec<FeedEntry>) -> Vec<FeedEntry> {
    let mut order: Vec<Accession> = Vec::new();
    let mut groups: HashMap<Accession, Vec<FeedEntry>> = HashMap::new();
    for row in rows {
        let group = groups.entry(row.accession.clone()).or_default();
        if group.is_empty() {
            order.push(row.accession.clone());
        }
        group.push(row);
    }

    let mut canonical: Vec<FeedEntry> = order
        .into_iter()
        .filter_map(|accession| {
            let group = groups.remove(&accession)?;
            if group.len() > 1 {
                report_collision(&accession, &group);
            }
            group.into_iter().min_by_key(FeedEntry::priority)
        })
        .collect();

    canonical.reverse();
    canonical
}

/// Roles of a group that is not the usual Subject / Filed by pair.
fn unexpected_roles(group: &[FeedEntry]) -> Option<Vec<String>> {
    let expected_pair = group.len() == 2
        && group.iter().any(|e| e.role == Some(FilerRole::Subject))
        && group.iter().any(|e| e.role == Some(FilerRole::FiledBy));
    if expected_pair {
        return None;
    }
    Some(
        group
            .iter()
            .map(|e| e.role.as_ref().map_or("none".to_string(), |r| r.to_string()))
            .collect(),
    )
}

fn report_collision(accession: &Accession, group: &[FeedEntry]) {
    if let Some(roles) = unexpected_roles(group) {
        log::warn!(
            "Role collision for {}: {} rows [{}]; keeping highest-priority role",
            accession,
            group.len(),
            roles.join(", ")
        );
    }
}

/// Polls the latest-filings feed.
pub struct FeedPoller {
    fetcher: Arc<ConditionalFetcher>,
    feed_url: String,
    base_url: String,
    tickers: Option<TickerDirectory>,
    revalidate_every: Option<Duration>,
    last_revalidated: Option<Instant>,
    force_revalidate: bool,
    ticker_error: Option<AppError>,
}

impl FeedPoller {
    pub fn new(
        fetcher: Arc<ConditionalFetcher>,
        feed_url: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            feed_url: feed_url.into(),
            base_url: base_url.into(),
            tickers: None,
            revalidate_every: None,
            last_revalidated: None,
            force_revalidate: false,
            ticker_error: None,
        }
    }

    pub fn with_tickers(mut self, tickers: TickerDirectory) -> Self {
        self.tickers = Some(tickers);
        self
    }

    /// Periodically ignore cache validators. A zero interval disables it.
    pub fn with_revalidation(mut self, every: Duration) -> Self {
        self.revalidate_every = (!every.is_zero()).then_some(every);
        self
    }

    pub fn feed_url(&self) -> &str {
        &self.feed_url
    }

    /// Fetch the next poll without cache validators.
    ///
    /// Used after a cycle left entries uncommitted, so an unchanged feed
    /// still hands them back.
    pub fn force_revalidate(&mut self) {
        self.force_revalidate = true;
    }

    /// Upstream failure from the last ticker refresh, if any.
    pub fn take_ticker_error(&mut self) -> Option<AppError> {
        self.ticker_error.take()
    }

    fn fetch_mode(&self) -> FetchMode {
        if self.force_revalidate {
            return FetchMode::Revalidate;
        }
        match (self.revalidate_every, self.last_revalidated) {
            (Some(_), None) => FetchMode::Revalidate,
            (Some(every), Some(at)) if at.elapsed() >= every => FetchMode::Revalidate,
            _ => FetchMode::IfChanged,
        }
    }

    /// Fetch the feed and return canonical entries, oldest first.
    ///
    /// Returns an empty batch without parsing when upstream reports no change.
    pub async fn poll(&mut self) -> Result<Vec<FeedEntry>> {
        let mode = self.fetch_mode();
        let body = match self
            .fetcher
            .fetch_with_accept(&self.feed_url, mode, Some(ATOM_ACCEPT))
            .await?
        {
            FetchOutcome::NotModified => {
                log::debug!("Feed not modified");
                return Ok(Vec::new());
            }
            FetchOutcome::Fresh { body, .. } => body,
        };
        if mode == FetchMode::Revalidate {
            self.last_revalidated = Some(Instant::now());
            self.force_revalidate = false;
        }

        if let Some(tickers) = self.tickers.as_mut() {
            if let Err(e) = tickers.refresh_if_stale(&self.fetcher).await {
                match e.kind() {
                    Some(ErrorKind::Blocked) => {
                        log::error!("Ticker dataset refresh blocked: {}", e)
                    }
                    _ if tickers.is_empty() => log::warn!("Unable to load ticker dataset: {}", e),
                    _ => log::debug!("Skipping ticker dataset refresh: {}", e),
                }
                if e.kind().is_some_and(ErrorKind::escalates_backoff) {
                    self.ticker_error = Some(e);
                }
            }
        }

        let parsed = parse_feed(&body, &self.base_url)?;
        log::debug!(
            "Fetched {} feed rows ({} rejected)",
            parsed.entries.len(),
            parsed.rejected
        );

        let mut entries = canonicalize(parsed.entries);
        for entry in &mut entries {
            entry.ticker = self.tickers.as_ref().and_then(|t| t.lookup(&entry.cik));
        }
        Ok(entries)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// One Atom `<entry>` in the shape the latest-filings feed publishes.
    pub fn atom_entry(form: &str, company: &str, cik: &str, role: &str, acc: &str, updated: &str) -> String {
        let no_dash = acc.replace('-', "");
        format!(
            r#"<entry>
<title>{form} - {company} ({cik}) ({role})</title>
<link rel="alternate" type="text/html" href="/Archives/edgar/data/{cik}/{no_dash}/{acc}-index.htm"/>
<summary type="html"> &lt;b&gt;Filed:&lt;/b&gt; 2026-10-14 &lt;b&gt;AccNo:&lt;/b&gt; {acc} &lt;b&gt;Size:&lt;/b&gt; 1 MB</summary>
<updated>{updated}</updated>
<category scheme="https://www.sec.gov/" label="form type" term="{form}"/>
<id>urn:tag:sec.gov,2008:accession-number={acc}</id>
</entry>"#
        )
    }

    pub fn atom_feed(entries: &[String]) -> String {
        format!(
            r#"<?xml version="1.0" encoding="ISO-8859-1" ?>
<feed xmlns="http://www.w3.org/2005/Atom">
<title>Latest Filings - Wed, 14 Oct 2026 16:10:00 EDT</title>
<link rel="alternate" href="/cgi-bin/browse-edgar?action=getcurrent"/>
<link rel="self" href="/cgi-bin/browse-edgar?action=getcurrent"/>
<id>https://www.sec.gov/cgi-bin/browse-edgar?action=getcurrent</id>
<author><name>Webmaster</name><email>webmaster@sec.gov</email></author>
<updated>2026-10-14T16:10:00-04:00</updated>
{}
</feed>"#,
            entries.join("\n")
        )
    }
}
