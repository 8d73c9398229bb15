// src/pipeline/watch.rs

//! Watch loop: poll the feed, resolve each new accession, deliver it, then
//! commit it to the ledger.
//!
//! Cycles run strictly one after another. Within a cycle entries are handled
//! oldest first, and an accession is committed only after the sink accepted
//! its record. Cancellation is checked between entries and during sleeps, so
//! an in-flight deliver/commit pair always completes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{AppError, ErrorKind, Result};
use crate::models::{Config, FeedEntry, FilingRecord};
use crate::output::FilingSink;
use crate::pipeline::{BackoffConfig, BackoffController, RateLimiter};
use crate::services::{ConditionalFetcher, DocumentResolver, FeedPoller, TickerDirectory};
use crate::storage::Ledger;

/// Per-run knobs that are not owned by a collaborator.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Pause between two resolved filings in one cycle
    pub document_delay: Duration,
    /// Attach per-document ndjson lines to each record
    pub include_ndjson: bool,
    /// Stop after this many emitted filings
    pub max_results: Option<usize>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            document_delay: Duration::from_millis(600),
            include_ndjson: true,
            max_results: None,
        }
    }
}

impl WatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            document_delay: config.poller.document_delay(),
            include_ndjson: config.output.ndjson,
            max_results: config.poller.max_results,
        }
    }
}

/// What one poll cycle did.
#[derive(Debug, Default, Clone)]
pub struct CycleReport {
    /// Canonical entries returned by the poller
    pub fetched: usize,
    /// Entries already in the ledger
    pub skipped: usize,
    /// Records delivered and committed
    pub emitted: usize,
    /// Entries left uncommitted after a failure
    pub failed: usize,
    /// The poll itself failed
    pub poll_failed: bool,
    /// Upstream failure fed to the backoff controller, with its retry hint
    pub escalation: Option<(ErrorKind, Option<Duration>)>,
    /// Stopped early by cancellation or the result limit
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl CycleReport {
    /// Keep the first escalating kind and the largest retry hint.
    fn note_failure(&mut self, error: &AppError) {
        let Some(kind) = error.kind().filter(|k| k.escalates_backoff()) else {
            return;
        };
        let hint = error.retry_after();
        self.escalation = Some(match self.escalation.take() {
            None => (kind, hint),
            Some((first, previous)) => (first, previous.max(hint)),
        });
    }
}

/// Totals for a whole run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub emitted: usize,
    pub cancelled: bool,
}

/// Per-entry result inside a cycle.
enum EntryOutcome {
    Emitted,
    Failed,
}

/// The poll loop tying feed, resolver, sink and ledger together.
pub struct Watcher {
    poller: FeedPoller,
    resolver: DocumentResolver,
    ledger: Arc<dyn Ledger>,
    sink: Arc<dyn FilingSink>,
    backoff: BackoffController,
    options: WatchOptions,
    emitted_total: usize,
}

impl Watcher {
    pub fn new(
        poller: FeedPoller,
        resolver: DocumentResolver,
        ledger: Arc<dyn Ledger>,
        sink: Arc<dyn FilingSink>,
        backoff: BackoffController,
        options: WatchOptions,
    ) -> Self {
        Self {
            poller,
            resolver,
            ledger,
            sink,
            backoff,
            options,
            emitted_total: 0,
        }
    }

    /// Wire up the shared limiter, fetcher, poller and resolver from configuration.
    pub fn from_config(
        config: &Config,
        ledger: Arc<dyn Ledger>,
        sink: Arc<dyn FilingSink>,
    ) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(config.sec.min_request_interval()));
        let fetcher = Arc::new(ConditionalFetcher::new(&config.sec, limiter)?);

        let mut poller = FeedPoller::new(fetcher.clone(), config.feed_url(), &config.sec.base_url)
            .with_revalidation(config.poller.revalidate_interval());
        if config.tickers.enabled {
            poller = poller.with_tickers(TickerDirectory::new(
                config.tickers_url(),
                Duration::from_secs(config.tickers.refresh_secs),
            ));
        }
        let resolver = DocumentResolver::new(fetcher, &config.sec.base_url);
        let backoff = BackoffController::with_config(BackoffConfig::from_settings(
            &config.poller,
            &config.backoff,
        ));

        Ok(Self::new(
            poller,
            resolver,
            ledger,
            sink,
            backoff,
            WatchOptions::from_config(config),
        ))
    }

    pub fn backoff(&self) -> &BackoffController {
        &self.backoff
    }

    fn limit_reached(&self) -> bool {
        self.options
            .max_results
            .is_some_and(|max| self.emitted_total >= max)
    }

    /// Run one poll cycle. Only ledger failures are returned as errors.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> Result<CycleReport> {
        let started = Instant::now();
        let mut report = CycleReport::default();

        let entries = match self.poller.poll().await {
            Ok(entries) => entries,
            Err(e) => {
                report_error(None, &e);
                report.poll_failed = true;
                report.note_failure(&e);
                Vec::new()
            }
        };
        if let Some(e) = self.poller.take_ticker_error() {
            report.note_failure(&e);
        }
        report.fetched = entries.len();

        let mut resolved_any = false;
        for entry in entries {
            if cancel.is_cancelled() || self.limit_reached() {
                report.interrupted = true;
                break;
            }
            if self.ledger.contains(&entry.accession).await? {
                report.skipped += 1;
                continue;
            }

            if resolved_any && !self.options.document_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        report.interrupted = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.options.document_delay) => {}
                }
            }
            resolved_any = true;

            match self.process_entry(entry, &mut report).await? {
                EntryOutcome::Emitted => report.emitted += 1,
                EntryOutcome::Failed => report.failed += 1,
            }
        }

        if report.failed > 0 || report.interrupted {
            // Uncommitted entries must come back even if the feed is unchanged.
            self.poller.force_revalidate();
        }

        match report.escalation {
            Some((kind, retry_after)) => {
                self.backoff.record_failure(kind, retry_after);
            }
            None => {
                self.backoff.record_success();
            }
        }

        report.elapsed = started.elapsed();
        log::debug!(
            "Cycle: {} fetched, {} seen, {} emitted, {} failed in {:?}",
            report.fetched,
            report.skipped,
            report.emitted,
            report.failed,
            report.elapsed
        );
        Ok(report)
    }

    /// Resolve, deliver and commit one new accession.
    async fn process_entry(
        &mut self,
        entry: FeedEntry,
        report: &mut CycleReport,
    ) -> Result<EntryOutcome> {
        let accession = entry.accession.clone();

        let documents = match self.resolver.resolve(&entry).await {
            Ok(documents) => documents,
            Err(e) => {
                report_error(Some(&entry), &e);
                report.note_failure(&e);
                return Ok(EntryOutcome::Failed);
            }
        };

        let record = match FilingRecord::new(entry, documents, self.options.include_ndjson) {
            Ok(record) => record,
            Err(e) => {
                log::error!("{}: unable to assemble record: {}", accession, e);
                return Ok(EntryOutcome::Failed);
            }
        };

        if let Err(e) = self.sink.deliver(&record).await {
            log::warn!("{}: delivery failed, will retry next cycle: {}", accession, e);
            return Ok(EntryOutcome::Failed);
        }

        self.ledger.commit(&accession).await?;
        self.emitted_total += 1;
        log::info!(
            "Emitted {} {} ({})",
            record.feed_entry.form_type,
            accession,
            record.feed_entry.company
        );
        Ok(EntryOutcome::Emitted)
    }

    /// Loop until cancelled, the result limit is reached, or the ledger fails.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        log::info!("Watching {}", self.poller.feed_url());

        while !cancel.is_cancelled() {
            let report = self.run_cycle(cancel).await?;
            summary.cycles += 1;
            summary.emitted += report.emitted;

            if self.limit_reached() {
                log::info!("Reached result limit after {} filings", self.emitted_total);
                break;
            }
            if cancel.is_cancelled() {
                break;
            }

            let wait = self.backoff.delay().saturating_sub(report.elapsed);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        summary.cancelled = cancel.is_cancelled();
        if summary.cancelled {
            log::info!("Stopping after {} cycles", summary.cycles);
        }
        Ok(summary)
    }
}

fn report_error(entry: Option<&FeedEntry>, error: &AppError) {
    let subject = entry.map_or_else(|| "feed".to_string(), |e| e.accession.to_string());
    let kind = error.kind().map_or("ERROR", ErrorKind::as_str);
    match error.status() {
        Some(status) if error.kind() == Some(ErrorKind::Blocked) => {
            log::error!("{}: {} (HTTP {}): {}", subject, kind, status, error)
        }
        None if error.kind() == Some(ErrorKind::Blocked) => {
            log::error!("{}: {}: {}", subject, kind, error)
        }
        Some(status) => log::warn!("{}: {} (HTTP {}): {}", subject, kind, status, error),
        None => log::warn!("{}: {}: {}", subject, kind, error),
    }
}
