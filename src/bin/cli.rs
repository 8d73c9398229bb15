// src/bin/cli.rs

//! filingwatch CLI
//!
//! Local execution entry point for the SEC latest-filings watcher.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use filingwatch::{
    error::{AppError, Result},
    models::Config,
    output::{FilingSink, JsonSink, NotifyingSink},
    pipeline::{RateLimiter, Watcher},
    services::{ConditionalFetcher, DocumentResolver},
    storage::{FileLedger, Ledger},
};
use tokio_util::sync::CancellationToken;

/// filingwatch - SEC latest-filings watcher
#[derive(Parser, Debug)]
#[command(
    name = "filingwatch",
    version,
    about = "Emit each new SEC filing exactly once"
)]

struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "data/config.toml", global = true)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Identification header sent to the SEC (name and contact email)
    #[arg(short, long, env = "SEC_USER_AGENT", global = true)]
    user_agent: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the feed and emit new filings until interrupted
    Watch(WatchArgs),

    /// Resolve filing index pages and print their document sets
    Resolve {
        /// Index URLs ending in `{accession}-index.htm`
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Validate configuration
    Validate,

    /// Show ledger location and size
    Info,
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Feed polling interval in seconds
    #[arg(long)]
    poll: Option<u64>,

    /// Seconds between unconditional feed refetches (0 disables)
    #[arg(long)]
    validate: Option<u64>,

    /// Entries requested from the feed per poll
    #[arg(long)]
    count: Option<u32>,

    /// Delay between filing downloads in seconds
    #[arg(long)]
    doc_delay: Option<f64>,

    /// Emit compact JSON (one line per filing)
    #[arg(long)]
    compact: bool,

    /// Value for the feed's `owner` query parameter
    #[arg(long)]
    owner: Option<String>,

    /// Override the feed URL entirely
    #[arg(long)]
    feed_url: Option<String>,

    /// Ledger file path
    #[arg(long)]
    ledger: Option<PathBuf>,

    /// Emit at most this many filings, then exit
    #[arg(long)]
    max_results: Option<usize>,

    /// Forward each filing to the configured webhooks
    #[arg(long)]
    notify: bool,
}

impl WatchArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(poll) = self.poll {
            config.poller.poll_interval_secs = poll;
        }
        if let Some(validate) = self.validate {
            config.poller.revalidate_secs = validate;
        }
        if let Some(count) = self.count {
            config.sec.feed_count = count;
        }
        if let Some(delay) = self.doc_delay {
            config.poller.document_delay_ms = (delay.max(0.0) * 1000.0).round() as u64;
        }
        if self.compact {
            config.output.compact = true;
        }
        if let Some(owner) = &self.owner {
            config.sec.owner = owner.clone();
        }
        if let Some(feed_url) = &self.feed_url {
            config.sec.feed_url = Some(feed_url.clone());
        }
        if let Some(ledger) = &self.ledger {
            config.ledger.path = ledger.clone();
        }
        if self.max_results.is_some() {
            config.poller.max_results = self.max_results;
        }
        if self.notify {
            config.notify.enabled = true;
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load(&cli.config);
    let level = match (&loaded, cli.verbose) {
        (_, true) => "debug".to_string(),
        (Ok(config), false) => config.logging.level.clone(),
        (Err(_), false) => "info".to_string(),
    };
    init_logging(&level);

    let mut config = match loaded {
        Ok(config) => {
            log::info!("Loaded configuration from {}", cli.config.display());
            config
        }
        Err(e) if matches!(cli.command, Command::Validate) => {
            log::error!("Config load failed from {}: {}", cli.config.display(), e);
            return Err(e);
        }
        Err(e) => {
            log::warn!(
                "Config load failed from {}: {}. Using defaults.",
                cli.config.display(),
                e
            );
            Config::default()
        }
    };
    if let Some(user_agent) = &cli.user_agent {
        config.sec.user_agent = user_agent.trim().to_string();
    }

    match cli.command {
        Command::Watch(args) => {
            args.apply(&mut config);
            config.validate()?;
            watch(config).await?;
        }

        Command::Resolve { urls } => {
            resolve(&config, &urls).await?;
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
            log::info!("Feed: {}", config.feed_url());
        }

        Command::Info => {
            let path = &config.ledger.path;
            log::info!("Ledger: {}", path.display());
            if path.exists() {
                let ledger = FileLedger::open(path).await?;
                log::info!("Committed accessions: {}", ledger.count().await);
            } else {
                log::info!("No ledger file yet.");
            }
            log::info!("Feed: {}", config.feed_url());
        }
    }

    Ok(())
}

async fn watch(config: Config) -> Result<()> {
    let ledger: Arc<dyn Ledger> = Arc::new(FileLedger::open(&config.ledger.path).await?);
    let sink = build_sink(&config).await?;
    let mut watcher = Watcher::from_config(&config, ledger, sink)?;

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received, finishing current filing...");
            signal.cancel();
        }
    });

    let summary = watcher.run(&cancel).await?;
    log::info!(
        "Done: {} filings emitted over {} cycles",
        summary.emitted,
        summary.cycles
    );
    Ok(())
}

async fn build_sink(config: &Config) -> Result<Arc<dyn FilingSink>> {
    let primary: Arc<dyn FilingSink> = Arc::new(JsonSink::stdout(config.output.compact));
    if !config.notify.enabled {
        return Ok(primary);
    }

    #[cfg(feature = "notify")]
    {
        let client = filingwatch::utils::http::create_async_client(&config.sec)?;
        let notifier =
            filingwatch::output::WebhookNotifier::from_config(&config.notify, client).await?;
        log::info!(
            "Forwarding filings to {} webhook(s)",
            config.notify.targets.len()
        );
        Ok(Arc::new(
            NotifyingSink::new(primary).with_notifier(Arc::new(notifier)),
        ))
    }

    #[cfg(not(feature = "notify"))]
    {
        log::warn!("Webhook forwarding requested but the `notify` feature is disabled");
        Ok(Arc::new(NotifyingSink::new(primary)))
    }
}

async fn resolve(config: &Config, urls: &[String]) -> Result<()> {
    filingwatch::utils::http::validate_user_agent(&config.sec.user_agent)
        .map_err(AppError::validation)?;

    let limiter = Arc::new(RateLimiter::new(config.sec.min_request_interval()));
    let fetcher = Arc::new(ConditionalFetcher::new(&config.sec, limiter)?);
    let resolver = DocumentResolver::new(fetcher, &config.sec.base_url);
    let delay = config.poller.document_delay();

    let mut payloads = Vec::with_capacity(urls.len());
    for (i, url) in urls.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        payloads.push(resolver.resolve_index_url(url).await?);
    }

    println!("{}", serde_json::to_string_pretty(&payloads)?);
    eprintln!("\n# NDJSON (one line per document):");
    for payload in &payloads {
        for line in payload.to_ndjson()? {
            eprintln!("{line}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_flags_override_config() {
        let cli = Cli::parse_from([
            "filingwatch",
            "watch",
            "--poll",
            "15",
            "--doc-delay",
            "0.25",
            "--count",
            "100",
            "--compact",
            "--max-results",
            "3",
        ]);
        let Command::Watch(args) = cli.command else {
            panic!("expected watch");
        };
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.poller.poll_interval_secs, 15);
        assert_eq!(config.poller.document_delay_ms, 250);
        assert_eq!(config.sec.feed_count, 100);
        assert!(config.output.compact);
        assert_eq!(config.poller.max_results, Some(3));
        assert!(!config.notify.enabled);
    }

    #[test]
    fn resolve_requires_urls() {
        assert!(Cli::try_parse_from(["filingwatch", "resolve"]).is_err());
    }
}
