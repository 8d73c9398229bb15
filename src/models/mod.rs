// src/models/mod.rs

//! Domain models for the filing watcher.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod accession;
mod config;
mod feed;
mod filing;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-export all public types
pub use accession::{Accession, normalize_cik};
pub use config::{
    BackoffSettings, Config, LedgerConfig, LoggingConfig, NotifyConfig, OutputConfig,
    PollerConfig, SecConfig, TickerConfig, WebhookTarget,
};
pub use feed::{FeedEntry, FeedSummary, FilerRole};
pub use filing::{CompleteSubmission, DocumentRow, FilingRecord, RenderHint, ResolvedFiling};
