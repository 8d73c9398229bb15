// src/services/mod.rs

//! Service layer for the filing watcher.
//!
//! This module contains the upstream-facing logic for:
//! - Conditional HTTP fetching (`ConditionalFetcher`)
//! - Latest-filings feed polling (`FeedPoller`)
//! - Filing index resolution (`DocumentResolver`)
//! - CIK to ticker lookup (`TickerDirectory`)

pub mod feed;
pub mod fetcher;
pub mod index;
pub mod tickers;

pub use feed::{FeedPoller, ParsedFeed, canonicalize, parse_feed};
pub use fetcher::{CacheValidators, ConditionalFetcher, FetchMode, FetchOutcome};
pub use index::{DocumentResolver, parse_index, render_hint_for_href};
pub use tickers::TickerDirectory;
