// src/lib.rs

//! SEC latest-filings watcher library.
//!
//! Polls the EDGAR latest-filings feed, resolves each new accession's index
//! page into its document set, and emits every filing exactly once, guarded
//! by a persistent dedup ledger.

pub mod error;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

pub use error::{AppError, ErrorKind, Result};
