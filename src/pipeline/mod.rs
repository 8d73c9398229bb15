// src/pipeline/mod.rs

//! Pipeline components for the watch loop.
//!
//! - `rate_limit`: global pacing for every upstream request
//! - `backoff`: poll delay escalation after upstream failures
//! - `watch`: the poll / resolve / deliver / commit loop

pub mod backoff;
pub mod rate_limit;
pub mod watch;

pub use backoff::{BackoffConfig, BackoffController, BackoffState, BackoffTransition};
pub use rate_limit::{Clock, RateLimiter, TokioClock};
pub use watch::{CycleReport, RunSummary, WatchOptions, Watcher};
