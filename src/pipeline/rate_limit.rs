// src/pipeline/rate_limit.rs

//! Global request pacing for the upstream host.
//!
//! Every outbound request, whether a feed poll, index page, or ticker
//! dataset, calls [`RateLimiter::acquire`] first. The limiter enforces a
//! minimum spacing between request *starts* and never fails.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Time source used by the limiter.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Minimum-interval gate shared by all call sites.
pub struct RateLimiter {
    min_interval: Duration,
    clock: Arc<dyn Clock>,
    /// Start of the previous permitted request. Held across the wait so
    /// callers are released one at a time in FIFO order.
    last_start: Mutex<Option<Instant>>,
    issued: AtomicU64,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self::with_clock(min_interval, Arc::new(TokioClock))
    }

    pub fn with_clock(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            clock,
            last_start: Mutex::new(None),
            issued: AtomicU64::new(0),
        }
    }

    /// Wait until a request may start, then record its start time.
    pub async fn acquire(&self) {
        let mut last = self.last_start.lock().await;
        if let Some(previous) = *last {
            let elapsed = self.clock.now().saturating_duration_since(previous);
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                log::debug!("Rate limiter: waiting {:?}", wait);
                self.clock.sleep(wait).await;
            }
        }
        *last = Some(self.clock.now());
        self.issued.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of permits handed out so far.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}


#[cfg(test)]
mod tests {
    use super::test_clock::ManualClock;
    use super::*;

    #[tokio::test]
    async fn first_request_is_not_delayed() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(Duration::from_millis(150), clock.clone());

        limiter.acquire().await;
        assert!(clock.sleeps().is_empty());
        assert_eq!(limiter.issued(), 1);
    }

    #[tokio::test]
    async fn back_to_back_requests_are_spaced() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(Duration::from_millis(150), clock.clone());

        limiter.acquire().await;
        clock.advance(Duration::from_millis(40));
        limiter.acquire().await;
        limiter.acquire().await;

        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(110), Duration::from_millis(150)]
        );
        assert_eq!(limiter.issued(), 3);
    }

    #[tokio::test]
    async fn idle_gap_longer_than_interval_needs_no_wait() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(Duration::from_millis(150), clock.clone());

        limiter.acquire().await;
        clock.advance(Duration::from_secs(2));
        limiter.acquire().await;

        assert!(clock.sleeps().is_empty());
    }
}
