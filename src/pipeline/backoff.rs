// src/pipeline/backoff.rs

//! Backoff controller for upstream failures.
//!
//! Two observable states: `Normal` polls at the baseline interval,
//! `Cooldown` polls at an escalated delay that never decreases while
//! failures keep coming and never exceeds the configured ceiling.
//! Any fully successful cycle returns to `Normal`.

use std::time::Duration;

use crate::error::ErrorKind;
use crate::models::{BackoffSettings, PollerConfig};

/// Backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay between polls while healthy
    pub baseline: Duration,
    /// Minimum delay after a blocked response
    pub blocked_cooldown: Duration,
    /// Growth factor per consecutive failure
    pub multiplier: f64,
    /// Upper bound for any delay
    pub ceiling: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            baseline: Duration::from_secs(7),
            blocked_cooldown: Duration::from_secs(60),
            multiplier: 2.0,
            ceiling: Duration::from_secs(900),
        }
    }
}

impl BackoffConfig {
    pub fn from_settings(poller: &PollerConfig, settings: &BackoffSettings) -> Self {
        Self {
            baseline: poller.poll_interval(),
            blocked_cooldown: Duration::from_secs(settings.blocked_cooldown_secs),
            multiplier: settings.multiplier.max(1.0),
            ceiling: Duration::from_secs(settings.max_delay_secs),
        }
    }
}

/// Observable controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffState {
    Normal,
    Cooldown,
}

/// Diagnostic signal produced by every state change or escalation.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffTransition {
    /// Normal -> Cooldown
    Entered {
        kind: ErrorKind,
        delay: Duration,
    },
    /// Cooldown -> Cooldown with a new delay
    Escalated {
        kind: ErrorKind,
        consecutive_failures: u32,
        from: Duration,
        to: Duration,
    },
    /// Cooldown -> Normal
    Recovered { after_failures: u32 },
    /// Nothing changed
    Steady,
}

/// Tracks consecutive upstream failures and the resulting poll delay.
#[derive(Debug, Clone)]
pub struct BackoffController {
    config: BackoffConfig,
    consecutive_failures: u32,
    delay: Duration,
}

impl BackoffController {
    pub fn new() -> Self {
        Self::with_config(BackoffConfig::default())
    }

    pub fn with_config(config: BackoffConfig) -> Self {
        Self {
            delay: config.baseline,
            config,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> BackoffState {
        if self.consecutive_failures == 0 {
            BackoffState::Normal
        } else {
            BackoffState::Cooldown
        }
    }

    /// Delay to sleep before the next poll.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Compute the next delay without changing state.
    fn next_delay(&self, kind: ErrorKind, retry_after: Option<Duration>) -> Duration {
        // Overflow or a non-finite factor saturates at the ceiling.
        let grown = Duration::try_from_secs_f64(self.delay.as_secs_f64() * self.config.multiplier)
            .unwrap_or(self.config.ceiling);
        let floor = match kind {
            ErrorKind::Blocked => self.config.blocked_cooldown,
            _ => self.config.baseline,
        };
        grown
            .max(floor)
            .max(retry_after.unwrap_or_default())
            .max(self.delay)
            .min(self.config.ceiling)
    }

    /// Record an upstream failure. Parse failures are ignored.
    pub fn record_failure(
        &mut self,
        kind: ErrorKind,
        retry_after: Option<Duration>,
    ) -> BackoffTransition {
        if !kind.escalates_backoff() {
            return BackoffTransition::Steady;
        }

        let from = self.delay;
        let to = self.next_delay(kind, retry_after);
        let was_normal = self.state() == BackoffState::Normal;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.delay = to;

        let transition = if was_normal {
            BackoffTransition::Entered { kind, delay: to }
        } else {
            BackoffTransition::Escalated {
                kind,
                consecutive_failures: self.consecutive_failures,
                from,
                to,
            }
        };
        self.report(&transition);
        transition
    }

    /// Record a fully successful cycle.
    pub fn record_success(&mut self) -> BackoffTransition {
        if self.state() == BackoffState::Normal {
            return BackoffTransition::Steady;
        }
        let transition = BackoffTransition::Recovered {
            after_failures: self.consecutive_failures,
        };
        self.consecutive_failures = 0;
        self.delay = self.config.baseline;
        self.report(&transition);
        transition
    }

    fn report(&self, transition: &BackoffTransition) {
        match transition {
            BackoffTransition::Entered { kind, delay } => {
                log::warn!(
                    "Backoff: NORMAL -> COOLDOWN after {} (next poll in {:?})",
                    kind,
                    delay
                );
            }
            BackoffTransition::Escalated {
                kind,
                consecutive_failures,
                from,
                to,
            } => {
                log::warn!(
                    "Backoff: COOLDOWN escalated after {} ({} consecutive failures): {:?} -> {:?}",
                    kind,
                    consecutive_failures,
                    from,
                    to
                );
            }
            BackoffTransition::Recovered { after_failures } => {
                log::info!(
                    "Backoff: COOLDOWN -> NORMAL after {} failed cycles (next poll in {:?})",
                    after_failures,
                    self.config.baseline
                );
            }
            BackoffTransition::Steady => {}
        }
    }
}

impl Default for BackoffController {
    fn default() -> Self {
        Self::new()
    }
}
