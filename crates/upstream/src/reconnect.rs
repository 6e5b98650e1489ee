//! Exponential-backoff schedule for upstream reconnects.
//!
//! The poller keeps one [`Backoff`] for its lifetime. Every failed
//! attempt (connect, session or read I/O) calls
//! [`Backoff::record_failure`] to get the delay before the next attempt;
//! a successful connect calls [`Backoff::reset`].

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Consecutive failures tolerated before giving up. `0` = unlimited.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`ReconnectConfig::max_delay`] and never
/// smaller than `current`.
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier.max(1.0)) as u64;
    Duration::from_millis(next_ms).max(current).min(config.max_delay)
}

/// Retry counter plus the delay to apply after the next failure.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    attempt: u32,
    delay: Duration,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        let delay = config.initial_delay.min(config.max_delay);
        Self {
            config,
            attempt: 0,
            delay,
        }
    }

    /// Consecutive failures since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay the next failure will return.
    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    /// Count a failure and return how long to wait before retrying.
    pub fn record_failure(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let wait = self.delay;
        self.delay = next_delay(self.delay, &self.config);
        wait
    }

    /// Whether the retry budget is spent. Always `false` when unlimited.
    pub fn exhausted(&self) -> bool {
        self.config.max_attempts > 0 && self.attempt >= self.config.max_attempts
    }

    /// Back to the initial delay; called after every successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.delay = self.config.initial_delay.min(self.config.max_delay);
    }
}
