//! Lock-free counters describing what the poller is doing.
//!
//! Written only by the poller task, read by HTTP handlers. Individual
//! counters are independently consistent; cross-field atomicity is only
//! guaranteed for the [`Snapshot`](opcbridge_core::snapshot::Snapshot).

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Lifecycle state of the upstream link as seen by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LinkState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl LinkState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LinkState::Connecting,
            2 => LinkState::Connected,
            _ => LinkState::Disconnected,
        }
    }
}

#[derive(Debug, Default)]
pub struct PollerMetrics {
    state: AtomicU8,
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    reads_good: AtomicU64,
    reads_degraded: AtomicU64,
    read_failures: AtomicU64,
    retry_attempt: AtomicU32,
    retry_delay_ms: AtomicU64,
    poll_interval_ms: AtomicU64,
}

/// Serializable copy of [`PollerMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub link_state: LinkState,
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub reads_good: u64,
    pub reads_degraded: u64,
    pub read_failures: u64,
    pub retry_attempt: u32,
    pub retry_delay_ms: u64,
    pub poll_interval_ms: u64,
}

impl PollerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link_state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_link_state(&self, state: LinkState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn connect_attempted(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connect_failed(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn read_good(&self) {
        self.reads_good.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn read_degraded(&self) {
        self.reads_degraded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn read_failed(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_retry(&self, attempt: u32, delay: Duration) {
        self.retry_attempt.store(attempt, Ordering::Relaxed);
        self.retry_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn clear_retry(&self) {
        self.set_retry(0, Duration::ZERO);
    }

    pub(crate) fn set_poll_interval(&self, interval: Duration) {
        self.poll_interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            link_state: self.link_state(),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            reads_good: self.reads_good.load(Ordering::Relaxed),
            reads_degraded: self.reads_degraded.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            retry_attempt: self.retry_attempt.load(Ordering::Relaxed),
            retry_delay_ms: self.retry_delay_ms.load(Ordering::Relaxed),
            poll_interval_ms: self.poll_interval_ms.load(Ordering::Relaxed),
        }
    }
}
