//! Last-known upstream state shared between the poller and HTTP readers.
//!
//! [`SnapshotCache`] is written by exactly one task (the poller) and read
//! by any number of request handlers. Every write swaps in a complete
//! [`Snapshot`] record, so a reader sees either the old record or the new
//! one and never a mix of fields from both.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Externally visible health of the upstream link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// The last read succeeded with a good status code.
    Connected,
    /// The link is up but the last read carried a bad or uncertain status.
    Degraded,
    /// No usable session (never connected, connect failed, or link lost).
    Disconnected,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Connected => "connected",
            LinkStatus::Degraded => "degraded",
            LinkStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of what the bridge knows about the monitored value.
///
/// `value` is sticky: once a good read has populated it, later failures
/// only change `status` and `last_error`. Staleness is signalled through
/// `status` and `sampled_at`, never by clearing the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Last good sample, if any read has ever succeeded.
    pub value: Option<f64>,
    /// Outcome of the most recent poll cycle.
    pub status: LinkStatus,
    /// Cause of the most recent failure; cleared by the next good read.
    pub last_error: Option<String>,
    /// When `value` was sampled.
    pub sampled_at: Option<Timestamp>,
}

impl Snapshot {
    /// The state at process start: no value, disconnected, no error.
    pub fn empty() -> Self {
        Self {
            value: None,
            status: LinkStatus::Disconnected,
            last_error: None,
            sampled_at: None,
        }
    }

    /// Whether at least one good read has happened since start.
    pub fn has_data(&self) -> bool {
        self.value.is_some()
    }

    fn with_sample(&self, value: f64, at: Timestamp) -> Self {
        Self {
            value: Some(value),
            status: LinkStatus::Connected,
            last_error: None,
            sampled_at: Some(at),
        }
    }

    fn with_failure(&self, status: LinkStatus, error: String) -> Self {
        Self {
            value: self.value,
            status,
            last_error: Some(error),
            sampled_at: self.sampled_at,
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Single-writer, many-reader holder of the current [`Snapshot`].
///
/// Records are immutable once published; the lock only guards the swap of
/// an `Arc` pointer, so readers never wait behind network I/O and the
/// writer never waits behind a slow reader.
#[derive(Debug)]
pub struct SnapshotCache {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotCache {
    /// Create a cache holding [`Snapshot::empty`].
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::empty())),
        }
    }

    /// Shared handle to the current record.
    pub fn load(&self) -> Arc<Snapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Owned copy of the current record.
    pub fn read(&self) -> Snapshot {
        self.load().as_ref().clone()
    }

    /// Replace every field at once.
    pub fn write(&self, snapshot: Snapshot) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(snapshot);
    }

    /// Publish a good sample. Clears any previous error.
    ///
    /// Returns the status that was in effect before the write.
    pub fn record_sample(&self, value: f64, at: Timestamp) -> LinkStatus {
        self.update(|prev| prev.with_sample(value, at))
    }

    /// Mark the value degraded without touching it.
    pub fn record_degraded(&self, error: impl Into<String>) -> LinkStatus {
        let error = error.into();
        self.update(|prev| prev.with_failure(LinkStatus::Degraded, error))
    }

    /// Mark the link down without touching the value.
    pub fn record_disconnected(&self, error: impl Into<String>) -> LinkStatus {
        let error = error.into();
        self.update(|prev| prev.with_failure(LinkStatus::Disconnected, error))
    }

    fn update(&self, next: impl FnOnce(&Snapshot) -> Snapshot) -> LinkStatus {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let previous = guard.status;
        *guard = Arc::new(next(&guard));
        previous
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}
