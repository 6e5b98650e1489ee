//! Request handlers for the bridge endpoints.
//!
//! Handlers only read the shared [`SnapshotCache`](opcbridge_core::snapshot::SnapshotCache)
//! and [`PollerMetrics`](opcbridge_upstream::PollerMetrics); they never
//! touch the upstream connection.

pub mod status;
pub mod value;
