//! Upstream side of the bridge.
//!
//! Provides the [`ProtocolClient`](client::ProtocolClient) abstraction over
//! an industrial-protocol server, an HTTP gateway implementation of it,
//! the exponential backoff schedule, the [`Poller`](poller::Poller) state
//! machine that keeps the shared snapshot fresh, and the
//! [`BridgeManager`](manager::BridgeManager) that owns the poller task.

pub mod client;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod gateway;
pub mod manager;
pub mod metrics;
pub mod poller;
pub mod reconnect;

pub use client::{ClientError, DataValue, NodeId, ProtocolClient, StatusCode};
pub use gateway::GatewayClient;
pub use manager::BridgeManager;
pub use metrics::{LinkState, MetricsSnapshot, PollerMetrics};
pub use poller::{Poller, PollerConfig, PollerExit};
pub use reconnect::{Backoff, ReconnectConfig};
