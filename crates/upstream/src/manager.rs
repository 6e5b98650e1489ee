//! Lifecycle owner for the background poller.
//!
//! [`BridgeManager`] spawns the [`Poller`] task on startup and hands out
//! the shared [`SnapshotCache`] and [`PollerMetrics`] to request
//! handlers. [`BridgeManager::shutdown`] cancels the poller and waits for
//! it to release its upstream session.

use std::sync::Arc;
use std::time::Duration;

use opcbridge_core::snapshot::{Snapshot, SnapshotCache};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::ProtocolClient;
use crate::metrics::PollerMetrics;
use crate::poller::{Poller, PollerConfig, PollerExit};

/// Owns the poller task and the state it publishes.
///
/// Created once at application startup via [`BridgeManager::start`].
/// The returned `Arc` can be cheaply cloned into request handlers.
pub struct BridgeManager {
    cache: Arc<SnapshotCache>,
    metrics: Arc<PollerMetrics>,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<PollerExit>>>,
}

impl BridgeManager {
    /// Spawn the poller against `client` with a fresh, empty cache.
    pub fn start<C: ProtocolClient>(client: C, config: PollerConfig) -> Arc<Self> {
        Self::start_with_cache(client, config, Arc::new(SnapshotCache::new()))
    }

    /// Spawn the poller publishing into an existing cache.
    pub fn start_with_cache<C: ProtocolClient>(
        client: C,
        config: PollerConfig,
        cache: Arc<SnapshotCache>,
    ) -> Arc<Self> {
        let metrics = Arc::new(PollerMetrics::new());
        let cancel = CancellationToken::new();
        let endpoint = config.endpoint.clone();

        let poller = Poller::new(
            Arc::new(client),
            config,
            Arc::clone(&cache),
            Arc::clone(&metrics),
        );
        let poller_cancel = cancel.child_token();

        let task = tokio::spawn(async move {
            tracing::info!(endpoint = %endpoint, "Starting poller task");
            let exit = poller.run(poller_cancel).await;
            tracing::info!(endpoint = %endpoint, exit = ?exit, "Poller task exited");
            exit
        });

        Arc::new(Self {
            cache,
            metrics,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn cache(&self) -> Arc<SnapshotCache> {
        Arc::clone(&self.cache)
    }

    pub fn metrics(&self) -> Arc<PollerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Current snapshot record.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.cache.load()
    }

    /// Whether the poller task is still running.
    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the poller and wait up to `timeout` for it to release the
    /// upstream link. The task is aborted if it does not finish in time.
    ///
    /// Returns how the poller exited, or `None` if it was already
    /// collected, failed, or had to be aborted.
    pub async fn shutdown(&self, timeout: Duration) -> Option<PollerExit> {
        tracing::info!("Shutting down bridge manager");
        self.cancel.cancel();

        let handle = self.task.lock().await.take()?;
        let abort = handle.abort_handle();

        let exit = match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(exit)) => Some(exit),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Poller task failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Poller did not stop in time, aborting",
                );
                abort.abort();
                None
            }
        };

        tracing::info!("Bridge manager shut down complete");
        exit
    }
}
