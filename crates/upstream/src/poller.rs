//! Connection lifecycle and periodic sampling of the monitored node.
//!
//! [`Poller::run`] is the only code that touches the protocol client. It
//! loops through
//!
//! ```text
//! Disconnected --(backoff elapsed)--> Connecting --(connect + session)--> Connected
//!      ^                                   |                                  |
//!      +------------(failure)--------------+-----------(read I/O error)-------+
//! ```
//!
//! and publishes the outcome of every cycle to the [`SnapshotCache`].
//! Bad protocol status codes mark the snapshot degraded but keep the
//! session; only transport failures tear the link down.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use opcbridge_core::snapshot::{LinkStatus, SnapshotCache};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, DataValue, NodeId, ProtocolClient};
use crate::metrics::{LinkState, PollerMetrics};
use crate::reconnect::{Backoff, ReconnectConfig};

/// Everything the poller needs to know about the upstream and its timing.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Upstream endpoint address handed to [`ProtocolClient::connect`].
    pub endpoint: String,
    /// Node whose value is sampled.
    pub node_id: NodeId,
    /// Interval between reads while connected.
    pub poll_interval: Duration,
    /// Bound on connect and on create-session, each.
    pub connect_timeout: Duration,
    /// Bound on a single read.
    pub read_timeout: Duration,
    /// Bound on close-session and on disconnect, each.
    pub teardown_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl PollerConfig {
    /// Config with 1 s polling, 5 s timeouts and default backoff.
    pub fn new(endpoint: impl Into<String>, node_id: NodeId) -> Self {
        Self {
            endpoint: endpoint.into(),
            node_id,
            poll_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            teardown_timeout: Duration::from_secs(5),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Why [`Poller::run`] returned.
#[derive(Debug, Clone, PartialEq)]
pub enum PollerExit {
    /// The cancellation token fired.
    Cancelled,
    /// `max_attempts` consecutive failures without a successful connect.
    RetriesExhausted {
        attempts: u32,
        last_error: ClientError,
    },
}

/// A connection together with the session opened on it.
struct Link<C: ProtocolClient> {
    connection: C::Connection,
    session: C::Session,
}

enum SamplingEnd {
    Cancelled,
    LinkLost(ClientError),
}

/// Owner of the upstream link and sole writer of the snapshot.
pub struct Poller<C: ProtocolClient> {
    client: Arc<C>,
    config: PollerConfig,
    cache: Arc<SnapshotCache>,
    metrics: Arc<PollerMetrics>,
}

impl<C: ProtocolClient> Poller<C> {
    pub fn new(
        client: Arc<C>,
        config: PollerConfig,
        cache: Arc<SnapshotCache>,
        metrics: Arc<PollerMetrics>,
    ) -> Self {
        Self {
            client,
            config,
            cache,
            metrics,
        }
    }

    /// Run the state machine until cancelled or out of retries.
    ///
    /// The first connect fires immediately. Session and connection are
    /// released before every retry and before returning, whichever way
    /// the loop ends.
    pub async fn run(self, cancel: CancellationToken) -> PollerExit {
        let mut backoff = Backoff::new(self.config.reconnect.clone());
        let mut retry_delay: Option<Duration> = None;
        self.metrics.set_poll_interval(self.config.poll_interval);

        tracing::info!(
            endpoint = %self.config.endpoint,
            node_id = %self.config.node_id,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Poller started",
        );

        loop {
            if let Some(delay) = retry_delay.take() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return self.stopped(),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let link = match self.establish(&cancel).await {
                Some(Ok(link)) => link,
                Some(Err(err)) => {
                    self.metrics.connect_failed();
                    match self.schedule_retry(&mut backoff, err) {
                        Ok(delay) => {
                            retry_delay = Some(delay);
                            continue;
                        }
                        Err(exit) => return exit,
                    }
                }
                None => return self.stopped(),
            };

            backoff.reset();
            self.metrics.clear_retry();
            self.metrics.set_link_state(LinkState::Connected);
            tracing::info!(endpoint = %self.config.endpoint, "Connected to upstream");

            let end = self.sample(&link.session, &cancel).await;
            self.release(link).await;
            self.metrics.set_link_state(LinkState::Disconnected);

            match end {
                SamplingEnd::Cancelled => return self.stopped(),
                SamplingEnd::LinkLost(err) => {
                    self.metrics.read_failed();
                    tracing::warn!(
                        endpoint = %self.config.endpoint,
                        error = %err,
                        "Upstream link lost",
                    );
                    match self.schedule_retry(&mut backoff, err) {
                        Ok(delay) => retry_delay = Some(delay),
                        Err(exit) => return exit,
                    }
                }
            }
        }
    }

    /// Connect and open a session. `None` means cancelled.
    async fn establish(&self, cancel: &CancellationToken) -> Option<Result<Link<C>, ClientError>> {
        self.metrics.set_link_state(LinkState::Connecting);
        self.metrics.connect_attempted();
        tracing::debug!(endpoint = %self.config.endpoint, "Connecting to upstream");

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = guarded(
                self.config.connect_timeout,
                self.client.connect(&self.config.endpoint),
            ) => Some(result),
        };
        let connection = match connected? {
            Ok(connection) => connection,
            Err(err) => return Some(Err(err)),
        };

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = guarded(
                self.config.connect_timeout,
                self.client.create_session(&connection),
            ) => Some(result),
        };

        match opened {
            Some(Ok(session)) => Some(Ok(Link {
                connection,
                session,
            })),
            Some(Err(err)) => {
                self.release_connection(connection).await;
                Some(Err(err))
            }
            None => {
                self.release_connection(connection).await;
                None
            }
        }
    }

    /// Read on every tick until the transport fails or we are cancelled.
    async fn sample(&self, session: &C::Session, cancel: &CancellationToken) -> SamplingEnd {
        let period = self.config.poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return SamplingEnd::Cancelled,
                _ = ticker.tick() => {}
            }

            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = guarded(
                    self.config.read_timeout,
                    self.client.read(session, &self.config.node_id),
                ) => Some(result),
            };

            match read {
                None => return SamplingEnd::Cancelled,
                Some(Ok(data)) => self.apply(data),
                Some(Err(err)) => return SamplingEnd::LinkLost(err),
            }
        }
    }

    /// Publish one transport-level successful read.
    fn apply(&self, data: DataValue) {
        match (data.status.is_good(), data.value) {
            (true, Some(value)) if value.is_finite() => {
                self.metrics.read_good();
                let previous = self.cache.record_sample(value, Utc::now());
                if previous == LinkStatus::Connected {
                    tracing::trace!(value, "Sampled upstream value");
                } else {
                    tracing::info!(
                        node_id = %self.config.node_id,
                        value,
                        "Receiving good values from upstream",
                    );
                }
            }
            (true, Some(_)) => {
                self.degrade(format!("{} without a finite numeric value", data.status))
            }
            (true, None) => self.degrade(format!("{} without a numeric value", data.status)),
            (false, _) => self.degrade(data.status.to_string()),
        }
    }

    fn degrade(&self, reason: String) {
        self.metrics.read_degraded();
        let previous = self.cache.record_degraded(reason.clone());
        if previous != LinkStatus::Degraded {
            tracing::warn!(
                node_id = %self.config.node_id,
                reason = %reason,
                "Upstream value degraded",
            );
        }
    }

    /// Record a failure; returns the delay to wait, or the exit if the
    /// retry budget is spent.
    fn schedule_retry(&self, backoff: &mut Backoff, err: ClientError) -> Result<Duration, PollerExit> {
        self.metrics.set_link_state(LinkState::Disconnected);
        let delay = backoff.record_failure();
        let attempts = backoff.attempt();

        if backoff.exhausted() {
            self.cache
                .record_disconnected(format!("Max retry attempts reached ({attempts}): {err}"));
            self.metrics.set_retry(attempts, Duration::ZERO);
            tracing::error!(
                endpoint = %self.config.endpoint,
                attempts,
                error = %err,
                "Giving up on upstream",
            );
            return Err(PollerExit::RetriesExhausted {
                attempts,
                last_error: err,
            });
        }

        self.cache.record_disconnected(err.to_string());
        self.metrics.set_retry(attempts, delay);
        tracing::warn!(
            endpoint = %self.config.endpoint,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Upstream unavailable, retrying after back-off",
        );
        Ok(delay)
    }

    /// Close the session, then drop the connection.
    async fn release(&self, link: Link<C>) {
        let Link {
            connection,
            session,
        } = link;
        release_step(
            self.config.teardown_timeout,
            "close session",
            self.client.close_session(session),
        )
        .await;
        self.release_connection(connection).await;
    }

    async fn release_connection(&self, connection: C::Connection) {
        release_step(
            self.config.teardown_timeout,
            "disconnect",
            self.client.disconnect(connection),
        )
        .await;
    }

    fn stopped(&self) -> PollerExit {
        self.metrics.set_link_state(LinkState::Disconnected);
        self.metrics.clear_retry();
        self.cache.record_disconnected("Bridge poller stopped");
        tracing::info!(endpoint = %self.config.endpoint, "Poller stopped");
        PollerExit::Cancelled
    }
}

/// Run a client call under a deadline, turning a panic into an error.
async fn guarded<T, F>(limit: Duration, call: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match tokio::time::timeout(limit, AssertUnwindSafe(call).catch_unwind()).await {
        Err(_) => Err(ClientError::Timeout(limit)),
        Ok(Err(payload)) => Err(ClientError::Internal(panic_message(payload.as_ref()))),
        Ok(Ok(result)) => result,
    }
}

/// Best-effort release bounded by `limit`; never propagates.
async fn release_step<F>(limit: Duration, what: &'static str, call: F)
where
    F: Future<Output = ()>,
{
    match tokio::time::timeout(limit, AssertUnwindSafe(call).catch_unwind()).await {
        Ok(Ok(())) => tracing::debug!(step = what, "Released upstream resource"),
        Ok(Err(payload)) => tracing::warn!(
            step = what,
            error = %panic_message(payload.as_ref()),
            "Release step failed",
        ),
        Err(_) => tracing::warn!(
            step = what,
            timeout_ms = limit.as_millis() as u64,
            "Release step abandoned after grace period",
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guarded_passes_results_through() {
        let ok = guarded(Duration::from_secs(1), async { Ok::<u8, ClientError>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err = guarded(Duration::from_secs(1), async {
            Err::<u8, _>(ClientError::Io("reset".into()))
        })
        .await;
        assert_eq!(err, Err(ClientError::Io("reset".into())));
    }

    #[tokio::test]
    async fn guarded_converts_panic_to_internal_error() {
        async fn explode() -> Result<u8, ClientError> {
            panic!("driver exploded")
        }

        let result = guarded(Duration::from_secs(1), explode()).await;

        assert_eq!(
            result,
            Err(ClientError::Internal("panicked: driver exploded".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn guarded_times_out() {
        let result = guarded(
            Duration::from_millis(250),
            std::future::pending::<Result<u8, ClientError>>(),
        )
        .await;

        assert_eq!(result, Err(ClientError::Timeout(Duration::from_millis(250))));
    }

    #[test]
    fn default_config_polls_every_second() {
        let config = PollerConfig::new("http://plc", NodeId::parse("i=1").unwrap());
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.reconnect, ReconnectConfig::default());
    }
}
