//! Scriptable in-memory [`ProtocolClient`] for tests.
//!
//! Each call pops the next scripted outcome. Unscripted connect and
//! session calls succeed; unscripted reads repeat the last read step (or
//! hang forever if none was ever scripted). Clones share state, so a test
//! can keep one handle while the poller owns another.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::client::{ClientError, DataValue, NodeId, ProtocolClient, StatusCode};

/// Outcome of one scripted read.
#[derive(Debug, Clone)]
pub enum ReadStep {
    /// Good status with this value.
    Value(f64),
    /// Arbitrary status and optional value.
    Status(StatusCode, Option<f64>),
    /// Transport failure.
    Fail(ClientError),
    /// Never completes.
    Pending,
    /// Panics with this message.
    Panic(&'static str),
}

/// Resource lifecycle calls, in the order they completed. Ids are the
/// sequence numbers of the connection or session involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeEvent {
    Connect(usize),
    OpenSession(usize),
    CloseSession(usize),
    Disconnect(usize),
}

/// Call and resource counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FakeCounters {
    pub connect_calls: usize,
    pub connections_opened: usize,
    pub connections_closed: usize,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    pub reads: usize,
}

impl FakeCounters {
    /// Connections opened and not yet released.
    pub fn open_connections(&self) -> usize {
        self.connections_opened - self.connections_closed
    }

    /// Sessions opened and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.sessions_opened - self.sessions_closed
    }
}

#[derive(Debug)]
pub struct FakeConnection {
    pub id: usize,
}

#[derive(Debug)]
pub struct FakeSession {
    pub id: usize,
}

#[derive(Debug, Default)]
struct FakeState {
    connects: VecDeque<Result<(), ClientError>>,
    sessions: VecDeque<Result<(), ClientError>>,
    reads: VecDeque<ReadStep>,
    last_read: Option<ReadStep>,
    close_delay: Option<Duration>,
    counters: FakeCounters,
    events: Vec<FakeEvent>,
    connect_times: Vec<Instant>,
    endpoints: Vec<String>,
    nodes_read: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeClient {
    state: Arc<Mutex<FakeState>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next unscripted connect call.
    pub fn push_connect(&self, outcome: Result<(), ClientError>) -> &Self {
        self.state().connects.push_back(outcome);
        self
    }

    /// Queue `count` connection failures.
    pub fn fail_connects(&self, count: usize, message: &str) -> &Self {
        let mut state = self.state();
        for _ in 0..count {
            state
                .connects
                .push_back(Err(ClientError::Connection(message.to_string())));
        }
        drop(state);
        self
    }

    /// Queue the outcome of the next create-session call.
    pub fn push_session(&self, outcome: Result<(), ClientError>) -> &Self {
        self.state().sessions.push_back(outcome);
        self
    }

    /// Queue read outcomes.
    pub fn push_reads(&self, steps: impl IntoIterator<Item = ReadStep>) -> &Self {
        self.state().reads.extend(steps);
        self
    }

    /// Make `close_session` take this long before counting the close.
    pub fn set_close_delay(&self, delay: Duration) -> &Self {
        self.state().close_delay = Some(delay);
        self
    }

    pub fn counters(&self) -> FakeCounters {
        self.state().counters
    }

    /// (Tokio) instants at which `connect` was called.
    pub fn connect_times(&self) -> Vec<Instant> {
        self.state().connect_times.clone()
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.state().events.clone()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.state().endpoints.clone()
    }

    pub fn nodes_read(&self) -> Vec<NodeId> {
        self.state().nodes_read.clone()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ProtocolClient for FakeClient {
    type Connection = FakeConnection;
    type Session = FakeSession;

    async fn connect(&self, endpoint: &str) -> Result<FakeConnection, ClientError> {
        let mut state = self.state();
        state.counters.connect_calls += 1;
        state.connect_times.push(Instant::now());
        state.endpoints.push(endpoint.to_string());

        state.connects.pop_front().unwrap_or(Ok(()))?;
        state.counters.connections_opened += 1;
        let id = state.counters.connections_opened;
        state.events.push(FakeEvent::Connect(id));
        Ok(FakeConnection { id })
    }

    async fn create_session(&self, _connection: &FakeConnection) -> Result<FakeSession, ClientError> {
        let mut state = self.state();
        state.sessions.pop_front().unwrap_or(Ok(()))?;
        state.counters.sessions_opened += 1;
        let id = state.counters.sessions_opened;
        state.events.push(FakeEvent::OpenSession(id));
        Ok(FakeSession { id })
    }

    async fn read(&self, _session: &FakeSession, node_id: &NodeId) -> Result<DataValue, ClientError> {
        let step = {
            let mut state = self.state();
            state.counters.reads += 1;
            state.nodes_read.push(node_id.clone());
            let step = match state.reads.pop_front() {
                Some(step) => step,
                None => state.last_read.clone().unwrap_or(ReadStep::Pending),
            };
            state.last_read = Some(step.clone());
            step
        };

        match step {
            ReadStep::Value(value) => Ok(DataValue::good(value)),
            ReadStep::Status(status, value) => Ok(DataValue::with_status(status, value)),
            ReadStep::Fail(err) => Err(err),
            ReadStep::Pending => std::future::pending().await,
            ReadStep::Panic(message) => panic!("{message}"),
        }
    }

    async fn close_session(&self, session: FakeSession) {
        let delay = self.state().close_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.counters.sessions_closed += 1;
        state.events.push(FakeEvent::CloseSession(session.id));
    }

    async fn disconnect(&self, connection: FakeConnection) {
        let mut state = self.state();
        state.counters.connections_closed += 1;
        state.events.push(FakeEvent::Disconnect(connection.id));
    }
}
