//! Protocol-client capability consumed by the poller.
//!
//! The bridge never speaks the industrial wire protocol itself. The
//! [`Poller`](crate::poller::Poller) drives any type implementing
//! [`ProtocolClient`]: connect to an endpoint, open a session on that
//! connection, read one attribute, then close the session and drop the
//! connection. Implementations shipped in this crate are
//! [`GatewayClient`](crate::gateway::GatewayClient) and, for tests,
//! `FakeClient`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use opcbridge_core::error::CoreError;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Identifier of the monitored node in the server's address space.
///
/// Accepts the textual forms `ns=<index>;<type>=<id>` and `<type>=<id>`
/// where `<type>` is one of `i` (numeric), `s` (string), `g` (guid) or
/// `b` (opaque), e.g. `ns=2;s=Demo.Temperature` or `i=2258`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Parse and validate a textual node identifier.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();

        let rest = match trimmed.strip_prefix("ns=") {
            Some(after) => {
                let (ns, rest) = after
                    .split_once(';')
                    .ok_or_else(|| invalid_node_id(raw, "missing ';' after namespace index"))?;
                ns.parse::<u16>().map_err(|_| {
                    invalid_node_id(raw, "namespace index must be an integer 0-65535")
                })?;
                rest
            }
            None => trimmed,
        };

        let (kind, id) = rest
            .split_once('=')
            .ok_or_else(|| invalid_node_id(raw, "expected <type>=<identifier>"))?;

        if !matches!(kind, "i" | "s" | "g" | "b") {
            return Err(invalid_node_id(
                raw,
                "identifier type must be one of i, s, g, b",
            ));
        }
        if id.is_empty() {
            return Err(invalid_node_id(raw, "identifier is empty"));
        }
        if kind == "i" && id.parse::<u32>().is_err() {
            return Err(invalid_node_id(raw, "numeric identifier must fit in u32"));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn invalid_node_id(raw: &str, reason: &str) -> CoreError {
    CoreError::Validation(format!("invalid node id '{raw}': {reason}"))
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NodeId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NodeId> for String {
    fn from(value: NodeId) -> Self {
        value.0
    }
}

// ---------------------------------------------------------------------------
// StatusCode
// ---------------------------------------------------------------------------

/// Severity class encoded in the top two bits of a [`StatusCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Good,
    Uncertain,
    Bad,
}

/// 32-bit status code attached to every value the server returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);
    pub const UNCERTAIN_NO_COMMUNICATION_LAST_USABLE_VALUE: StatusCode = StatusCode(0x408F_0000);
    pub const UNCERTAIN_LAST_USABLE_VALUE: StatusCode = StatusCode(0x4090_0000);
    pub const UNCERTAIN_SENSOR_NOT_ACCURATE: StatusCode = StatusCode(0x4093_0000);
    pub const BAD_UNEXPECTED_ERROR: StatusCode = StatusCode(0x8001_0000);
    pub const BAD_INTERNAL_ERROR: StatusCode = StatusCode(0x8002_0000);
    pub const BAD_COMMUNICATION_ERROR: StatusCode = StatusCode(0x8005_0000);
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    pub const BAD_SESSION_ID_INVALID: StatusCode = StatusCode(0x8025_0000);
    pub const BAD_SESSION_CLOSED: StatusCode = StatusCode(0x8026_0000);
    pub const BAD_WAITING_FOR_INITIAL_DATA: StatusCode = StatusCode(0x8032_0000);
    pub const BAD_NODE_ID_INVALID: StatusCode = StatusCode(0x8033_0000);
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    pub const BAD_NOT_READABLE: StatusCode = StatusCode(0x803A_0000);
    pub const BAD_OUT_OF_SERVICE: StatusCode = StatusCode(0x808D_0000);

    pub fn severity(self) -> Severity {
        match self.0 >> 30 {
            0 => Severity::Good,
            1 => Severity::Uncertain,
            _ => Severity::Bad,
        }
    }

    pub fn is_good(self) -> bool {
        self.severity() == Severity::Good
    }

    /// Symbolic name for the well-known codes, ignoring the info bits.
    pub fn name(self) -> Option<&'static str> {
        let name = match StatusCode(self.0 & 0xFFFF_0000) {
            Self::GOOD => "Good",
            Self::UNCERTAIN_NO_COMMUNICATION_LAST_USABLE_VALUE => {
                "UncertainNoCommunicationLastUsableValue"
            }
            Self::UNCERTAIN_LAST_USABLE_VALUE => "UncertainLastUsableValue",
            Self::UNCERTAIN_SENSOR_NOT_ACCURATE => "UncertainSensorNotAccurate",
            Self::BAD_UNEXPECTED_ERROR => "BadUnexpectedError",
            Self::BAD_INTERNAL_ERROR => "BadInternalError",
            Self::BAD_COMMUNICATION_ERROR => "BadCommunicationError",
            Self::BAD_TIMEOUT => "BadTimeout",
            Self::BAD_SESSION_ID_INVALID => "BadSessionIdInvalid",
            Self::BAD_SESSION_CLOSED => "BadSessionClosed",
            Self::BAD_WAITING_FOR_INITIAL_DATA => "BadWaitingForInitialData",
            Self::BAD_NODE_ID_INVALID => "BadNodeIdInvalid",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_NOT_READABLE => "BadNotReadable",
            Self::BAD_OUT_OF_SERVICE => "BadOutOfService",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name().unwrap_or(match self.severity() {
            Severity::Good => "Good",
            Severity::Uncertain => "Uncertain",
            Severity::Bad => "Bad",
        });
        write!(f, "{name} (0x{:08X})", self.0)
    }
}

// ---------------------------------------------------------------------------
// DataValue / ClientError
// ---------------------------------------------------------------------------

/// A value as returned by a single read, together with its status code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    /// Numeric payload; `None` when the server returned no numeric value.
    pub value: Option<f64>,
    /// Quality of the value as reported by the server.
    pub status: StatusCode,
}

impl DataValue {
    pub fn good(value: f64) -> Self {
        Self {
            value: Some(value),
            status: StatusCode::GOOD,
        }
    }

    pub fn with_status(status: StatusCode, value: Option<f64>) -> Self {
        Self { value, status }
    }
}

/// Failures a [`ProtocolClient`] call can report.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// The endpoint is unreachable or rejected the handshake.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The connection is up but session negotiation failed.
    #[error("Session error: {0}")]
    Session(String),

    /// Transport-level failure on an established session.
    #[error("I/O error: {0}")]
    Io(String),

    /// The poller's own deadline for the call elapsed.
    #[error("Timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    /// The client implementation failed unexpectedly (e.g. panicked).
    #[error("Unexpected client failure: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// ProtocolClient
// ---------------------------------------------------------------------------

/// The operations the poller needs from an upstream protocol stack.
///
/// `close_session` and `disconnect` take their handle by value: once
/// released a handle cannot be used again, and a session can only be
/// created from a live connection reference, so it never outlives it.
#[async_trait]
pub trait ProtocolClient: Send + Sync + 'static {
    /// Live transport link to the server.
    type Connection: Send + Sync + 'static;
    /// Negotiated context on a connection, required for reads.
    type Session: Send + Sync + 'static;

    async fn connect(&self, endpoint: &str) -> Result<Self::Connection, ClientError>;

    async fn create_session(
        &self,
        connection: &Self::Connection,
    ) -> Result<Self::Session, ClientError>;

    /// Read the value attribute of `node_id`.
    ///
    /// A bad status code is *not* an error here; it is returned inside the
    /// [`DataValue`]. `Err` means the transport failed.
    async fn read(
        &self,
        session: &Self::Session,
        node_id: &NodeId,
    ) -> Result<DataValue, ClientError>;

    async fn close_session(&self, session: Self::Session);

    async fn disconnect(&self, connection: Self::Connection);
}
