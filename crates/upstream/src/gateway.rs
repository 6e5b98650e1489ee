//! HTTP gateway implementation of [`ProtocolClient`].
//!
//! Talks to a gateway service that fronts the industrial server and
//! exposes its session and read services as JSON over HTTP:
//!
//! | Call             | Request                                        |
//! |------------------|------------------------------------------------|
//! | `connect`        | `GET /status`, `/ping`, `/health`, then `/` until one answers below 500 |
//! | `create_session` | `POST /sessions` -> `{"session_id": "..."}`    |
//! | `read`           | `GET /sessions/{id}/nodes/{node}/value` -> `{"value": 1.5, "status_code": 0}` |
//! | `close_session`  | `DELETE /sessions/{id}`                        |
//!
//! Bad-quality reads are reported by the gateway as a non-zero
//! `status_code` with HTTP 200; any non-2xx read response is treated as a
//! transport failure.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use crate::client::{ClientError, DataValue, NodeId, ProtocolClient, StatusCode};

/// Reachability probes tried in order by `connect`.
const PROBE_PATHS: [&[&str]; 4] = [&["status"], &["ping"], &["health"], &[]];

/// HTTP client for a single gateway.
#[derive(Debug, Clone, Default)]
pub struct GatewayClient {
    http: reqwest::Client,
}

/// A gateway base URL that answered a reachability probe.
#[derive(Debug)]
pub struct GatewayConnection {
    base_url: Url,
}

/// A session opened on the gateway.
#[derive(Debug)]
pub struct GatewaySession {
    base_url: Url,
    session_id: String,
}

impl GatewaySession {
    pub fn id(&self) -> &str {
        &self.session_id
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    value: Option<f64>,
    status_code: StatusCode,
}

impl GatewayClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProtocolClient for GatewayClient {
    type Connection = GatewayConnection;
    type Session = GatewaySession;

    async fn connect(&self, endpoint: &str) -> Result<GatewayConnection, ClientError> {
        let base_url = Url::parse(endpoint)
            .map_err(|e| ClientError::Connection(format!("invalid endpoint '{endpoint}': {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::Connection(format!(
                "unsupported endpoint scheme '{}'",
                base_url.scheme()
            )));
        }

        let mut last_error = String::from("no probe attempted");
        for segments in PROBE_PATHS {
            let url = join(&base_url, segments).map_err(ClientError::Connection)?;
            match self.http.get(url.clone()).send().await {
                Ok(response) if response.status().as_u16() < 500 => {
                    tracing::debug!(url = %url, status = %response.status(), "Gateway reachable");
                    return Ok(GatewayConnection { base_url });
                }
                Ok(response) => last_error = format!("{url} returned {}", response.status()),
                Err(e) => last_error = format!("{url}: {e}"),
            }
        }

        Err(ClientError::Connection(last_error))
    }

    async fn create_session(
        &self,
        connection: &GatewayConnection,
    ) -> Result<GatewaySession, ClientError> {
        let url = join(&connection.base_url, &["sessions"]).map_err(ClientError::Session)?;

        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| ClientError::Session(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ClientError::Session(format!(
                "gateway refused session: HTTP {}",
                response.status()
            )));
        }

        let body: SessionResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Session(format!("malformed session response: {e}")))?;

        tracing::debug!(session_id = %body.session_id, "Gateway session opened");

        Ok(GatewaySession {
            base_url: connection.base_url.clone(),
            session_id: body.session_id,
        })
    }

    async fn read(
        &self,
        session: &GatewaySession,
        node_id: &NodeId,
    ) -> Result<DataValue, ClientError> {
        let url = join(
            &session.base_url,
            &[
                "sessions",
                &session.session_id,
                "nodes",
                node_id.as_str(),
                "value",
            ],
        )
        .map_err(ClientError::Io)?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::Io(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ClientError::Io(format!(
                "read failed: HTTP {}",
                response.status()
            )));
        }

        let body: ReadResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Io(format!("malformed read response: {e}")))?;

        Ok(DataValue::with_status(body.status_code, body.value))
    }

    async fn close_session(&self, session: GatewaySession) {
        let url = match join(&session.base_url, &["sessions", &session.session_id]) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(error = %e, "Cannot build session close URL");
                return;
            }
        };

        match self.http.delete(url).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(session_id = %session.session_id, "Gateway session closed");
            }
            Ok(response) => tracing::debug!(
                session_id = %session.session_id,
                status = %response.status(),
                "Gateway rejected session close",
            ),
            Err(e) => tracing::debug!(
                session_id = %session.session_id,
                error = %e,
                "Gateway session close failed",
            ),
        }
    }

    async fn disconnect(&self, connection: GatewayConnection) {
        // Pooled HTTP connections are released by reqwest.
        tracing::debug!(base_url = %connection.base_url, "Gateway connection released");
    }
}

/// Append percent-encoded path segments to `base`.
fn join(base: &Url, segments: &[&str]) -> Result<Url, String> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| format!("endpoint '{base}' cannot carry a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
