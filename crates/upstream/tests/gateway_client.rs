//! Tests for `GatewayClient` against an in-process mock gateway.
//!
//! The mock is a small axum router bound to an ephemeral localhost port.
//! It keeps just enough state to check which sessions were opened,
//! which were closed and which nodes were read.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::{Path, State};
use axum::http::StatusCode as HttpStatus;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use opcbridge_core::snapshot::LinkStatus;
use opcbridge_upstream::{
    BridgeManager, ClientError, GatewayClient, NodeId, PollerConfig, ProtocolClient, StatusCode,
};
use serde_json::json;

#[derive(Default)]
struct MockGateway {
    reading: Mutex<(Option<f64>, u32)>,
    open: Mutex<Vec<String>>,
    closed: Mutex<Vec<String>>,
    nodes: Mutex<Vec<String>>,
    issued: AtomicUsize,
    refuse_sessions: AtomicBool,
}

impl MockGateway {
    fn with_reading(value: Option<f64>, status: StatusCode) -> Arc<Self> {
        let gateway = Self::default();
        *gateway.reading.lock().unwrap() = (value, status.0);
        Arc::new(gateway)
    }
}

async fn open_session(State(gw): State<Arc<MockGateway>>) -> Response {
    if gw.refuse_sessions.load(Ordering::SeqCst) {
        return (HttpStatus::SERVICE_UNAVAILABLE, "too many sessions").into_response();
    }
    let id = format!("s-{}", gw.issued.fetch_add(1, Ordering::SeqCst) + 1);
    gw.open.lock().unwrap().push(id.clone());
    Json(json!({ "session_id": id })).into_response()
}

async fn close_session(State(gw): State<Arc<MockGateway>>, Path(id): Path<String>) -> HttpStatus {
    gw.open.lock().unwrap().retain(|s| *s != id);
    gw.closed.lock().unwrap().push(id);
    HttpStatus::NO_CONTENT
}

async fn read_value(
    State(gw): State<Arc<MockGateway>>,
    Path((id, node)): Path<(String, String)>,
) -> Response {
    if !gw.open.lock().unwrap().contains(&id) {
        return (HttpStatus::NOT_FOUND, "unknown session").into_response();
    }
    gw.nodes.lock().unwrap().push(node);
    let (value, status_code) = *gw.reading.lock().unwrap();
    Json(json!({ "value": value, "status_code": status_code })).into_response()
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn spawn_gateway(gw: Arc<MockGateway>) -> String {
    let app = Router::new()
        .route("/status", get(|| async { "ok" }))
        .route("/sessions", post(open_session))
        .route("/sessions/{id}", delete(close_session))
        .route("/sessions/{id}/nodes/{node}/value", get(read_value))
        .with_state(gw);
    serve(app).await
}

fn node() -> NodeId {
    NodeId::parse("ns=2;s=Demo.Dynamic.Scalar.Double").unwrap()
}

// ---------------------------------------------------------------------------
// Test: connect, open session, read, close
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_session_lifecycle() {
    let gw = MockGateway::with_reading(Some(42.5), StatusCode::GOOD);
    let endpoint = spawn_gateway(Arc::clone(&gw)).await;
    let client = GatewayClient::new();

    let connection = client.connect(&endpoint).await.unwrap();
    let session = client.create_session(&connection).await.unwrap();
    assert_eq!(session.id(), "s-1");

    let data = client.read(&session, &node()).await.unwrap();
    assert_eq!(data.value, Some(42.5));
    assert!(data.status.is_good());
    assert_eq!(
        gw.nodes.lock().unwrap().as_slice(),
        ["ns=2;s=Demo.Dynamic.Scalar.Double"]
    );

    client.close_session(session).await;
    client.disconnect(connection).await;
    assert!(gw.open.lock().unwrap().is_empty());
    assert_eq!(gw.closed.lock().unwrap().as_slice(), ["s-1"]);
}

// ---------------------------------------------------------------------------
// Test: bad quality comes back as a status, not an error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bad_status_is_returned_in_data_value() {
    let gw = MockGateway::with_reading(None, StatusCode::BAD_NODE_ID_UNKNOWN);
    let endpoint = spawn_gateway(gw).await;
    let client = GatewayClient::new();

    let connection = client.connect(&endpoint).await.unwrap();
    let session = client.create_session(&connection).await.unwrap();
    let data = client.read(&session, &node()).await.unwrap();

    assert_eq!(data.value, None);
    assert_eq!(data.status, StatusCode::BAD_NODE_ID_UNKNOWN);
}

// ---------------------------------------------------------------------------
// Test: reading on a closed session is a transport failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn read_on_unknown_session_is_io_error() {
    let gw = MockGateway::with_reading(Some(1.0), StatusCode::GOOD);
    let endpoint = spawn_gateway(Arc::clone(&gw)).await;
    let client = GatewayClient::new();

    let connection = client.connect(&endpoint).await.unwrap();
    let session = client.create_session(&connection).await.unwrap();
    gw.open.lock().unwrap().clear();

    let err = client.read(&session, &node()).await.unwrap_err();
    assert_matches!(err, ClientError::Io(msg) if msg.contains("404"));
}

// ---------------------------------------------------------------------------
// Test: session refusal maps to a session error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refused_session_is_session_error() {
    let gw = MockGateway::with_reading(Some(1.0), StatusCode::GOOD);
    gw.refuse_sessions.store(true, Ordering::SeqCst);
    let endpoint = spawn_gateway(gw).await;
    let client = GatewayClient::new();

    let connection = client.connect(&endpoint).await.unwrap();
    let err = client.create_session(&connection).await.unwrap_err();

    assert_matches!(err, ClientError::Session(msg) if msg.contains("503"));
}

// ---------------------------------------------------------------------------
// Test: connect falls through the probe list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_probes_until_one_answers() {
    let hits = Arc::new(Mutex::new(Vec::<&'static str>::new()));
    let (h1, h2, h3, h4) = (hits.clone(), hits.clone(), hits.clone(), hits.clone());
    let app = Router::new()
        .route(
            "/status",
            get(move || async move {
                h1.lock().unwrap().push("status");
                HttpStatus::BAD_GATEWAY
            }),
        )
        .route(
            "/ping",
            get(move || async move {
                h2.lock().unwrap().push("ping");
                HttpStatus::INTERNAL_SERVER_ERROR
            }),
        )
        .route(
            "/health",
            get(move || async move {
                h3.lock().unwrap().push("health");
                HttpStatus::SERVICE_UNAVAILABLE
            }),
        )
        .route(
            "/",
            get(move || async move {
                h4.lock().unwrap().push("root");
                "gateway"
            }),
        );
    let endpoint = serve(app).await;

    GatewayClient::new().connect(&endpoint).await.unwrap();

    assert_eq!(
        hits.lock().unwrap().as_slice(),
        ["status", "ping", "health", "root"]
    );
}

// ---------------------------------------------------------------------------
// Test: a gateway that only answers /ping is reachable
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_accepts_ping_only_gateway() {
    let hits = Arc::new(Mutex::new(Vec::<&'static str>::new()));
    let (h1, h2) = (hits.clone(), hits.clone());
    let app = Router::new()
        .route(
            "/ping",
            get(move || async move {
                h1.lock().unwrap().push("ping");
                "pong"
            }),
        )
        .fallback(move || async move {
            h2.lock().unwrap().push("other");
            HttpStatus::SERVICE_UNAVAILABLE
        });
    let endpoint = serve(app).await;

    GatewayClient::new().connect(&endpoint).await.unwrap();

    assert_eq!(hits.lock().unwrap().as_slice(), ["other", "ping"]);
}

// ---------------------------------------------------------------------------
// Test: connect fails when every probe returns a server error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_fails_when_all_probes_fail() {
    let app = Router::new().fallback(|| async { HttpStatus::INTERNAL_SERVER_ERROR });
    let endpoint = serve(app).await;

    let err = GatewayClient::new().connect(&endpoint).await.unwrap_err();

    assert_matches!(err, ClientError::Connection(msg) if msg.contains("500"));
}

// ---------------------------------------------------------------------------
// Test: nothing listening is a connection error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_to_closed_port_fails() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = GatewayClient::new()
        .connect(&format!("http://{addr}"))
        .await
        .unwrap_err();

    assert_matches!(err, ClientError::Connection(_));
}

// ---------------------------------------------------------------------------
// Test: the manager keeps the snapshot fed from a real gateway
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manager_polls_gateway_end_to_end() {
    let gw = MockGateway::with_reading(Some(42.0), StatusCode::GOOD);
    let endpoint = spawn_gateway(Arc::clone(&gw)).await;

    let config = PollerConfig {
        poll_interval: Duration::from_millis(20),
        ..PollerConfig::new(endpoint, node())
    };
    let manager = BridgeManager::start(GatewayClient::new(), config);

    let mut connected = false;
    for _ in 0..250 {
        if manager.snapshot().status == LinkStatus::Connected {
            connected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(connected, "poller never reached the gateway");
    assert_eq!(manager.snapshot().value, Some(42.0));

    manager.shutdown(Duration::from_secs(5)).await;
    assert!(gw.open.lock().unwrap().is_empty());
    assert_eq!(gw.closed.lock().unwrap().len(), 1);
}
