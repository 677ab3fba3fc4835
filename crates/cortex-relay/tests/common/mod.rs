//! Test utilities: a mock upstream agent service and relay builders.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::Value;
use tokio::net::TcpListener;

use cortex_relay::api::{AppState, create_router};
use cortex_relay::config::RelayConfig;
use cortex_relay_protocol::ChatRequest;

pub const API_KEY: &str = "test-api-key";

/// Snapshot-style feed with reasoning noise, duplicates and a stale snapshot.
pub const SALES_FEED: &str = "\
event: response.status\n\
data: {\"message\":\"Planning the next steps\"}\n\
\n\
event: response.thinking.delta\n\
data: {\"text\":\"Je consulte les ventes\"}\n\
\n\
event: delta\n\
data: {\"text\":\"Ventes en hausse\"}\n\
\n\
event: delta\n\
data: {\"text\":\"Ventes en hausse\"}\n\
\n\
event: response\n\
data: {\"text\":\"Ventes en hausse de 12%\"}\n\
\n\
event: message\n\
data: {\"content\":[{\"type\":\"text\",\"text\":\"Ventes en hausse\"}]}\n\
\n\
data: not json\n\
\n\
event: done\n\
data: {}\n\
\n";

/// One request seen by the mock upstream.
#[derive(Debug, Clone)]
pub struct UpstreamCall {
    pub agent: String,
    pub authorization: Option<String>,
    pub body: Value,
}

/// Mock upstream agent service.
///
/// `AGENT_VENTES` streams [`SALES_FEED`], `AGENT_OPPORTUNITE` ends without
/// text and `AGENT_STOCK` answers 500, unless a feed was set for the agent.
#[derive(Clone, Default)]
pub struct MockUpstream {
    hits: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<UpstreamCall>>>,
    feeds: Arc<Mutex<HashMap<String, String>>>,
}

impl MockUpstream {
    /// Stream `feed` for `agent` from now on.
    pub fn set_feed(&self, agent: &str, feed: impl Into<String>) {
        self.feeds.lock().unwrap().insert(agent.to_string(), feed.into());
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_call(&self) -> Option<UpstreamCall> {
        self.calls.lock().unwrap().last().cloned()
    }
}

async fn run_agent(
    State(mock): State<MockUpstream>,
    Path((_db, _schema, agent)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    mock.calls.lock().unwrap().push(UpstreamCall {
        agent: agent.clone(),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });

    let sse = [(header::CONTENT_TYPE, "text/event-stream")];
    let agent = agent.trim_end_matches(":run");
    if let Some(feed) = mock.feeds.lock().unwrap().get(agent).cloned() {
        return (sse, feed).into_response();
    }
    match agent {
        "AGENT_VENTES" => (sse, SALES_FEED).into_response(),
        "AGENT_OPPORTUNITE" => (sse, "event: done\ndata: {}\n\n").into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "warehouse offline").into_response(),
    }
}

/// Start the mock upstream on an ephemeral port.
pub async fn spawn_mock_upstream() -> (SocketAddr, MockUpstream) {
    let mock = MockUpstream::default();
    let app = Router::new()
        .route(
            "/api/v2/databases/{db}/schemas/{schema}/agents/{agent}",
            post(run_agent),
        )
        .with_state(mock.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, mock)
}

/// Relay configuration pointing at `upstream`, with the test API key.
pub fn test_config(upstream: SocketAddr) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.upstream.account = "test-account".to_string();
    config.upstream.token = "test-pat".to_string();
    config.upstream.database = "SALES_DB".to_string();
    config.upstream.schema = "AGENTS".to_string();
    config.upstream.base_url = Some(format!("http://{upstream}"));
    config.auth.api_key = Some(API_KEY.to_string());
    config.validate().unwrap();
    config
}

/// Relay router backed by a fresh mock upstream.
pub async fn test_app() -> (Router, MockUpstream) {
    let (addr, mock) = spawn_mock_upstream().await;
    (app_for(test_config(addr)), mock)
}

pub fn app_for(config: RelayConfig) -> Router {
    create_router(AppState::new(config).unwrap())
}

/// Serve the relay on an ephemeral port and return its base URL.
pub async fn spawn_relay(config: RelayConfig) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app_for(config);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Stand-in relay that records every `/chat/stream` body and answers the
/// n-th request (from 0) with `réponse n`.
#[derive(Clone, Default)]
pub struct RecordingRelay {
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl RecordingRelay {
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn record_chat(
    State(relay): State<RecordingRelay>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let n = {
        let mut requests = relay.requests.lock().unwrap();
        requests.push(request);
        requests.len() - 1
    };
    let body = format!(
        "event: delta\ndata: {{\"text\":\"réponse {n}\"}}\n\nevent: done\ndata: {{}}\n\n"
    );
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

/// Serve a [`RecordingRelay`] on an ephemeral port and return its base URL.
pub async fn spawn_recording_relay() -> (String, RecordingRelay) {
    let relay = RecordingRelay::default();
    let app = Router::new()
        .route("/chat/stream", post(record_chat))
        .with_state(relay.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), relay)
}

/// Render `(event, text)` pairs as an upstream SSE feed ending with `done`.
pub fn text_feed(events: &[(&str, &str)]) -> String {
    let mut feed = String::new();
    for (event, text) in events {
        let data = serde_json::json!({ "text": text });
        feed.push_str(&format!("event: {event}\ndata: {data}\n\n"));
    }
    feed.push_str("event: done\ndata: {}\n\n");
    feed
}

/// Split an SSE body into `(event, data)` pairs.
pub fn parse_sse(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter_map(|frame| {
            let mut event = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim().to_string());
                } else if let Some(payload) = line.strip_prefix("data:") {
                    data = Some(serde_json::from_str(payload.trim()).unwrap());
                }
            }
            Some((event?, data.unwrap_or(Value::Null)))
        })
        .collect()
}
