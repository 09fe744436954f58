//! Shared utilities for integration testing.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use render_gate::config::GateConfig;
use render_gate::http::{Collaborators, GateServer};
use render_gate::lifecycle::Shutdown;
use render_gate::observability::Telemetry;
use render_gate::access::HttpAuthority;
use render_gate::render::{
    PatternClassifier, RenderEngine, RenderEvent, RenderHandle, RenderHead, RenderMode,
    RenderRequest,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral local port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Scripted authorization service recording every call it receives.
#[derive(Clone, Default)]
pub struct MockAuthority {
    pub public_origins: Arc<Mutex<Vec<String>>>,
    pub allowed_tokens: Arc<Mutex<HashMap<String, bool>>>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

#[derive(Deserialize)]
struct PublicQuery {
    url: String,
}

#[derive(Deserialize)]
struct ValidateBody {
    token: String,
    url: String,
}

impl MockAuthority {
    pub fn with_public(self, origin: &str) -> Self {
        self.public_origins.lock().unwrap().push(origin.to_string());
        self
    }

    pub fn with_token(self, token: &str, allowed: bool) -> Self {
        self.allowed_tokens
            .lock()
            .unwrap()
            .insert(token.to_string(), allowed);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub async fn start(&self) -> SocketAddr {
        let router = Router::new()
            .route("/api/website-access", get(public_status).post(validate))
            .with_state(self.clone());
        serve(router).await
    }
}

async fn public_status(State(mock): State<MockAuthority>, Query(q): Query<PublicQuery>) -> Json<Value> {
    mock.calls.lock().unwrap().push(format!("public:{}", q.url));
    let is_public = mock.public_origins.lock().unwrap().contains(&q.url);
    Json(json!({ "isPublic": is_public }))
}

async fn validate(State(mock): State<MockAuthority>, Json(body): Json<ValidateBody>) -> Json<Value> {
    mock.calls
        .lock()
        .unwrap()
        .push(format!("validate:{}:{}", body.token, body.url));
    let allowed = mock
        .allowed_tokens
        .lock()
        .unwrap()
        .get(&body.token)
        .copied()
        .unwrap_or(false);
    Json(json!({ "allowed": allowed }))
}

/// Telemetry sink collecting every posted event.
#[derive(Clone, Default)]
pub struct MockSink {
    pub events: Arc<Mutex<Vec<Value>>>,
}

impl MockSink {
    pub async fn start(&self) -> SocketAddr {
        let router = Router::new()
            .route("/", post(collect))
            .with_state(self.clone());
        serve(router).await
    }

    pub fn kinds(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e["type"].as_str().map(str::to_string))
            .collect()
    }
}

async fn collect(State(sink): State<MockSink>, Json(event): Json<Value>) {
    sink.events.lock().unwrap().push(event);
}

/// Engine that emits a fixed document and records each start.
#[derive(Clone, Default)]
pub struct RecordingEngine {
    pub starts: Arc<Mutex<Vec<(String, RenderMode)>>>,
    pub ready_delay: Option<Duration>,
}

impl RecordingEngine {
    pub fn stalled(delay: Duration) -> Self {
        Self {
            ready_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn starts(&self) -> Vec<(String, RenderMode)> {
        self.starts.lock().unwrap().clone()
    }
}

impl RenderEngine for RecordingEngine {
    fn start(&self, request: RenderRequest, mode: RenderMode) -> RenderHandle {
        self.starts.lock().unwrap().push((request.url.to_string(), mode));
        let (sink, handle) = RenderHandle::channel();
        let delay = self.ready_delay;
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            sink.event(RenderEvent::ShellReady(RenderHead::default()));
            sink.chunk(Bytes::from_static(b"<html><body>rendered</body></html>"));
            sink.event(RenderEvent::AllReady(RenderHead::default()));
        });
        handle
    }
}

/// Production-mode config pointing at `auth`.
pub fn production_config(auth: SocketAddr) -> GateConfig {
    let mut config = GateConfig::default();
    config.deployment.production = true;
    config.authority.host = format!("http://{auth}");
    config.authority.timeout_ms = 2_000;
    config
}

/// Start the gate with the HTTP authority and the given engine and
/// telemetry. Returns its address and the shutdown handle.
pub async fn start_gate(
    config: GateConfig,
    engine: impl RenderEngine + 'static,
    telemetry: Telemetry,
) -> (SocketAddr, Shutdown) {
    let collaborators = Collaborators {
        authority: Arc::new(HttpAuthority::new(&config.authority, client())),
        engine: Arc::new(engine),
        classifier: Some(Arc::new(PatternClassifier::default())),
        telemetry,
    };

    let shutdown = Shutdown::new();
    let server = GateServer::new(config, collaborators);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

/// Client that never follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}
