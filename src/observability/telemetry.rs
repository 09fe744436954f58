//! Out-of-band diagnostic events.
//!
//! # Responsibilities
//! - Build correlated events (one request id per request)
//! - Ship them to the configured sink as JSON POSTs
//!
//! # Design Decisions
//! - Emission never blocks and never fails the request path
//! - A bounded queue feeds one detached worker; overflow drops events
//! - One worker keeps sink order equal to emission order (best effort)

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::config::TelemetryConfig;
use crate::observability::metrics;

/// Kind tag of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RequestStart,
    CheckingPublicStatus,
    PublicSiteAllowed,
    PublicCheckError,
    NoAuthRedirect,
    ValidatingAuthToken,
    InvalidToken,
    TokenValidatedRedirect,
    TokenValidationError,
    ValidatingSession,
    InvalidSession,
    SessionValidationError,
    RenderShellError,
    RequestComplete,
}

/// One diagnostic event. Append-only; never read back by the gate.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,

    #[serde(rename = "requestId")]
    pub request_id: String,

    #[serde(serialize_with = "rfc3339")]
    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

fn rfc3339<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl TelemetryEvent {
    pub fn new(kind: EventKind, request_id: impl Into<String>) -> Self {
        Self {
            kind,
            request_id: request_id.into(),
            timestamp: Utc::now(),
            payload: Map::new(),
        }
    }

    /// Attach a payload field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }
}

/// Cheap, cloneable handle to the emitter.
#[derive(Clone, Debug, Default)]
pub struct Telemetry {
    tx: Option<mpsc::Sender<TelemetryEvent>>,
}

impl Telemetry {
    /// A handle that discards every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Start the sink worker according to `config`. Must be called inside a
    /// Tokio runtime.
    pub fn spawn(config: &TelemetryConfig, client: reqwest::Client) -> Self {
        if !config.enabled {
            tracing::info!("Telemetry disabled");
            return Self::disabled();
        }

        let (telemetry, mut rx) = Self::channel(config.queue_capacity);
        let sink_url = config.sink_url.clone();
        let timeout = Duration::from_millis(config.timeout_ms);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let result = client
                    .post(&sink_url)
                    .json(&event)
                    .timeout(timeout)
                    .send()
                    .await;
                if let Err(e) = result {
                    tracing::debug!(error = %e, kind = ?event.kind, "Telemetry sink unreachable");
                }
            }
            tracing::debug!("Telemetry worker stopped");
        });

        tracing::info!(sink = %config.sink_url, "Telemetry worker started");
        telemetry
    }

    /// A handle backed by a plain channel; the caller owns the receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TelemetryEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// Queue an event. Never waits; drops the event if the queue is full.
    pub fn emit(&self, event: TelemetryEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(event) {
            metrics::record_telemetry_dropped();
            tracing::debug!(error = %e, "Telemetry event dropped");
        }
    }

    /// Bind this handle to a request id.
    pub fn for_request(&self, request_id: impl Into<String>) -> RequestTelemetry {
        RequestTelemetry {
            request_id: request_id.into(),
            telemetry: self.clone(),
        }
    }
}

/// Emitter scoped to a single request.
#[derive(Clone, Debug)]
pub struct RequestTelemetry {
    request_id: String,
    telemetry: Telemetry,
}

impl RequestTelemetry {
    /// Start an event carrying this request's id.
    pub fn event(&self, kind: EventKind) -> TelemetryEvent {
        TelemetryEvent::new(kind, self.request_id.clone())
    }

    pub fn emit(&self, event: TelemetryEvent) {
        self.telemetry.emit(event);
    }

    /// Shorthand for an event without payload.
    pub fn mark(&self, kind: EventKind) {
        self.emit(self.event(kind));
    }
}
