//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the render gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address, URL reconstruction).
    pub listener: ListenerConfig,

    /// Deployment mode and access-control bypass rules.
    pub deployment: DeploymentConfig,

    /// Remote authorization service.
    pub authority: AuthorityConfig,

    /// Out-of-band diagnostic event sink.
    pub telemetry: TelemetryConfig,

    /// Streaming render supervision.
    pub render: RenderConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl GateConfig {
    /// Whether the access-control engine runs at all.
    pub fn is_production(&self) -> bool {
        self.deployment.production
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Scheme used to rebuild the request URL when `x-forwarded-proto` is absent.
    pub default_scheme: String,

    /// Largest request body buffered for forwarding to the renderer.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            default_scheme: "http".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Deployment configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Production deployments enforce access control.
    pub production: bool,

    /// Path prefixes that never go through access control.
    pub asset_prefixes: Vec<String>,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            production: false,
            asset_prefixes: vec!["/build/".to_string(), "/assets/".to_string()],
        }
    }
}

/// Authorization service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Base URL of the authorization service (also hosts the login page).
    pub host: String,

    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,

    /// Name of the cookie carrying the session bearer.
    pub session_cookie: String,

    /// Name of the query parameter carrying a one-time access token.
    pub token_param: String,

    /// Max-Age of the session cookie set on token promotion.
    pub session_max_age_secs: u64,
}

impl AuthorityConfig {
    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.host.trim_end_matches('/')
    }
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            timeout_ms: 5_000,
            session_cookie: "userSession".to_string(),
            token_param: "authToken".to_string(),
            session_max_age_secs: 60 * 60 * 24,
        }
    }
}

/// Telemetry sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Enable diagnostic event emission.
    pub enabled: bool,

    /// Endpoint receiving one JSON POST per event.
    pub sink_url: String,

    /// Events buffered before new ones are dropped.
    pub queue_capacity: usize,

    /// Per-event delivery timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sink_url: String::new(),
            queue_capacity: 1024,
            timeout_ms: 2_000,
        }
    }
}

/// Render supervision configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Hard deadline for a readiness event, in milliseconds.
    pub abort_delay_ms: u64,

    /// HTML render server the default engine streams from.
    pub upstream_url: String,

    /// Static rendering mode; forces the bot strategy for every request.
    pub spa_mode: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            abort_delay_ms: 5_000,
            upstream_url: "http://127.0.0.1:3001".to_string(),
            spa_mode: false,
        }
    }
}

/// Timeout configuration for the outer request lifecycle.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
