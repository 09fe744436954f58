//! HTTP server setup and the gate handler.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all gate handler
//! - Wire up middleware (request ID, tracing, timeout)
//! - Run access control, then the render supervisor
//! - Emit request-correlated telemetry at every branch

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use url::Url;

use crate::access::{AccessGate, AccessSettings, Authority, HttpAuthority};
use crate::config::GateConfig;
use crate::http::request::{headers_to_json, RequestContext};
use crate::http::response;
use crate::observability::metrics;
use crate::observability::{EventKind, Telemetry};
use crate::render::{
    BotClassifier, ModeSelector, PatternClassifier, RenderEngine, RenderOutcome, RenderSupervisor,
    UpstreamEngine,
};

/// External collaborators of the gate.
#[derive(Clone)]
pub struct Collaborators {
    pub authority: Arc<dyn Authority>,
    pub engine: Arc<dyn RenderEngine>,
    pub classifier: Option<Arc<dyn BotClassifier>>,
    pub telemetry: Telemetry,
}

/// Failure to assemble the production collaborators.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid render upstream URL: {0}")]
    UpstreamUrl(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl Collaborators {
    /// Production collaborators built from configuration. Spawns the
    /// telemetry worker, so it must run inside a Tokio runtime.
    pub fn from_config(config: &GateConfig) -> Result<Self, SetupError> {
        let client = reqwest::Client::new();
        let upstream = Url::parse(&config.render.upstream_url)?;
        let render_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            authority: Arc::new(HttpAuthority::new(&config.authority, client.clone())),
            engine: Arc::new(UpstreamEngine::new(upstream, render_client)),
            classifier: Some(Arc::new(PatternClassifier::default())),
            telemetry: Telemetry::spawn(&config.telemetry, client),
        })
    }
}

/// Request-path logic shared by every handler invocation.
pub struct GateService {
    config: GateConfig,
    access: AccessGate,
    supervisor: RenderSupervisor,
    modes: ModeSelector,
    telemetry: Telemetry,
}

impl GateService {
    pub fn new(config: GateConfig, collaborators: Collaborators) -> Self {
        let access = AccessGate::new(AccessSettings::from(&config), collaborators.authority);
        let supervisor = RenderSupervisor::new(
            collaborators.engine,
            Duration::from_millis(config.render.abort_delay_ms),
        );
        let modes = ModeSelector::new(collaborators.classifier, config.render.spa_mode);

        Self {
            config,
            access,
            supervisor,
            modes,
            telemetry: collaborators.telemetry,
        }
    }

    /// Gate one request: decide, then either short-circuit or render.
    pub async fn handle(&self, ctx: RequestContext) -> Response {
        let telemetry = self.telemetry.for_request(ctx.request_id.clone());
        telemetry.emit(
            telemetry
                .event(EventKind::RequestStart)
                .with("url", ctx.url.as_str())
                .with("method", ctx.method.as_str())
                .with("headers", ctx.headers_json()),
        );

        let mode = self.modes.select(ctx.user_agent());
        let decision = self.access.decide(&ctx, &telemetry).await;
        metrics::record_decision(decision.label());
        tracing::debug!(
            request_id = %ctx.request_id,
            decision = decision.label(),
            mode = mode.as_str(),
            "Access decided"
        );

        if let Some(denied) = response::from_decision(decision) {
            return denied;
        }

        let outcome = self.supervisor.render(&ctx, mode).await;
        if let RenderOutcome::ShellFailed(e) = &outcome {
            tracing::error!(request_id = %ctx.request_id, error = %e, "Render failed before first byte");
            telemetry.emit(
                telemetry
                    .event(EventKind::RenderShellError)
                    .with("error", e.to_string()),
            );
        }

        let response = response::from_outcome(outcome);
        telemetry.emit(
            telemetry
                .event(EventKind::RequestComplete)
                .with("status", response.status().as_u16())
                .with("headers", headers_to_json(response.headers())),
        );
        response
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GateService>,
}

/// HTTP server for the render gate.
pub struct GateServer {
    router: Router,
    service: Arc<GateService>,
}

impl GateServer {
    /// Create a server with explicit collaborators.
    pub fn new(config: GateConfig, collaborators: Collaborators) -> Self {
        let service = Arc::new(GateService::new(config, collaborators));
        let router = Self::build_router(service.clone());
        Self { router, service }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(service: Arc<GateService>) -> Router {
        let request_timeout = Duration::from_secs(service.config().timeouts.request_secs);
        Router::new()
            .route("/{*path}", any(gate_handler))
            .route("/", any(gate_handler))
            .with_state(AppState { service })
            .layer(TimeoutLayer::new(request_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for serving with a custom listener or in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            production = self.service.config().is_production(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &GateConfig {
        self.service.config()
    }
}

/// Catch-all handler: snapshot the request and hand it to the service.
async fn gate_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let config = state.service.config();

    let body = match axum::body::to_bytes(body, config.listener.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(error = %e, uri = %parts.uri, "Request body rejected");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response();
        }
    };

    let ctx = match RequestContext::from_parts(
        &parts,
        &config.listener.default_scheme,
        &config.listener.bind_address,
    ) {
        Ok(ctx) => ctx.with_body(body),
        Err(e) => {
            tracing::warn!(error = %e, uri = %parts.uri, "Unparseable request URL");
            return (StatusCode::BAD_REQUEST, "Bad Request").into_response();
        }
    };

    // Detached so a client disconnect does not cancel in-flight authority calls.
    let service = state.service.clone();
    match tokio::spawn(async move { service.handle(ctx).await }).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Gate task failed");
            response::render_failed()
        }
    }
}
