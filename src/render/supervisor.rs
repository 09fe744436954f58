//! Streaming render supervision.
//!
//! # Responsibilities
//! - Start the engine and wait for the mode's readiness event
//! - Enforce one abort deadline per render
//! - Map pre-readiness failures to a shell failure
//! - Log failures that happen after the response is committed
//!
//! # Completion Rules
//! ```text
//! bot:         AllReady            → Responded (engine status and headers)
//! interactive: ShellReady|AllReady → Responded (engine status and headers)
//! any:         ShellError          → ShellFailed (abort)
//! any:         deadline elapsed    → ShellFailed(Timeout) (abort)
//! any:         Error before ready  → status forced to 500, keep waiting
//! any:         Error after ready   → logged only
//! ```
//!
//! The deadline is dropped as soon as a readiness event wins the race, and
//! nothing from the engine is observed once the deadline wins.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use bytes::Bytes;
use futures_util::stream;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

use crate::http::request::RequestContext;
use crate::observability::metrics;
use crate::render::engine::{
    RenderEngine, RenderError, RenderEvent, RenderHandle, RenderHead, RenderMode, RenderRequest,
};

/// Result of one supervised render.
pub enum RenderOutcome {
    Responded {
        status: StatusCode,
        headers: HeaderMap,
        body: Body,
    },
    ShellFailed(RenderError),
}

impl std::fmt::Debug for RenderOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Responded { status, headers, .. } => f
                .debug_struct("Responded")
                .field("status", status)
                .field("headers", headers)
                .finish_non_exhaustive(),
            Self::ShellFailed(e) => f.debug_tuple("ShellFailed").field(e).finish(),
        }
    }
}

/// Wraps a [`RenderEngine`] with the readiness/deadline contract.
#[derive(Clone)]
pub struct RenderSupervisor {
    engine: Arc<dyn RenderEngine>,
    abort_delay: Duration,
}

impl RenderSupervisor {
    pub fn new(engine: Arc<dyn RenderEngine>, abort_delay: Duration) -> Self {
        Self { engine, abort_delay }
    }

    /// Render `ctx.url` in `mode`. Produces exactly one outcome.
    pub async fn render(&self, ctx: &RequestContext, mode: RenderMode) -> RenderOutcome {
        let started = Instant::now();
        let RenderHandle {
            mut events,
            body,
            abort,
        } = self.engine.start(RenderRequest::from(ctx), mode);

        let mut errored = false;
        let deadline = tokio::time::sleep(self.abort_delay);
        tokio::pin!(deadline);

        let head = loop {
            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Some(RenderEvent::AllReady(head)) => break head,
                    Some(RenderEvent::ShellReady(head)) if mode == RenderMode::Interactive => break head,
                    Some(RenderEvent::ShellReady(_)) => {
                        tracing::trace!(request_id = %ctx.request_id, "Shell ready, waiting for all content");
                    }
                    Some(RenderEvent::Error(e)) => {
                        errored = true;
                        tracing::debug!(request_id = %ctx.request_id, error = %e, "Render error before readiness");
                    }
                    Some(RenderEvent::ShellError(e)) => {
                        abort.cancel();
                        metrics::record_render(mode.as_str(), "shell_error", started);
                        return RenderOutcome::ShellFailed(e);
                    }
                    None => {
                        abort.cancel();
                        metrics::record_render(mode.as_str(), "shell_error", started);
                        return RenderOutcome::ShellFailed(RenderError::Shell(
                            "engine stopped before readiness".to_string(),
                        ));
                    }
                },

                () = &mut deadline => {
                    abort.cancel();
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        mode = mode.as_str(),
                        deadline = ?self.abort_delay,
                        "Render aborted before readiness"
                    );
                    metrics::record_render(mode.as_str(), "timeout", started);
                    return RenderOutcome::ShellFailed(RenderError::Timeout(self.abort_delay));
                }
            }
        };

        let RenderHead {
            mut status,
            mut headers,
        } = head;
        if errored {
            status = StatusCode::INTERNAL_SERVER_ERROR;
        }
        headers
            .entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("text/html"));

        metrics::record_render(mode.as_str(), "ready", started);
        tracing::debug!(
            request_id = %ctx.request_id,
            mode = mode.as_str(),
            elapsed = ?started.elapsed(),
            status = %status,
            "Render ready"
        );

        // Headers are committed from here on; later errors can only be logged.
        let request_id = ctx.request_id.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let RenderEvent::Error(e) | RenderEvent::ShellError(e) = event {
                    tracing::error!(request_id = %request_id, error = %e, "Render failed mid-stream");
                }
            }
        });

        RenderOutcome::Responded {
            status,
            headers,
            body: body_stream(body, abort.drop_guard()),
        }
    }
}

/// Response body fed by the engine. Dropping the body (client gone) aborts
/// the render.
fn body_stream(rx: mpsc::UnboundedReceiver<Bytes>, guard: DropGuard) -> Body {
    let chunks = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let chunk = rx.recv().await?;
        Some((Ok::<_, Infallible>(chunk), (rx, guard)))
    });
    Body::from_stream(chunks)
}
