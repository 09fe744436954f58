//! Rendering engine contract.
//!
//! An engine turns a [`RenderRequest`] into an HTML byte stream. Starting a
//! render yields a [`RenderHandle`]: a readiness/error event channel, the body
//! chunk channel and an abort token. Engines write through the paired
//! [`RenderSink`]. Readiness events carry the [`RenderHead`] the engine wants
//! on the response.

use std::time::Duration;

use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::http::request::RequestContext;

/// What the engine renders: the gated request as the client sent it.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl From<&RequestContext> for RenderRequest {
    fn from(ctx: &RequestContext) -> Self {
        Self {
            url: ctx.url.clone(),
            method: ctx.method.clone(),
            headers: ctx.headers.clone(),
            body: ctx.body.clone(),
        }
    }
}

/// Response status and headers chosen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl RenderHead {
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self { status, headers }
    }
}

impl Default for RenderHead {
    fn default() -> Self {
        Self::new(StatusCode::OK, HeaderMap::new())
    }
}

/// Rendering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// Respond only once all content is ready.
    Bot,
    /// Respond at shell-ready and stream the rest.
    Interactive,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bot => "bot",
            Self::Interactive => "interactive",
        }
    }
}

/// Errors surfaced by a render.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// Failure before the document shell could be produced.
    #[error("shell render failed: {0}")]
    Shell(String),

    /// Failure while streaming after readiness, or a recoverable
    /// failure inside the shell.
    #[error("render stream error: {0}")]
    Stream(String),

    /// No readiness event before the abort deadline.
    #[error("render aborted after {0:?} without readiness")]
    Timeout(Duration),
}

/// Lifecycle signals from an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    ShellReady(RenderHead),
    AllReady(RenderHead),
    ShellError(RenderError),
    Error(RenderError),
}

/// Consumer side of a started render.
#[derive(Debug)]
pub struct RenderHandle {
    pub events: mpsc::UnboundedReceiver<RenderEvent>,
    pub body: mpsc::UnboundedReceiver<Bytes>,
    pub abort: CancellationToken,
}

/// Producer side of a started render.
#[derive(Debug, Clone)]
pub struct RenderSink {
    events: mpsc::UnboundedSender<RenderEvent>,
    body: mpsc::UnboundedSender<Bytes>,
    abort: CancellationToken,
}

impl RenderHandle {
    /// A connected sink/handle pair.
    pub fn channel() -> (RenderSink, RenderHandle) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (body_tx, body) = mpsc::unbounded_channel();
        let abort = CancellationToken::new();
        (
            RenderSink {
                events: events_tx,
                body: body_tx,
                abort: abort.clone(),
            },
            RenderHandle { events, body, abort },
        )
    }
}

impl RenderSink {
    /// Signal an event. Returns false once the consumer is gone or aborted.
    pub fn event(&self, event: RenderEvent) -> bool {
        !self.abort.is_cancelled() && self.events.send(event).is_ok()
    }

    /// Push a body chunk. Returns false once the consumer is gone or aborted.
    pub fn chunk(&self, bytes: Bytes) -> bool {
        !self.abort.is_cancelled() && self.body.send(bytes).is_ok()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    pub fn aborted(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.abort.cancelled()
    }
}

/// Converts a URL into an HTML stream.
pub trait RenderEngine: Send + Sync {
    /// Begin rendering `request`. Must not block; work happens on spawned tasks.
    fn start(&self, request: RenderRequest, mode: RenderMode) -> RenderHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_stops_after_abort() {
        let (sink, mut handle) = RenderHandle::channel();
        assert!(sink.event(RenderEvent::ShellReady(RenderHead::default())));
        assert!(sink.chunk(Bytes::from_static(b"<html>")));

        handle.abort.cancel();
        assert!(sink.is_aborted());
        assert!(!sink.event(RenderEvent::AllReady(RenderHead::default())));
        assert!(!sink.chunk(Bytes::from_static(b"</html>")));

        assert_eq!(
            handle.events.recv().await,
            Some(RenderEvent::ShellReady(RenderHead::default()))
        );
        assert_eq!(handle.body.recv().await, Some(Bytes::from_static(b"<html>")));
    }
}
