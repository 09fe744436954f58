//! Render engine backed by an upstream HTML render server.
//!
//! # Event Mapping
//! ```text
//! connect error / 5xx status        → ShellError
//! response headers received         → ShellReady(status, headers)
//! body fully received               → AllReady(status, headers)
//! body error after ShellReady       → Error (interactive)
//! body error before AllReady (bot)  → ShellError
//! ```
//!
//! The request goes upstream with its method, body and end-to-end headers.
//! Status and end-to-end headers of the upstream response (404 pages,
//! `Cache-Control`, `Set-Cookie`, redirects) are passed through unchanged.
//! In bot mode the body is buffered and only released after AllReady.

use axum::http::{HeaderMap, HeaderValue};
use bytes::Bytes;
use futures_util::StreamExt;
use url::Url;

use crate::render::engine::{
    RenderEngine, RenderError, RenderEvent, RenderHandle, RenderHead, RenderMode, RenderRequest,
    RenderSink,
};

const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_RENDER_MODE: &str = "x-render-mode";

/// Connection-scoped headers that never cross the gate, plus the ones the
/// client library recomputes.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn end_to_end(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in HOP_BY_HOP {
        forwarded.remove(*name);
    }
    forwarded
}

/// Streams documents from `base` + request path and query.
///
/// The client must not follow redirects; upstream redirects are responses.
#[derive(Clone, Debug)]
pub struct UpstreamEngine {
    client: reqwest::Client,
    base: Url,
}

impl UpstreamEngine {
    pub fn new(base: Url, client: reqwest::Client) -> Self {
        Self { client, base }
    }

    /// Upstream URL serving `url`: same path and query on the upstream host.
    pub fn target_for(&self, url: &Url) -> Url {
        let mut target = self.base.clone();
        target.set_path(url.path());
        target.set_query(url.query());
        target
    }

    fn upstream_request(&self, request: &RenderRequest, mode: RenderMode) -> reqwest::RequestBuilder {
        let mut headers = end_to_end(&request.headers);
        if let Some(host) = request.url.host_str() {
            let host = match request.url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&host) {
                headers.insert(X_FORWARDED_HOST, value);
            }
        }
        if let Ok(value) = HeaderValue::from_str(request.url.scheme()) {
            headers.insert(X_FORWARDED_PROTO, value);
        }
        headers.insert(X_RENDER_MODE, HeaderValue::from_static(mode.as_str()));

        let builder = self
            .client
            .request(request.method.clone(), self.target_for(&request.url))
            .headers(headers);
        if request.body.is_empty() {
            builder
        } else {
            builder.body(request.body.clone())
        }
    }
}

impl RenderEngine for UpstreamEngine {
    fn start(&self, request: RenderRequest, mode: RenderMode) -> RenderHandle {
        let (sink, handle) = RenderHandle::channel();
        let target = self.target_for(&request.url);
        let upstream = self.upstream_request(&request, mode);

        tokio::spawn(async move {
            tokio::select! {
                _ = sink.aborted() => {
                    tracing::debug!(target = %target, "Upstream render aborted");
                }
                _ = fetch(upstream, mode, &sink) => {}
            }
        });

        handle
    }
}

async fn fetch(upstream: reqwest::RequestBuilder, mode: RenderMode, sink: &RenderSink) {
    let response = match upstream.send().await {
        Ok(response) if response.status().is_server_error() => {
            sink.event(RenderEvent::ShellError(RenderError::Shell(format!(
                "upstream returned {}",
                response.status()
            ))));
            return;
        }
        Ok(response) => response,
        Err(e) => {
            sink.event(RenderEvent::ShellError(RenderError::Shell(e.to_string())));
            return;
        }
    };

    let head = RenderHead::new(response.status(), end_to_end(response.headers()));
    let mut chunks = response.bytes_stream();
    match mode {
        RenderMode::Interactive => {
            if !sink.event(RenderEvent::ShellReady(head.clone())) {
                return;
            }
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(bytes) => {
                        if !sink.chunk(bytes) {
                            return;
                        }
                    }
                    Err(e) => {
                        sink.event(RenderEvent::Error(RenderError::Stream(e.to_string())));
                        return;
                    }
                }
            }
            sink.event(RenderEvent::AllReady(head));
        }
        RenderMode::Bot => {
            let mut buffered: Vec<Bytes> = Vec::new();
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(bytes) => buffered.push(bytes),
                    Err(e) => {
                        sink.event(RenderEvent::ShellError(RenderError::Shell(e.to_string())));
                        return;
                    }
                }
            }
            if !sink.event(RenderEvent::AllReady(head)) {
                return;
            }
            for bytes in buffered {
                if !sink.chunk(bytes) {
                    return;
                }
            }
        }
    }
}
