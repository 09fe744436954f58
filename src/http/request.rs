//! Request snapshot.
//!
//! # Responsibilities
//! - Rebuild the absolute request URL (scheme, host, path, query)
//! - Capture method, headers, body and the raw cookie header once
//! - Carry the request id minted by the request-id layer
//!
//! # Design Decisions
//! - The snapshot is immutable; later stages never see the live request
//! - Scheme comes from `x-forwarded-proto` when a fronting proxy sets it

use axum::http::{header, request::Parts, HeaderMap, Method};
use bytes::Bytes;
use serde_json::{Map, Value};
use url::Url;

/// Request id header, set by `SetRequestIdLayer`.
pub const X_REQUEST_ID: &str = "x-request-id";

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Immutable per-request snapshot.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub cookie_header: Option<String>,
    /// Buffered request body, forwarded to the renderer.
    pub body: Bytes,
}

impl RequestContext {
    /// Build the snapshot from request parts.
    ///
    /// `default_scheme` applies when no forwarded proto is present and
    /// `fallback_host` when the request carries no Host header.
    pub fn from_parts(
        parts: &Parts,
        default_scheme: &str,
        fallback_host: &str,
    ) -> Result<Self, url::ParseError> {
        let headers = parts.headers.clone();

        let scheme = header_str(&headers, X_FORWARDED_PROTO)
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(default_scheme);

        let host = header_str(&headers, header::HOST.as_str())
            .or_else(|| parts.uri.authority().map(|a| a.as_str()))
            .unwrap_or(fallback_host);

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let url = Url::parse(&format!("{scheme}://{host}{path_and_query}"))?;

        let request_id = header_str(&headers, X_REQUEST_ID)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let cookies: Vec<&str> = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        let cookie_header = if cookies.is_empty() {
            None
        } else {
            Some(cookies.join("; "))
        };

        Ok(Self {
            request_id,
            method: parts.method.clone(),
            url,
            headers,
            cookie_header,
            body: Bytes::new(),
        })
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Scheme and host of the request URL; the unit of authorization.
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn user_agent(&self) -> Option<&str> {
        header_str(&self.headers, header::USER_AGENT.as_str())
    }

    /// Headers as a flat JSON object, for diagnostics.
    pub fn headers_json(&self) -> Value {
        headers_to_json(&self.headers)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Flatten a header map into JSON; repeated headers are joined with ", ".
pub fn headers_to_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ");
        map.insert(name.as_str().to_string(), Value::String(joined));
    }
    Value::Object(map)
}
