//! Response construction.
//!
//! # Responsibilities
//! - Turn terminal access decisions into redirect / forbidden responses
//! - Turn render outcomes into streamed or error responses
//!
//! # Design Decisions
//! - Invalid header material (e.g. a token with control characters) becomes
//!   a 500, never a panic
//! - Shell failures get a generic page, never a partial stream

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::access::AccessDecision;
use crate::render::RenderOutcome;

const ERROR_PAGE: &str = "<!DOCTYPE html><html><head><title>Unexpected Server Error</title></head>\
<body><h1>500 Unexpected Server Error</h1></body></html>";

/// Errors while assembling a response.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("invalid {name} header value")]
    InvalidHeader {
        name: &'static str,
        #[source]
        source: axum::http::header::InvalidHeaderValue,
    },
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Failed to build response");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, ResponseError> {
    HeaderValue::from_str(value).map_err(|source| ResponseError::InvalidHeader { name, source })
}

/// `302` with `Location`, optionally setting a cookie.
pub fn redirect(location: &str, set_cookie: Option<&str>) -> Result<Response, ResponseError> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    response
        .headers_mut()
        .insert(header::LOCATION, header_value("Location", location)?);
    if let Some(cookie) = set_cookie {
        response
            .headers_mut()
            .insert(header::SET_COOKIE, header_value("Set-Cookie", cookie)?);
    }
    Ok(response)
}

/// `403 text/plain "Forbidden"`.
pub fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        [(header::CONTENT_TYPE, "text/plain")],
        "Forbidden",
    )
        .into_response()
}

/// Generic page for renders that failed before the first byte.
pub fn render_failed() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/html")],
        ERROR_PAGE,
    )
        .into_response()
}

/// Response for a decision that does not render, `None` when rendering
/// should proceed.
pub fn from_decision(decision: AccessDecision) -> Option<Response> {
    match decision {
        AccessDecision::Allow | AccessDecision::ProceedDegraded(_) => None,
        AccessDecision::Forbidden => Some(forbidden()),
        AccessDecision::RedirectTo {
            location,
            set_cookie,
        } => Some(
            redirect(&location, set_cookie.as_deref()).unwrap_or_else(IntoResponse::into_response),
        ),
    }
}

/// Response for a render outcome.
pub fn from_outcome(outcome: RenderOutcome) -> Response {
    match outcome {
        RenderOutcome::Responded {
            status,
            headers,
            body,
        } => {
            let mut response = Response::new(body);
            *response.status_mut() = status;
            response.headers_mut().extend(headers);
            response
        }
        RenderOutcome::ShellFailed(_) => render_failed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::DegradeReason;

    #[test]
    fn test_forbidden_shape() {
        let response = forbidden();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn test_redirect_with_cookie() {
        let response = redirect(
            "https://shop.example/",
            Some("userSession=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=86400"),
        )
        .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "https://shop.example/");
        assert!(response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .contains("HttpOnly"));
    }

    #[test]
    fn test_invalid_cookie_is_server_error() {
        let response = from_decision(AccessDecision::RedirectTo {
            location: "https://shop.example/".into(),
            set_cookie: Some("userSession=bad\nvalue".into()),
        })
        .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rendering_decisions_have_no_response() {
        assert!(from_decision(AccessDecision::Allow).is_none());
        assert!(from_decision(AccessDecision::ProceedDegraded(DegradeReason::AssetPath)).is_none());
    }
}
