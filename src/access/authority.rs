//! Authorization service client.
//!
//! # Responsibilities
//! - Ask whether an origin is publicly accessible
//! - Validate a bearer (query token or session) for an origin
//!
//! # Design Decisions
//! - No retries: every call is made once
//! - Every call has a deadline (`authority.timeout_ms`)
//! - Errors are returned, never defaulted; the decision engine owns fallback
//! - Missing response fields read as `false`

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthorityConfig;

/// Errors from the authorization service.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization request failed: {0}")]
    Transport(String),

    #[error("authorization response unreadable: {0}")]
    Decode(String),

    #[error("authorization request timed out after {0:?}")]
    Timeout(Duration),
}

/// Result of a credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    pub allowed: bool,
}

/// Remote authority consulted by the access gate.
#[async_trait]
pub trait Authority: Send + Sync {
    /// Whether `origin` is open to everyone. Callers treat an error as
    /// "not public".
    async fn is_public(&self, origin: &str) -> Result<bool, AuthError>;

    /// Whether `token` grants access to `origin`.
    async fn validate(&self, token: &str, origin: &str) -> Result<Validation, AuthError>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PublicStatus {
    #[serde(rename = "isPublic")]
    is_public: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ValidationResponse {
    allowed: bool,
}

#[derive(Debug, Serialize)]
struct ValidationRequest<'a> {
    token: &'a str,
    url: &'a str,
}

/// HTTP implementation against `{host}/api/website-access`.
#[derive(Clone)]
pub struct HttpAuthority {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpAuthority {
    pub fn new(config: &AuthorityConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/website-access", config.base_url()),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    fn map_error(&self, e: reqwest::Error) -> AuthError {
        if e.is_timeout() {
            AuthError::Timeout(self.timeout)
        } else if e.is_decode() {
            AuthError::Decode(e.to_string())
        } else {
            AuthError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl Authority for HttpAuthority {
    async fn is_public(&self, origin: &str) -> Result<bool, AuthError> {
        let status: PublicStatus = self
            .client
            .get(&self.endpoint)
            .query(&[("url", origin)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_error(e))?
            .json()
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(status.is_public)
    }

    async fn validate(&self, token: &str, origin: &str) -> Result<Validation, AuthError> {
        let response: ValidationResponse = self
            .client
            .post(&self.endpoint)
            .json(&ValidationRequest { token, url: origin })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_error(e))?
            .json()
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(Validation {
            allowed: response.allowed,
        })
    }
}

impl std::fmt::Debug for HttpAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthority")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}
