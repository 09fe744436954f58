//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Require an authorization host whenever access control is enforced
//! - Validate value ranges (timeouts > 0, prefixes absolute)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::GateConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("authority.host is required in production")]
    MissingAuthorityHost,

    #[error("{field} is not a valid http(s) URL: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    #[error("asset prefix must start with '/': {0}")]
    RelativeAssetPrefix(String),

    #[error("telemetry.queue_capacity must be greater than zero")]
    EmptyTelemetryQueue,
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.deployment.production {
        if config.authority.host.trim().is_empty() {
            errors.push(ValidationError::MissingAuthorityHost);
        } else if !is_http_url(&config.authority.host) {
            errors.push(ValidationError::InvalidUrl {
                field: "authority.host",
                value: config.authority.host.clone(),
            });
        }
    }

    if config.telemetry.enabled {
        if !is_http_url(&config.telemetry.sink_url) {
            errors.push(ValidationError::InvalidUrl {
                field: "telemetry.sink_url",
                value: config.telemetry.sink_url.clone(),
            });
        }
        if config.telemetry.queue_capacity == 0 {
            errors.push(ValidationError::EmptyTelemetryQueue);
        }
        if config.telemetry.timeout_ms == 0 {
            errors.push(ValidationError::ZeroDuration("telemetry.timeout_ms"));
        }
    }

    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroLimit("listener.max_body_bytes"));
    }

    if config.authority.timeout_ms == 0 {
        errors.push(ValidationError::ZeroDuration("authority.timeout_ms"));
    }
    if config.render.abort_delay_ms == 0 {
        errors.push(ValidationError::ZeroDuration("render.abort_delay_ms"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroDuration("timeouts.request_secs"));
    }

    for prefix in &config.deployment.asset_prefixes {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::RelativeAssetPrefix(prefix.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
