//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GateConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Environment variables that override file settings.
pub const ENV_PRODUCTION: &str = "GATE_PRODUCTION";
pub const ENV_AUTH_HOST: &str = "GATE_AUTH_HOST";
pub const ENV_TELEMETRY_SINK: &str = "GATE_TELEMETRY_SINK";
pub const ENV_RENDER_UPSTREAM: &str = "GATE_RENDER_UPSTREAM";
pub const ENV_BIND_ADDR: &str = "GATE_BIND_ADDR";

/// Load configuration: defaults, then the optional TOML file, then the
/// process environment. The result is validated before it is returned.
pub fn load_config(path: Option<&Path>) -> Result<GateConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GateConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply overrides using `lookup` as the variable source.
pub fn apply_env_overrides<F>(config: &mut GateConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(ENV_PRODUCTION) {
        config.deployment.production = parse_flag(&value);
    }
    if let Some(host) = lookup(ENV_AUTH_HOST) {
        config.authority.host = host.trim().trim_end_matches('/').to_string();
    }
    if let Some(sink) = lookup(ENV_TELEMETRY_SINK) {
        let sink = sink.trim().to_string();
        config.telemetry.enabled = !sink.is_empty();
        config.telemetry.sink_url = sink;
    }
    if let Some(upstream) = lookup(ENV_RENDER_UPSTREAM) {
        config.render.upstream_url = upstream.trim().to_string();
    }
    if let Some(addr) = lookup(ENV_BIND_ADDR) {
        config.listener.bind_address = addr.trim().to_string();
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1")
}
