//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, URLs and header names before anything binds
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use reqwest::header::HeaderName;
use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// Smallest accepted `listener.max_header_bytes`.
pub const MIN_HEADER_BYTES: usize = 1024;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} does not resolve to a socket address")]
    BindAddress(String),

    #[error("listener.max_connections must be greater than zero")]
    ZeroConnections,

    #[error("listener.max_header_bytes must be at least {}", MIN_HEADER_BYTES)]
    HeaderLimit,

    #[error("backend.socket_path must not be empty")]
    EmptySocketPath,

    #[error("auth.endpoint {endpoint:?} is invalid: {reason}")]
    AuthEndpoint { endpoint: String, reason: String },

    #[error("auth.{field} {value:?} is not a valid header name")]
    HeaderName { field: &'static str, value: String },

    #[error("observability.metrics_address {0:?} is not a valid socket address")]
    MetricsAddress(String),
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !config.listener.resolve().is_ok_and(|addrs| !addrs.is_empty()) {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }
    if config.listener.max_header_bytes < MIN_HEADER_BYTES {
        errors.push(ValidationError::HeaderLimit);
    }

    if config.backend.socket_path.as_os_str().is_empty() {
        errors.push(ValidationError::EmptySocketPath);
    }

    if let Err(reason) = check_endpoint(&config.auth.endpoint) {
        errors.push(ValidationError::AuthEndpoint {
            endpoint: config.auth.endpoint.clone(),
            reason,
        });
    }
    for (field, value) in [
        ("token_header", &config.auth.token_header),
        ("user_header", &config.auth.user_header),
    ] {
        if HeaderName::from_bytes(value.as_bytes()).is_err() {
            errors.push(ValidationError::HeaderName {
                field,
                value: value.clone(),
            });
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_endpoint(endpoint: &str) -> Result<(), String> {
    let url = url::Url::parse(endpoint).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme {:?}", other)),
    }
}
