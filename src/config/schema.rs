//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

/// Authentication endpoint used when neither the config file nor the CLI names one.
pub const DEFAULT_AUTH_ENDPOINT: &str = "http://auth.stackhub.co/api/ping";

/// Root configuration for the gate.
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Engine socket the relay dials after approval.
    pub backend: BackendConfig,

    /// Remote authentication service.
    pub auth: AuthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:2375"). A bare ":port" binds all interfaces.
    pub bind_address: String,

    /// Optional TLS configuration. Absent means plaintext.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Upper bound on the request line plus headers, in bytes.
    pub max_header_bytes: usize,
}

impl ListenerConfig {
    /// `bind_address` with the ":port" shorthand expanded. Host names are kept
    /// and resolved at bind time.
    pub fn bind_target(&self) -> String {
        normalize_bind_address(&self.bind_address)
    }

    /// Resolve the bind target, host names included.
    pub fn resolve(&self) -> std::io::Result<Vec<SocketAddr>> {
        Ok(self.bind_target().to_socket_addrs()?.collect())
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:2375".to_string(),
            tls: None,
            max_connections: 10_000,
            max_header_bytes: 64 * 1024,
        }
    }
}

/// Expand the ":port" shorthand into an all-interfaces address.
pub fn normalize_bind_address(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// Engine backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Unix domain socket exposing the engine API.
    pub socket_path: PathBuf,

    /// Answer 502 when the socket cannot be dialed instead of closing silently.
    pub reply_on_dial_failure: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/var/run/docker.sock"),
            reply_on_dial_failure: false,
        }
    }
}

/// Remote authentication service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// URL queried with GET for every inbound request.
    pub endpoint: String,

    /// Request header carrying the auth token. Forwarded under the same name.
    pub token_header: String,

    /// Request header carrying the user id. Forwarded under the same name.
    pub user_header: String,

    /// Accepted and recorded, but not applied to any TLS configuration.
    pub insecure_skip_verify: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_AUTH_ENDPOINT.to_string(),
            token_header: "X-Auth-Token".to_string(),
            user_header: "X-User-Id".to_string(),
            insecure_skip_verify: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Force debug logging regardless of `log_level`.
    pub debug: bool,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            debug: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
