//! Startup errors. Per-connection failures never surface here.

use thiserror::Error;

use crate::config::ConfigError;
use crate::net::listener::ListenerError;
use crate::net::tls::TlsError;
use crate::proxy::auth::AuthError;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("authentication client error: {0}")]
    Auth(#[from] AuthError),

    #[error("metrics exporter error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}
