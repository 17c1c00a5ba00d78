//! Backend dialer for the engine's Unix socket.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::net::UnixStream;

use crate::config::BackendConfig;

#[derive(Debug, Error)]
#[error("error connecting to backend {path:?}: {source}")]
pub struct DialError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Opens one connection to the engine socket per approved request.
#[derive(Debug, Clone)]
pub struct BackendDialer {
    socket_path: PathBuf,
}

impl BackendDialer {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            socket_path: config.socket_path.clone(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn dial(&self) -> Result<UnixStream, DialError> {
        UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| DialError {
                path: self.socket_path.clone(),
                source,
            })
    }
}
