//! Command-line flags.
//!
//! Flags mirror the long-standing single-letter surface (`-d`, `-l`, `-D`,
//! `-i`) and are layered on top of an optional TOML config file.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{read_config, ConfigError};
use crate::config::validation::validate_config;
use crate::config::{ProxyConfig, TlsConfig};

#[derive(Debug, Parser)]
#[command(name = "engine-gate")]
#[command(about = "Authorizing proxy in front of a container engine socket", long_about = None)]
pub struct Cli {
    /// Path to the engine socket
    #[arg(short = 'd', value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Listen address
    #[arg(short = 'l', value_name = "ADDR")]
    pub listen: Option<String>,

    /// Path to certificate
    #[arg(long = "cert", value_name = "PATH")]
    pub cert: Option<PathBuf>,

    /// Path to certificate key
    #[arg(long = "key", value_name = "PATH")]
    pub key: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'D')]
    pub debug: bool,

    /// Allow insecure communication
    #[arg(short = 'i')]
    pub insecure_skip_verify: bool,

    /// Authentication endpoint queried for every request
    #[arg(long = "auth-endpoint", value_name = "URL")]
    pub auth_endpoint: Option<String>,

    /// TOML config file; flags take precedence over its values
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Build the validated configuration: file (or defaults), then flags.
    pub fn load_config(&self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => ProxyConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(socket) = &self.socket {
            config.backend.socket_path = socket.clone();
        }
        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let (Some(cert), Some(key)) = (&self.cert, &self.key) {
            config.listener.tls = Some(TlsConfig {
                cert_path: cert.clone(),
                key_path: key.clone(),
            });
        }
        if let Some(endpoint) = &self.auth_endpoint {
            config.auth.endpoint = endpoint.clone();
        }
        if self.debug {
            config.observability.debug = true;
        }
        if self.insecure_skip_verify {
            config.auth.insecure_skip_verify = true;
        }
    }

    /// Things worth telling the operator once logging is up.
    pub fn startup_warnings(&self, config: &ProxyConfig) -> Vec<String> {
        let mut warnings = Vec::new();
        match (&self.cert, &self.key) {
            (Some(_), None) => {
                warnings.push("--cert given without --key; serving plaintext".to_string())
            }
            (None, Some(_)) => {
                warnings.push("--key given without --cert; serving plaintext".to_string())
            }
            _ => {}
        }
        if config.auth.insecure_skip_verify {
            warnings.push(
                "insecure-skip-verify is set but has no effect on any TLS configuration"
                    .to_string(),
            );
        }
        warnings
    }
}
