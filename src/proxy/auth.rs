//! Authorization gate.
//!
//! Every inbound request is checked by a remote authentication service before
//! anything touches the engine socket. The two credential headers are copied
//! onto a `GET` to the configured endpoint and the JSON answer
//! `{"status": ..., "message": ...}` decides the request's fate:
//!
//! | Outcome | Client sees |
//! |---|---|
//! | request could not be sent / body cut short | 501, error text |
//! | body is not the expected JSON | 501, `Internal server error` |
//! | `status == "error"` | 401, `message` |
//! | anything else | request is relayed |
//!
//! The HTTP status of the authentication response is ignored. Nothing is
//! cached, retried or timed out.

use std::future::Future;

use reqwest::header::{HeaderName, HeaderValue};
use serde::Deserialize;
use thiserror::Error;

use crate::config::AuthConfig;
use crate::http::request::RequestHead;

/// Body text for undecodable authentication responses.
pub const MALFORMED_BODY: &str = "Internal server error";

/// Errors from the authentication round trip.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The service could not be reached or its body not read.
    #[error("{}", error_chain(.0))]
    Unavailable(#[source] reqwest::Error),

    /// The service answered with something other than the expected JSON.
    #[error("{}", MALFORMED_BODY)]
    Malformed(#[source] serde_json::Error),

    #[error("invalid credential header name {0:?}")]
    HeaderName(String),

    #[error("failed to build authentication client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Render an error with all of its sources, outermost first.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

/// The result of asking the authentication service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthVerdict {
    Approved,
    Denied(String),
}

#[derive(Debug, Default, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

impl AuthVerdict {
    /// Decode a verdict from the service's response body.
    ///
    /// Missing fields read as empty strings and a JSON `null` body as an
    /// empty object, so both approve.
    pub fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        let response: Option<AuthResponse> = serde_json::from_slice(body)?;
        let response = response.unwrap_or_default();

        if response.status == "error" {
            Ok(AuthVerdict::Denied(response.message))
        } else {
            Ok(AuthVerdict::Approved)
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AuthVerdict::Approved => "approved",
            AuthVerdict::Denied(_) => "denied",
        }
    }
}

/// Names of the headers carrying credentials, inbound and outbound alike.
#[derive(Debug, Clone)]
pub struct CredentialHeaders {
    pub token: HeaderName,
    pub user_id: HeaderName,
}

impl CredentialHeaders {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let parse = |name: &str| {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| AuthError::HeaderName(name.to_string()))
        };
        Ok(Self {
            token: parse(&config.token_header)?,
            user_id: parse(&config.user_header)?,
        })
    }
}

/// Credential header values lifted from a request, unvalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: HeaderValue,
    pub user_id: HeaderValue,
}

impl Credentials {
    /// Copy the credential headers out of a request head.
    ///
    /// An absent header is forwarded as an empty value.
    pub fn from_head(head: &RequestHead, names: &CredentialHeaders) -> Self {
        let value = |name: &HeaderName| {
            head.header(name.as_str())
                .and_then(|v| HeaderValue::from_bytes(v).ok())
                .unwrap_or_else(|| HeaderValue::from_static(""))
        };
        Self {
            token: value(&names.token),
            user_id: value(&names.user_id),
        }
    }
}

/// Something that can pass judgement on a request head.
pub trait Authorize: Send + Sync {
    fn authorize(
        &self,
        head: &RequestHead,
    ) -> impl Future<Output = Result<AuthVerdict, AuthError>> + Send;
}

/// Client for the remote authentication service.
#[derive(Debug, Clone)]
pub struct AuthGate {
    client: reqwest::Client,
    endpoint: String,
    headers: CredentialHeaders,
}

impl AuthGate {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(AuthError::Client)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            headers: CredentialHeaders::from_config(config)?,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn credential_headers(&self) -> &CredentialHeaders {
        &self.headers
    }

    /// Ask the service about one set of credentials.
    pub async fn check(&self, credentials: &Credentials) -> Result<AuthVerdict, AuthError> {
        let response = self
            .client
            .get(&self.endpoint)
            .header(self.headers.token.clone(), credentials.token.clone())
            .header(self.headers.user_id.clone(), credentials.user_id.clone())
            .send()
            .await
            .map_err(AuthError::Unavailable)?;

        tracing::trace!(status = %response.status(), "Authentication service answered");

        let body = response.bytes().await.map_err(AuthError::Unavailable)?;
        AuthVerdict::from_body(&body).map_err(AuthError::Malformed)
    }
}

impl Authorize for AuthGate {
    async fn authorize(&self, head: &RequestHead) -> Result<AuthVerdict, AuthError> {
        let credentials = Credentials::from_head(head, &self.headers);
        self.check(&credentials).await
    }
}
