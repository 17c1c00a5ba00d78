//! Per-connection sequencing: authorize, dial, hijack, relay.
//!
//! The phases run strictly in that order and each failure ends the exchange
//! on the spot. Only the gate's own refusals produce an HTTP response; once
//! the transport is hijacked the client only ever sees engine bytes.

use hyper::StatusCode;

use crate::observability::metrics;
use crate::proxy::auth::{AuthError, AuthVerdict, Authorize, MALFORMED_BODY};
use crate::proxy::backend::BackendDialer;
use crate::proxy::hijack::{Exchange, HijackError};
use crate::proxy::relay::{RelayOutcome, RelayPair};

/// Body of the 500 sent when the transport cannot be detached.
pub const HIJACK_ERROR_BODY: &str = "hijack error";

/// How one exchange ended.
#[derive(Debug)]
pub enum ExchangeOutcome {
    /// 401 sent with the service's message.
    Denied,
    /// 501 sent with the transport error text.
    AuthUnavailable,
    /// 501 sent with a generic body.
    AuthMalformed,
    /// Engine socket could not be dialed.
    DialFailed,
    /// 500 sent; the exchange could not give up its transport.
    HijackUnsupported,
    /// Transport was already gone; nothing sent. Guards against a second hijack
    /// of the same exchange.
    HijackFailed,
    /// The original request could not be replayed to the engine.
    ForwardFailed,
    /// Bytes were relayed until one side finished.
    Relayed(RelayOutcome),
}

impl ExchangeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ExchangeOutcome::Denied => "denied",
            ExchangeOutcome::AuthUnavailable => "auth_unavailable",
            ExchangeOutcome::AuthMalformed => "auth_malformed",
            ExchangeOutcome::DialFailed => "dial_failed",
            ExchangeOutcome::HijackUnsupported => "hijack_unsupported",
            ExchangeOutcome::HijackFailed => "hijack_failed",
            ExchangeOutcome::ForwardFailed => "forward_failed",
            ExchangeOutcome::Relayed(_) => "relayed",
        }
    }
}

/// The authorization-gated path from an inbound exchange to the engine.
#[derive(Debug, Clone)]
pub struct Gate<A> {
    authorizer: A,
    dialer: BackendDialer,
    reply_on_dial_failure: bool,
}

impl<A: Authorize> Gate<A> {
    pub fn new(authorizer: A, dialer: BackendDialer, reply_on_dial_failure: bool) -> Self {
        Self {
            authorizer,
            dialer,
            reply_on_dial_failure,
        }
    }

    pub fn authorizer(&self) -> &A {
        &self.authorizer
    }

    /// Drive one exchange to completion.
    pub async fn serve<C: Exchange>(&self, mut exchange: C) -> ExchangeOutcome {
        let verdict = self.authorizer.authorize(exchange.head()).await;
        match verdict {
            Ok(AuthVerdict::Approved) => {
                tracing::debug!(
                    method = exchange.head().method(),
                    target = exchange.head().target(),
                    "Request approved"
                );
            }
            Ok(AuthVerdict::Denied(message)) => {
                tracing::debug!(message = %message, "Request denied");
                reply(&mut exchange, StatusCode::UNAUTHORIZED, &message).await;
                return ExchangeOutcome::Denied;
            }
            Err(AuthError::Malformed(e)) => {
                tracing::debug!(error = %e, "Undecodable authentication response");
                reply(&mut exchange, StatusCode::NOT_IMPLEMENTED, MALFORMED_BODY).await;
                return ExchangeOutcome::AuthMalformed;
            }
            Err(e) => {
                let text = e.to_string();
                tracing::debug!(error = %text, "Authentication service unavailable");
                reply(&mut exchange, StatusCode::NOT_IMPLEMENTED, &text).await;
                return ExchangeOutcome::AuthUnavailable;
            }
        }

        let backend = match self.dialer.dial().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "Backend dial failed");
                if self.reply_on_dial_failure {
                    reply(&mut exchange, StatusCode::BAD_GATEWAY, "Bad Gateway").await;
                }
                return ExchangeOutcome::DialFailed;
            }
        };

        let detached = match exchange.hijack() {
            Ok(detached) => detached,
            Err(HijackError::Unsupported) => {
                reply(&mut exchange, StatusCode::INTERNAL_SERVER_ERROR, HIJACK_ERROR_BODY).await;
                return ExchangeOutcome::HijackUnsupported;
            }
            Err(e) => {
                tracing::warn!(error = %e, "hijack error");
                return ExchangeOutcome::HijackFailed;
            }
        };
        drop(exchange);

        metrics::relay_started();
        match RelayPair::new(detached, backend).run().await {
            Ok(outcome) => {
                let bytes = outcome.bytes;
                metrics::relay_finished(bytes.client_to_backend, bytes.backend_to_client);
                if outcome.is_clean() {
                    tracing::debug!(
                        finished = outcome.finished.label(),
                        client_to_backend = bytes.client_to_backend,
                        backend_to_client = bytes.backend_to_client,
                        "Relay finished"
                    );
                } else if let Err(e) = &outcome.result {
                    tracing::warn!(finished = outcome.finished.label(), error = %e, "Relay copy failed");
                }
                ExchangeOutcome::Relayed(outcome)
            }
            Err(e) => {
                metrics::relay_finished(0, 0);
                tracing::error!(error = %e, "Relay aborted");
                ExchangeOutcome::ForwardFailed
            }
        }
    }
}

async fn reply<C: Exchange>(exchange: &mut C, status: StatusCode, body: &str) {
    if let Err(e) = exchange.reply(status, body).await {
        tracing::debug!(status = %status, error = %e, "Failed to write error response");
    }
}
