//! Accept loop and per-connection entry point.
//!
//! # Responsibilities
//! - Accept connections from the bounded listener
//! - Terminate TLS when configured
//! - Read the request head by hand so the transport stays detachable
//! - Hand each exchange to the gate, one task per connection
//!
//! # Design Decisions
//! - No HTTP framework sits between the socket and the gate; a framework
//!   would own the connection and could not give it up mid-request
//! - Connection tasks are detached: shutdown stops accepting, it does not
//!   interrupt relays already running

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::connection::ClientConnection;
use crate::http::request::read_head;
use crate::http::response;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::net::tls::load_tls_acceptor;
use crate::observability::metrics;
use crate::proxy::{AuthGate, BackendDialer, Gate};

/// Initial capacity of the per-connection head buffer.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Shared, read-only state for every connection task.
struct ServerInner {
    gate: Gate<AuthGate>,
    tls: Option<TlsAcceptor>,
    max_header_bytes: usize,
    tracker: ConnectionTracker,
}

/// The gate's network front.
pub struct ProxyServer {
    inner: Arc<ServerInner>,
}

impl ProxyServer {
    /// Build the server from a validated configuration.
    ///
    /// Loads TLS material when both certificate and key are configured.
    pub fn new(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let authorizer = AuthGate::new(&config.auth)?;
        let gate = Gate::new(
            authorizer,
            BackendDialer::new(&config.backend),
            config.backend.reply_on_dial_failure,
        );

        let tls = match &config.listener.tls {
            Some(tls) => Some(load_tls_acceptor(&tls.cert_path, &tls.key_path)?),
            None => None,
        };

        Ok(Self {
            inner: Arc::new(ServerInner {
                gate,
                tls,
                max_header_bytes: config.listener.max_header_bytes,
                tracker: ConnectionTracker::new(),
            }),
        })
    }

    pub fn is_tls(&self) -> bool {
        self.inner.tls.is_some()
    }

    /// Handle onto the live-connection count.
    pub fn tracker(&self) -> ConnectionTracker {
        self.inner.tracker.clone()
    }

    /// Accept connections until `shutdown` fires.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(
            address = %addr,
            tls = self.is_tls(),
            auth_endpoint = self.inner.gate.authorizer().endpoint(),
            "Gate accepting connections"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        metrics::record_connection();
                        let guard = self.inner.tracker.track();
                        let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);
                        let inner = Arc::clone(&self.inner);

                        tokio::spawn(
                            async move {
                                inner.handle(stream, peer).await;
                                drop(guard);
                                drop(permit);
                            }
                            .instrument(span),
                        );
                    }
                    Err(ListenerError::Closed) => return Err(ListenerError::Closed),
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Accept loop stopping");
                    break;
                }
            }
        }

        Ok(())
    }
}

impl ServerInner {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) {
        match &self.tls {
            Some(acceptor) => match acceptor.accept(stream).await {
                Ok(tls) => self.serve_stream(tls, peer).await,
                Err(e) => tracing::debug!(error = %e, "TLS handshake failed"),
            },
            None => self.serve_stream(stream, peer).await,
        }
    }

    async fn serve_stream<S>(&self, mut io: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        let head = match read_head(&mut io, &mut buf, self.max_header_bytes).await {
            Ok(Some(head)) => head,
            Ok(None) => {
                tracing::trace!("Client closed before sending a request");
                return;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Unreadable request head");
                if let Some(status) = e.status() {
                    let reason = status.canonical_reason().unwrap_or("");
                    if response::write_error(&mut io, status, reason).await.is_ok() {
                        let _ = io.shutdown().await;
                    }
                }
                metrics::record_exchange("bad_request");
                return;
            }
        };

        tracing::debug!(
            method = head.method(),
            target = head.target(),
            version = head.version(),
            "Request received"
        );

        let exchange = ClientConnection::new(io, head, buf, peer);
        let outcome = self.gate.serve(exchange).await;
        tracing::debug!(outcome = outcome.label(), "Connection finished");
        metrics::record_exchange(outcome.label());
    }
}
