//! Byte relay between a hijacked client and the engine socket.
//!
//! # Data Flow
//! ```text
//! client ──(head + buffered body, replayed once)──▶ backend
//! client ◀════════════ two copy loops ════════════▶ backend
//! ```
//!
//! The relay is over as soon as either copy loop ends, by EOF or by error.
//! The other loop is cancelled by dropping it, then both sides are shut down.
//! Each read half is wrapped in a counter, so bytes moved by the cancelled
//! loop are still accounted for.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::proxy::hijack::Detached;

/// Upper bound on flushing a close (e.g. a TLS close_notify) to a stalled peer.
pub const CLOSE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RelayError {
    /// The original request could not be written to the backend.
    #[error("error copying request to target: {0}")]
    Forward(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToBackend,
    BackendToClient,
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::ClientToBackend => "client_to_backend",
            Direction::BackendToClient => "backend_to_client",
        }
    }
}

/// Bytes taken from each side over the whole relay. Client bytes include
/// the replayed request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCounts {
    pub client_to_backend: u64,
    pub backend_to_client: u64,
}

/// How a relay ended: the direction that finished first, its copy result and
/// the traffic in both directions.
#[derive(Debug)]
pub struct RelayOutcome {
    pub finished: Direction,
    pub result: io::Result<u64>,
    pub bytes: ByteCounts,
}

impl RelayOutcome {
    /// Ended by end-of-stream or by the usual ways a peer hangs up.
    pub fn is_clean(&self) -> bool {
        match &self.result {
            Ok(_) => true,
            Err(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
        }
    }
}

/// A hijacked client bound to its backend connection.
///
/// Dropping the pair closes both sides.
pub struct RelayPair<C, B> {
    client: Detached<C>,
    backend: B,
}

impl<C, B> RelayPair<C, B>
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(client: Detached<C>, backend: B) -> Self {
        Self { client, backend }
    }

    /// Replay the original request to the backend, then pump bytes both ways
    /// until one direction ends.
    pub async fn run(self) -> Result<RelayOutcome, RelayError> {
        let (mut client, head, buffered) = self.client.into_parts();
        let mut backend = self.backend;

        if let Err(e) = forward_request(&mut backend, &head, &buffered).await {
            shutdown_quietly(&mut backend).await;
            shutdown_quietly(&mut client).await;
            return Err(RelayError::Forward(e));
        }

        let (client_read, mut client_write) = tokio::io::split(client);
        let (backend_read, mut backend_write) = tokio::io::split(backend);
        let mut client_read = Counted::new(client_read);
        let mut backend_read = Counted::new(backend_read);

        let (finished, result) = tokio::select! {
            result = tokio::io::copy(&mut client_read, &mut backend_write) => {
                (Direction::ClientToBackend, result)
            }
            result = tokio::io::copy(&mut backend_read, &mut client_write) => {
                (Direction::BackendToClient, result)
            }
        };

        shutdown_quietly(&mut backend_write).await;
        shutdown_quietly(&mut client_write).await;
        Ok(RelayOutcome {
            finished,
            result,
            bytes: ByteCounts {
                client_to_backend: (head.len() + buffered.len()) as u64 + client_read.count(),
                backend_to_client: backend_read.count(),
            },
        })
    }
}

/// Read half that tallies what passes through it.
struct Counted<R> {
    inner: R,
    count: u64,
}

impl<R> Counted<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    fn count(&self) -> u64 {
        self.count
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for Counted<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            self.count += (buf.filled().len() - before) as u64;
        }
        poll
    }
}

async fn forward_request<W>(backend: &mut W, head: &Bytes, buffered: &Bytes) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    backend.write_all(head).await?;
    if !buffered.is_empty() {
        backend.write_all(buffered).await?;
    }
    backend.flush().await
}

async fn shutdown_quietly<W>(io: &mut W)
where
    W: AsyncWrite + Unpin,
{
    match tokio::time::timeout(CLOSE_GRACE, io.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::trace!(error = %e, "Shutdown after relay failed"),
        Err(_) => tracing::debug!("Peer did not accept shutdown in time"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};

    const HEAD: &[u8] = b"POST /v1.43/containers/create HTTP/1.1\r\nHost: docker\r\nContent-Length: 10\r\n\r\n";

    #[tokio::test]
    async fn replays_request_then_relays_response() {
        let (mut client, proxy_client) = duplex(1024);
        let (proxy_backend, mut backend) = duplex(1024);

        let detached = Detached::new(
            proxy_client,
            Bytes::from_static(HEAD),
            Bytes::from_static(b"{\"Im"),
        );
        let relay = tokio::spawn(RelayPair::new(detached, proxy_backend).run());

        // Rest of the body arrives after the hijack.
        client.write_all(b"age\":1}").await.unwrap();

        let mut expected = HEAD.to_vec();
        expected.extend_from_slice(b"{\"Image\":1}");
        let mut received = vec![0u8; expected.len()];
        backend.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected);

        let reply = b"HTTP/1.1 201 Created\r\nContent-Length: 2\r\n\r\n{}";
        backend.write_all(reply).await.unwrap();
        drop(backend);

        let mut seen = Vec::new();
        client.read_to_end(&mut seen).await.unwrap();
        assert_eq!(seen, reply);

        let outcome = relay.await.unwrap().unwrap();
        assert_eq!(outcome.finished, Direction::BackendToClient);
        assert!(outcome.is_clean());
        assert_eq!(outcome.result.as_ref().unwrap(), &(reply.len() as u64));
        assert_eq!(
            outcome.bytes,
            ByteCounts {
                client_to_backend: expected.len() as u64,
                backend_to_client: reply.len() as u64,
            }
        );
    }

    #[tokio::test]
    async fn cancelled_direction_is_still_counted() {
        let (mut client, proxy_client) = duplex(1024);
        let (proxy_backend, mut backend) = duplex(1024);

        let detached = Detached::new(proxy_client, Bytes::from_static(HEAD), Bytes::new());
        let relay = tokio::spawn(RelayPair::new(detached, proxy_backend).run());

        let mut head = vec![0u8; HEAD.len()];
        backend.read_exact(&mut head).await.unwrap();

        // A streamed upload the engine consumes before answering.
        client.write_all(b"0123456789").await.unwrap();
        let mut upload = [0u8; 10];
        backend.read_exact(&mut upload).await.unwrap();
        backend.write_all(b"done").await.unwrap();
        drop(backend);

        let mut seen = Vec::new();
        client.read_to_end(&mut seen).await.unwrap();
        assert_eq!(seen, b"done");

        let outcome = relay.await.unwrap().unwrap();
        assert_eq!(outcome.finished, Direction::BackendToClient);
        assert_eq!(outcome.bytes.client_to_backend, (HEAD.len() + 10) as u64);
        assert_eq!(outcome.bytes.backend_to_client, 4);
    }

    #[tokio::test]
    async fn client_hangup_closes_backend() {
        let (client, proxy_client) = duplex(1024);
        let (proxy_backend, mut backend) = duplex(1024);

        let detached = Detached::new(proxy_client, Bytes::from_static(HEAD), Bytes::new());
        let relay = tokio::spawn(RelayPair::new(detached, proxy_backend).run());

        let mut head = vec![0u8; HEAD.len()];
        backend.read_exact(&mut head).await.unwrap();
        drop(client);

        let outcome = relay.await.unwrap().unwrap();
        assert_eq!(outcome.finished, Direction::ClientToBackend);

        // Backend sees end-of-stream once the relay has closed its side.
        let mut rest = Vec::new();
        backend.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn forward_failure_closes_client_silently() {
        let (mut client, proxy_client) = duplex(1024);
        let (proxy_backend, backend) = duplex(1024);
        drop(backend);

        let detached = Detached::new(proxy_client, Bytes::from_static(HEAD), Bytes::new());
        let err = RelayPair::new(detached, proxy_backend).run().await.unwrap_err();
        assert!(matches!(err, RelayError::Forward(_)));

        let mut seen = Vec::new();
        client.read_to_end(&mut seen).await.unwrap();
        assert!(seen.is_empty());
    }

    #[test]
    fn resets_count_as_clean() {
        let outcome = RelayOutcome {
            finished: Direction::BackendToClient,
            result: Err(io::Error::from(io::ErrorKind::ConnectionReset)),
            bytes: ByteCounts::default(),
        };
        assert!(outcome.is_clean());

        let outcome = RelayOutcome {
            finished: Direction::ClientToBackend,
            result: Err(io::Error::from(io::ErrorKind::PermissionDenied)),
            bytes: ByteCounts::default(),
        };
        assert!(!outcome.is_clean());
    }
}
