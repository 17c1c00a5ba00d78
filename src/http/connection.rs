//! The production [`Exchange`]: a raw client transport with its request head
//! already read off the wire.
//!
//! Since the head was read by hand rather than by an HTTP framework, the
//! transport can always be handed over intact together with any bytes that
//! were read past the head. Error replies always end the connection.

use std::net::SocketAddr;

use bytes::BytesMut;
use hyper::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::http::request::RequestHead;
use crate::http::response;
use crate::proxy::hijack::{Detached, Exchange, HijackError};

pub struct ClientConnection<S> {
    io: Option<S>,
    head: RequestHead,
    buffered: BytesMut,
    peer: SocketAddr,
}

impl<S> ClientConnection<S> {
    /// `buffered` holds whatever was read after the head.
    pub fn new(io: S, head: RequestHead, buffered: BytesMut, peer: SocketAddr) -> Self {
        Self {
            io: Some(io),
            head,
            buffered,
            peer,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl<S> Exchange for ClientConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Raw = S;

    fn head(&self) -> &RequestHead {
        &self.head
    }

    async fn reply(&mut self, status: StatusCode, body: &str) -> std::io::Result<()> {
        let io = self
            .io
            .as_mut()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotConnected))?;
        response::write_error(io, status, body).await?;
        io.shutdown().await
    }

    fn hijack(&mut self) -> Result<Detached<S>, HijackError> {
        let io = self.io.take().ok_or(HijackError::AlreadyDetached)?;
        let buffered = std::mem::take(&mut self.buffered).freeze();
        Ok(Detached::new(io, self.head.raw().clone(), buffered))
    }
}
