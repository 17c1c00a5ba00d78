//! Taking raw ownership of a client connection mid-exchange.
//!
//! An [`Exchange`] is one inbound request whose response has not been
//! written yet. The gate either answers it with an error through
//! [`Exchange::reply`], or detaches the transport with [`Exchange::hijack`]
//! and from then on owns every byte that crosses it.

use std::future::Future;

use bytes::Bytes;
use hyper::StatusCode;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::http::request::RequestHead;

/// Why a transport could not be detached.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HijackError {
    /// The exchange is served by something that cannot give up its transport.
    #[error("connection does not support hijacking")]
    Unsupported,

    /// The transport was already handed out.
    #[error("connection already hijacked")]
    AlreadyDetached,
}

/// One inbound request awaiting either an error reply or a hijack.
pub trait Exchange: Send {
    /// The raw transport handed over by [`Exchange::hijack`].
    type Raw: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// The parsed request head.
    fn head(&self) -> &RequestHead;

    /// Answer with a plain-text error response.
    fn reply(
        &mut self,
        status: StatusCode,
        body: &str,
    ) -> impl Future<Output = std::io::Result<()>> + Send;

    /// Detach the raw transport.
    ///
    /// On `Err(HijackError::Unsupported)` the exchange is untouched and can
    /// still [`reply`](Exchange::reply).
    fn hijack(&mut self) -> Result<Detached<Self::Raw>, HijackError>;
}

/// A transport taken over from the HTTP layer.
///
/// Besides the socket itself it carries everything the HTTP layer already
/// consumed from it, so the request can be replayed byte for byte.
#[derive(Debug)]
pub struct Detached<S> {
    io: S,
    head: Bytes,
    buffered: Bytes,
}

impl<S> Detached<S> {
    pub fn new(io: S, head: Bytes, buffered: Bytes) -> Self {
        Self { io, head, buffered }
    }

    /// Request line and headers as received.
    pub fn head(&self) -> &Bytes {
        &self.head
    }

    /// Bytes read past the head (start of the body or a pipelined request).
    pub fn buffered(&self) -> &Bytes {
        &self.buffered
    }

    pub fn into_parts(self) -> (S, Bytes, Bytes) {
        (self.io, self.head, self.buffered)
    }
}
