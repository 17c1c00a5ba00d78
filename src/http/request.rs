//! Request head reading.
//!
//! # Responsibilities
//! - Read the request line and headers off a raw transport
//! - Keep the exact bytes received so they can be replayed to the engine
//! - Expose the headers the authorization gate needs
//!
//! # Design Decisions
//! - Parsing is done with `httparse` directly on the read buffer; nothing is
//!   re-encoded
//! - Bytes read past the blank line stay in the caller's buffer (body prefix)
//! - Header size limits enforced before the head completes

use bytes::{Bytes, BytesMut};
use hyper::StatusCode;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Maximum number of headers accepted in one request.
pub const MAX_HEADERS: usize = 100;

/// Errors while reading a request head.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request head exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("malformed request head: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("connection closed before the request head was complete")]
    Incomplete,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RequestError {
    /// Status to answer with, when the client is still worth answering.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestError::TooLarge { .. } => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
            RequestError::Malformed(_) => Some(StatusCode::BAD_REQUEST),
            RequestError::Incomplete | RequestError::Io(_) => None,
        }
    }
}

/// A parsed request line plus headers, along with the raw bytes they came from.
#[derive(Debug, Clone)]
pub struct RequestHead {
    method: String,
    target: String,
    minor_version: u8,
    headers: Vec<(String, Bytes)>,
    raw: Bytes,
}

impl RequestHead {
    /// Try to parse a complete head from the front of `buf`.
    ///
    /// Returns `Ok(None)` while the head is still partial. On success the head
    /// bytes are split off `buf`; whatever follows them stays in `buf`.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<Self>, RequestError> {
        let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut slots);

        let len = match req.parse(&buf[..])? {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => return Ok(None),
        };

        let method = req.method.unwrap_or_default().to_string();
        let target = req.path.unwrap_or_default().to_string();
        let minor_version = req.version.unwrap_or(1);
        let headers = req
            .headers
            .iter()
            .map(|h| (h.name.to_string(), Bytes::copy_from_slice(h.value)))
            .collect();

        let raw = buf.split_to(len).freeze();
        Ok(Some(Self {
            method,
            target,
            minor_version,
            headers,
            raw,
        }))
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// HTTP version as it appeared on the request line.
    pub fn version(&self) -> &'static str {
        if self.minor_version == 0 {
            "HTTP/1.0"
        } else {
            "HTTP/1.1"
        }
    }

    /// First value of the named header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_ref())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_ref()))
    }

    /// The request line, headers and terminating blank line exactly as received.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }
}

/// Read from `io` until a complete request head is buffered.
///
/// Returns `Ok(None)` if the peer closes without sending a single byte.
/// Any bytes read beyond the head are left in `buf`.
pub async fn read_head<R>(
    io: &mut R,
    buf: &mut BytesMut,
    max_bytes: usize,
) -> Result<Option<RequestHead>, RequestError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if !buf.is_empty() {
            if let Some(head) = RequestHead::parse(buf)? {
                return Ok(Some(head));
            }
        }
        if buf.len() >= max_bytes {
            return Err(RequestError::TooLarge { limit: max_bytes });
        }

        if io.read_buf(buf).await? == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(RequestError::Incomplete)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    const PING: &[u8] = b"GET /_ping HTTP/1.1\r\nHost: engine\r\nx-auth-token: t0k\r\nX-User-Id: u1\r\n\r\n";

    #[test]
    fn parse_keeps_raw_bytes_and_body_prefix() {
        let mut buf = BytesMut::from(
            &b"POST /containers/create HTTP/1.1\r\nContent-Length: 4\r\n\r\n{\"a\""[..],
        );
        let head = RequestHead::parse(&mut buf).unwrap().unwrap();

        assert_eq!(head.method(), "POST");
        assert_eq!(head.target(), "/containers/create");
        assert_eq!(head.version(), "HTTP/1.1");
        assert_eq!(
            head.raw().as_ref(),
            b"POST /containers/create HTTP/1.1\r\nContent-Length: 4\r\n\r\n"
        );
        assert_eq!(&buf[..], b"{\"a\"");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut buf = BytesMut::from(PING);
        let head = RequestHead::parse(&mut buf).unwrap().unwrap();

        assert_eq!(head.header("X-Auth-Token"), Some(&b"t0k"[..]));
        assert_eq!(head.header("x-user-id"), Some(&b"u1"[..]));
        assert_eq!(head.header("Authorization"), None);
        assert_eq!(head.headers().count(), 3);
    }

    #[test]
    fn partial_head_waits() {
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: x\r\n"[..]);
        assert!(RequestHead::parse(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 25);
    }

    #[test]
    fn garbage_is_malformed() {
        let mut buf = BytesMut::from(&b"\x16\x03\x01\x02\x00\x01\x00\x01\xfc\x03\x03"[..]);
        let err = RequestHead::parse(&mut buf).unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn read_head_across_chunks() {
        let (mut client, mut server) = tokio::io::duplex(64);
        tokio::spawn(async move {
            for chunk in PING.chunks(7) {
                client.write_all(chunk).await.unwrap();
            }
            client.write_all(b"tail").await.unwrap();
        });

        let mut buf = BytesMut::new();
        let head = read_head(&mut server, &mut buf, 64 * 1024)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(head.raw().as_ref(), PING);
        assert_eq!(head.target(), "/_ping");
    }

    #[tokio::test]
    async fn read_head_enforces_limit() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let header = format!("GET / HTTP/1.1\r\nX-Big: {}\r\n", "a".repeat(3000));
            let _ = client.write_all(header.as_bytes()).await;
        });

        let mut buf = BytesMut::new();
        let err = read_head(&mut server, &mut buf, 1024).await.unwrap_err();
        assert!(matches!(err, RequestError::TooLarge { limit: 1024 }));
        assert_eq!(err.status(), Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE));
    }

    #[tokio::test]
    async fn read_head_distinguishes_silent_close() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        let mut buf = BytesMut::new();
        assert!(read_head(&mut server, &mut buf, 1024).await.unwrap().is_none());

        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
        drop(client);
        let mut buf = BytesMut::new();
        assert!(matches!(
            read_head(&mut server, &mut buf, 1024).await,
            Err(RequestError::Incomplete)
        ));
    }
}
