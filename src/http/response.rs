//! Plain-text error responses written straight onto the client transport.
//!
//! Only the gate's own refusals are produced here; once a connection is
//! relayed, every byte the client sees comes from the engine.

use hyper::StatusCode;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Serialize a complete `text/plain` response that closes the connection.
pub fn error_response(status: StatusCode, body: &str) -> Vec<u8> {
    let reason = status.canonical_reason().unwrap_or("");
    let mut out = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         X-Content-Type-Options: nosniff\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        status.as_u16(),
        reason,
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body.as_bytes());
    out
}

/// Write an error response and flush it.
pub async fn write_error<W>(io: &mut W, status: StatusCode, body: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    io.write_all(&error_response(status, body)).await?;
    io.flush().await
}
