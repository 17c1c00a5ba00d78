//! HTTP front: just enough HTTP/1.x to authorize a request and then let go.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → request.rs (read + parse head, keep raw bytes)
//!     → connection.rs (Exchange over the raw transport)
//!     → proxy::Gate (authorize, dial, hijack, relay)
//!     → response.rs (only for the gate's own error replies)
//! ```

pub mod connection;
pub mod request;
pub mod response;
pub mod server;

pub use connection::ClientConnection;
pub use request::{read_head, RequestError, RequestHead};
pub use server::ProxyServer;
