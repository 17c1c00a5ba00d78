//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (optional TLS handshake)
//!     → connection.rs (id + lifetime tracking)
//!     → Hand off to the HTTP head reader
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - TLS is optional and handled transparently

pub mod connection;
pub mod listener;
pub mod tls;
