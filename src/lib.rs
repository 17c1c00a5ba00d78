//! Authorization-gated transparent proxy for a container engine socket.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                     ENGINE GATE                      │
//!                    │                                                      │
//!  Client ───────────┼─▶ net::listener ─▶ net::tls ─▶ http::request        │
//!                    │                                    │                 │
//!                    │                                    ▼                 │
//!                    │                          proxy::auth ──────────┐     │
//!                    │                                    │ approved  │     │   Auth
//!                    │                                    ▼           └─────┼──▶ service
//!                    │                          proxy::backend              │
//!                    │                                    │                 │
//!                    │                                    ▼                 │
//!                    │                          proxy::hijack               │
//!                    │                                    │                 │
//!                    │                                    ▼                 │
//!  Client ◀══════════┼═══════════════════════ proxy::relay ═══════════════════▶ Engine socket
//!                    └──────────────────────────────────────────────────────┘
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
