//! The authorization-gated relay.
//!
//! # Data Flow
//! ```text
//! Exchange (parsed head, transport still owned by the HTTP layer)
//!     → auth.rs     remote verdict          (401 / 501 on refusal)
//!     → backend.rs  dial engine socket      (silent close or 502)
//!     → hijack.rs   detach raw transport    (500 if unsupported)
//!     → relay.rs    replay request, pump both ways, close both
//! ```
//!
//! handler.rs sequences the phases; each phase strictly follows the previous.

pub mod auth;
pub mod backend;
pub mod handler;
pub mod hijack;
pub mod relay;

pub use auth::{AuthGate, AuthVerdict, Authorize};
pub use backend::BackendDialer;
pub use handler::{ExchangeOutcome, Gate};
pub use hijack::{Detached, Exchange, HijackError};
