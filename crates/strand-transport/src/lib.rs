//! Strand transport - reliable byte streams over lossy datagrams
//!
//! This crate turns unordered, lossy, duplicable UDP datagrams into an
//! ordered, duplicate-free byte stream per peer session:
//!
//! - [`session`] - per-peer stream cursors, buffers and the pending
//!   retransmission queue
//! - [`registry`] - the session-id to session map with open/close/expiry
//!   lifecycle
//! - [`server`] - the single-socket inbound dispatch loop
//! - [`adapter`] - the [`LineHandler`] trait the application layer
//!   implements to consume completed lines and produce replies
//!
//! Loss is never signalled by the network. The receive side only ever
//! extends its contiguous prefix and acknowledges its length; the send
//! side keeps every unacknowledged data frame queued and resends it on a
//! fixed interval until the peer's acknowledgment catches up or the
//! session dies.

pub mod adapter;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;

mod delivery;

// Re-export main types at crate root
pub use adapter::LineHandler;
pub use error::TransportError;
pub use registry::Registry;
pub use server::{Server, ServerConfig, DEFAULT_PORT, RETRANSMIT_INTERVAL, SESSION_EXPIRY};
pub use session::{AckOutcome, Session};
