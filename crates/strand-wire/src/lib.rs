//! Strand wire format - slash-delimited datagram framing
//!
//! This crate provides:
//! - The escaping codec for embedding arbitrary bytes in a slash-delimited
//!   frame ([`escape()`] / [`unescape()`])
//! - Typed message parsing and encoding ([`Message`])
//! - Datagram size limits ([`MAX_DATAGRAM`], [`MAX_CHUNK`])
//!
//! No I/O happens here - this is pure data transformation.

pub mod escape;
pub mod error;
pub mod message;

// Re-export main types at crate root
pub use escape::{escape, unescape};
pub use error::{Result, WireError};
pub use message::{Message, SessionId, MAX_CHUNK, MAX_DATAGRAM};
