//! Error types for strand-wire.

use thiserror::Error;

/// Result type for strand-wire operations.
pub type Result<T> = std::result::Result<T, WireError>;

/// Reasons a datagram is rejected by the framer.
///
/// Malformed datagrams get no reply on the wire; callers log the variant
/// and drop the datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The datagram is at or above the maximum datagram size.
    #[error("datagram of {0} bytes is at or above the {max} byte limit", max = crate::MAX_DATAGRAM)]
    Oversized(usize),

    /// The datagram contains bytes outside the ASCII range.
    #[error("datagram is not ASCII text")]
    NotAscii,

    /// The datagram does not start and end with a slash.
    #[error("datagram is not enclosed in slashes")]
    Unframed,

    /// The datagram contains no fields at all.
    #[error("datagram contains no fields")]
    Empty,

    /// The first field is not a known message type.
    #[error("unknown message type {0:?}")]
    UnknownKind(String),

    /// A known message type arrived with the wrong number of fields.
    #[error("{kind} message has {got} fields, expected {want}")]
    FieldCount {
        kind: &'static str,
        want: usize,
        got: usize,
    },

    /// A numeric field did not parse as a non-negative 32-bit integer.
    #[error("invalid numeric field {0:?}")]
    InvalidNumber(String),
}
