//! Error types for strand-transport.

use thiserror::Error;

/// Errors that can take the transport down.
///
/// Almost nothing qualifies: malformed datagrams are dropped where they
/// are parsed and per-datagram send failures are logged and abandoned.
/// Only failing to set up the socket is fatal.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying I/O error from the OS while binding or receiving.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}
