//! Application adapter trait.
//!
//! The transport itself is application-agnostic: it reassembles a byte
//! stream and cuts it into lines. Whatever rides on top implements
//! [`LineHandler`] to consume those lines and produce replies.

/// The application layer riding on top of a session's byte stream.
///
/// Handlers are shared across all sessions and may be called from
/// concurrent tasks, so they must be stateless or synchronize internally.
pub trait LineHandler: Send + Sync + 'static {
    /// Called once per completed inbound line, in stream order, with the
    /// line terminator stripped.
    ///
    /// Returning `Some(reply)` queues `reply` plus a terminating newline
    /// on the session's outbound stream; `None` sends nothing.
    fn handle_line(&self, line: &[u8]) -> Option<Vec<u8>>;
}

impl<F> LineHandler for F
where
    F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
{
    fn handle_line(&self, line: &[u8]) -> Option<Vec<u8>> {
        self(line)
    }
}
