//! Per-peer session state.
//!
//! A [`Session`] holds everything one peer conversation needs: the
//! reassembled inbound stream, the outbound stream, both cursors, the
//! pending-retransmission queue and the liveness timestamp. It is pure
//! state - no I/O - so every transition is unit-testable. The transport
//! loop and the per-session retransmission task share a session through
//! `Arc<tokio::sync::Mutex<Session>>`, which gives the single-writer
//! exclusion each session requires.
//!
//! Stream invariants:
//! - `received_pos`, `sent_pos` and `acked` never decrease.
//! - `acked <= sent_pos` always.
//! - Inbound bytes are only accepted when they extend `received_pos`
//!   contiguously; anything else is discarded, not buffered.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

/// A sent-but-unacknowledged data frame.
///
/// `frame` is the exact encoded datagram; retransmission resends it
/// byte-identical, never re-chunked or re-escaped.
#[derive(Debug, Clone)]
pub struct Unacked {
    /// The acknowledgment length that retires this frame.
    pub required_ack: usize,
    /// The frame as it went out on the wire.
    pub frame: Bytes,
}

/// Outcome of applying an inbound acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Already at or below the highest known acknowledgment; ignore.
    Duplicate,
    /// The peer acknowledged data that was never sent. Fatal for the
    /// session.
    BeyondSent,
    /// The acknowledgment advanced. When it still lags `sent_pos`,
    /// `resend_from` carries the offset to eagerly resend from.
    Accepted { resend_from: Option<usize> },
}

/// State for one logical peer conversation.
#[derive(Debug)]
pub struct Session {
    /// The peer this session is bound to, fixed for its lifetime.
    pub peer: SocketAddr,
    /// Reassembled inbound stream, offset-addressed from 0.
    pub received: BytesMut,
    /// Length of the contiguous inbound prefix (next expected offset).
    pub received_pos: usize,
    /// How far `received` has been scanned for completed lines.
    pub line_mark: usize,
    /// Outbound stream, offset-addressed from 0.
    pub sent: BytesMut,
    /// Total bytes appended to `sent`.
    pub sent_pos: usize,
    /// Highest acknowledgment length received from the peer.
    pub acked: usize,
    /// Sent data frames not yet retired by an acknowledgment, ordered by
    /// ascending `required_ack`.
    pub unacked: VecDeque<Unacked>,
    /// Timestamp of the most recent valid message for this session.
    pub last_activity: Instant,
    /// Terminal flag; stops the retransmission task.
    pub closed: bool,
}

impl Session {
    /// Create a fresh session bound to `peer`.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            received: BytesMut::new(),
            received_pos: 0,
            line_mark: 0,
            sent: BytesMut::new(),
            sent_pos: 0,
            acked: 0,
            unacked: VecDeque::new(),
            last_activity: Instant::now(),
            closed: false,
        }
    }

    /// Refresh the liveness timestamp.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Whether the session has been idle past `timeout`.
    pub fn expired(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    /// Accept inbound payload bytes starting at `pos`.
    ///
    /// Only a contiguous extension of `received_pos` is buffered; returns
    /// whether the bytes were accepted. Out-of-order and duplicate data is
    /// dropped - the peer learns about the gap from the unmoved
    /// acknowledgment length, never from a negative acknowledgment.
    pub fn accept_data(&mut self, pos: usize, payload: &[u8]) -> bool {
        if pos != self.received_pos {
            return false;
        }
        self.received.extend_from_slice(payload);
        self.received_pos += payload.len();
        true
    }

    /// Pop the next completed line out of the contiguous inbound prefix.
    ///
    /// Each call scans from `line_mark`, so every completed line is
    /// produced exactly once, in order, with the terminator stripped.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let area = &self.received[self.line_mark..self.received_pos];
        let nl = area.iter().position(|&b| b == b'\n')?;
        let line = area[..nl].to_vec();
        self.line_mark += nl + 1;
        Some(line)
    }

    /// Record a sent data frame awaiting acknowledgment.
    ///
    /// Callers push frames in send order, which keeps `unacked` sorted by
    /// `required_ack`.
    pub fn push_unacked(&mut self, required_ack: usize, frame: Bytes) {
        self.unacked.push_back(Unacked {
            required_ack,
            frame,
        });
    }

    /// Retire acknowledged frames and return the oldest still-unacked one
    /// for retransmission, if any.
    pub fn next_retransmit(&mut self) -> Option<Bytes> {
        while let Some(head) = self.unacked.front() {
            if self.acked >= head.required_ack {
                self.unacked.pop_front();
            } else {
                return Some(head.frame.clone());
            }
        }
        None
    }

    /// Apply an inbound acknowledgment of `length` total bytes.
    pub fn apply_ack(&mut self, length: usize) -> AckOutcome {
        if length <= self.acked {
            return AckOutcome::Duplicate;
        }
        if length > self.sent_pos {
            return AckOutcome::BeyondSent;
        }
        self.acked = length;
        let resend_from = (length < self.sent_pos).then_some(length);
        AckOutcome::Accepted { resend_from }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("127.0.0.1:40000".parse().unwrap())
    }

    #[test]
    fn contiguous_data_advances_cursor() {
        let mut s = session();
        assert!(s.accept_data(0, b"hello"));
        assert_eq!(s.received_pos, 5);
        assert!(s.accept_data(5, b" world"));
        assert_eq!(s.received_pos, 11);
        assert_eq!(&s.received[..], b"hello world");
    }

    #[test]
    fn out_of_order_data_is_dropped() {
        let mut s = session();
        assert!(!s.accept_data(5, b"later"));
        assert_eq!(s.received_pos, 0);
        assert!(s.received.is_empty());
    }

    #[test]
    fn replayed_data_is_dropped_after_cursor_moved() {
        let mut s = session();
        assert!(s.accept_data(0, b"abc"));
        assert!(!s.accept_data(0, b"abc"));
        assert_eq!(s.received_pos, 3);
        assert_eq!(&s.received[..], b"abc");
    }

    #[test]
    fn lines_come_out_once_in_order() {
        let mut s = session();
        s.accept_data(0, b"first\nsec");
        assert_eq!(s.next_line().as_deref(), Some(&b"first"[..]));
        assert_eq!(s.next_line(), None);
        s.accept_data(9, b"ond\nthird");
        assert_eq!(s.next_line().as_deref(), Some(&b"second"[..]));
        // "third" has no terminator yet.
        assert_eq!(s.next_line(), None);
    }

    #[test]
    fn empty_line_is_still_a_line() {
        let mut s = session();
        s.accept_data(0, b"\n\na\n");
        assert_eq!(s.next_line().as_deref(), Some(&b""[..]));
        assert_eq!(s.next_line().as_deref(), Some(&b""[..]));
        assert_eq!(s.next_line().as_deref(), Some(&b"a"[..]));
        assert_eq!(s.next_line(), None);
    }

    #[test]
    fn ack_outcomes() {
        let mut s = session();
        s.sent.extend_from_slice(b"0123456789");
        s.sent_pos = 10;

        assert_eq!(s.apply_ack(0), AckOutcome::Duplicate);
        assert_eq!(
            s.apply_ack(4),
            AckOutcome::Accepted {
                resend_from: Some(4)
            }
        );
        assert_eq!(s.acked, 4);
        // Stale and duplicate acks are ignored.
        assert_eq!(s.apply_ack(4), AckOutcome::Duplicate);
        assert_eq!(s.apply_ack(2), AckOutcome::Duplicate);
        // Beyond what was ever sent: fatal, and acked must not move.
        assert_eq!(s.apply_ack(11), AckOutcome::BeyondSent);
        assert_eq!(s.acked, 4);
        // Full acknowledgment needs no resend.
        assert_eq!(
            s.apply_ack(10),
            AckOutcome::Accepted { resend_from: None }
        );
        assert_eq!(s.acked, 10);
    }

    #[test]
    fn retransmit_queue_retires_acked_heads() {
        let mut s = session();
        s.push_unacked(3, Bytes::from_static(b"/data/0/0/abc/"));
        s.push_unacked(6, Bytes::from_static(b"/data/0/3/def/"));

        // Nothing acked yet: the oldest frame comes back verbatim.
        assert_eq!(
            s.next_retransmit(),
            Some(Bytes::from_static(b"/data/0/0/abc/"))
        );

        s.sent_pos = 6;
        s.apply_ack(3);
        assert_eq!(
            s.next_retransmit(),
            Some(Bytes::from_static(b"/data/0/3/def/"))
        );
        assert_eq!(s.unacked.len(), 1);

        s.apply_ack(6);
        assert_eq!(s.next_retransmit(), None);
        assert!(s.unacked.is_empty());
    }

    #[test]
    fn expiry_tracks_last_activity() {
        let mut s = session();
        assert!(!s.expired(Duration::from_secs(60)));
        std::thread::sleep(Duration::from_millis(2));
        assert!(s.expired(Duration::from_millis(1)));
        s.touch();
        assert!(!s.expired(Duration::from_secs(60)));
    }
}
