//! Reliable delivery engine (outbound side).
//!
//! Sending is fire-and-record: every data frame goes out immediately and
//! is queued against the acknowledgment length that retires it. Each open
//! session owns one background task that resends the oldest unacked frame
//! on a fixed interval until the peer's acknowledgment catches up, the
//! session closes, or it expires. The task also reaps the session from
//! the registry on expiry - there is no separate global reaper.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use strand_wire::{Message, SessionId, MAX_CHUNK};

use crate::registry::{Registry, SessionHandle};
use crate::session::Session;

/// Send one already-encoded frame, logging it; failures are logged and
/// abandoned, never propagated.
pub(crate) async fn send_frame(socket: &UdpSocket, dest: SocketAddr, frame: &[u8]) {
    debug!("--> {}", printable(frame));
    if let Err(e) = socket.send_to(frame, dest).await {
        warn!("send to {dest} failed: {e}");
    }
}

/// Render a frame for the log with newlines escaped.
pub(crate) fn printable(frame: &[u8]) -> String {
    String::from_utf8_lossy(frame).replace('\n', "\\n")
}

/// Append `bytes` to the session's outbound stream and send them as data
/// frames.
///
/// Chunks are capped at [`MAX_CHUNK`] so no frame approaches the datagram
/// limit. Each frame is recorded on the unacked queue before the cursor
/// advances past it.
pub(crate) async fn stream_bytes(
    socket: &UdpSocket,
    id: SessionId,
    session: &mut Session,
    bytes: &[u8],
) {
    session.sent.extend_from_slice(bytes);
    for chunk in bytes.chunks(MAX_CHUNK) {
        let pos = session.sent_pos;
        let frame = Message::Data {
            session: id,
            pos: pos as u32,
            data: Bytes::copy_from_slice(chunk),
        }
        .encode();
        send_frame(socket, session.peer, &frame).await;
        session.push_unacked(pos + chunk.len(), frame);
        session.sent_pos += chunk.len();
    }
}

/// Eagerly resend `sent[from..sent_pos]` after a lagging acknowledgment.
///
/// The window is re-chunked and re-escaped like a fresh send but neither
/// re-appended to the stream nor re-queued - the original frames are still
/// on the unacked queue for the timer loop.
pub(crate) async fn resend_window(
    socket: &UdpSocket,
    id: SessionId,
    session: &Session,
    from: usize,
) {
    debug!(
        "session {id} ack lags ({from} < {}), resending window",
        session.sent_pos
    );
    let window = session.sent[from..session.sent_pos].to_vec();
    let mut pos = from;
    for chunk in window.chunks(MAX_CHUNK) {
        let frame = Message::Data {
            session: id,
            pos: pos as u32,
            data: Bytes::copy_from_slice(chunk),
        }
        .encode();
        send_frame(socket, session.peer, &frame).await;
        pos += chunk.len();
    }
}

enum Tick {
    /// Session closed elsewhere; just exit.
    Stop,
    /// Idle too long; reap the session and exit.
    Expire,
    /// Oldest unacked frame needs another transmission.
    Resend(Bytes, SocketAddr),
    /// Nothing to do until the next tick.
    Idle,
}

/// Spawn the retransmission task for one session.
///
/// The task polls: it is stopped by the session's `closed` flag or by
/// expiry, never by an external cancellation signal.
pub(crate) fn spawn_retransmit(
    socket: Arc<UdpSocket>,
    registry: Arc<Registry>,
    id: SessionId,
    handle: SessionHandle,
    interval: Duration,
    expiry: Duration,
) {
    tokio::spawn(async move {
        loop {
            let tick = {
                let mut session = handle.lock().await;
                if session.closed {
                    Tick::Stop
                } else if session.expired(expiry) {
                    session.closed = true;
                    Tick::Expire
                } else if let Some(frame) = session.next_retransmit() {
                    Tick::Resend(frame, session.peer)
                } else {
                    Tick::Idle
                }
            };

            match tick {
                Tick::Stop => break,
                Tick::Expire => {
                    registry.remove(id).await;
                    debug!("session {id} expired");
                    break;
                }
                Tick::Resend(frame, peer) => {
                    debug!("session {id} has an unacked frame, resending");
                    send_frame(&socket, peer, &frame).await;
                }
                Tick::Idle => {}
            }

            tokio::time::sleep(interval).await;
        }
    });
}
