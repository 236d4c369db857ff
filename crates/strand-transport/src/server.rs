//! The transport loop.
//!
//! One UDP socket serves every session. A single inbound loop receives
//! datagrams, parses them and routes them by message type:
//!
//! - `connect` opens a session (idempotently) and always acks at 0
//! - `data` feeds the reassembly path and always acks the contiguous
//!   position
//! - `ack` retires or eagerly resends outbound data
//! - `close` tears the session down and always echoes a close
//!
//! Messages for unknown sessions get a `close` back so the peer stops;
//! malformed datagrams get nothing. Neither ever takes the loop down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use bytes::Bytes;
use strand_wire::{Message, SessionId, WireError, MAX_DATAGRAM};

use crate::adapter::LineHandler;
use crate::delivery::{printable, resend_window, send_frame, spawn_retransmit, stream_bytes};
use crate::error::TransportError;
use crate::registry::Registry;
use crate::session::AckOutcome;

/// Default UDP port to listen on.
pub const DEFAULT_PORT: u16 = 19117;

/// How long an unacknowledged data frame waits before being resent.
pub const RETRANSMIT_INTERVAL: Duration = Duration::from_secs(5);

/// How long a session may sit idle before it is reaped.
pub const SESSION_EXPIRY: Duration = Duration::from_secs(60);

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: SocketAddr,
    /// Send buffer size in bytes.
    pub sndbuf: usize,
    /// Receive buffer size in bytes.
    pub rcvbuf: usize,
    /// Retransmission interval. Changing it does not change protocol
    /// behavior; tests shrink it.
    pub retransmit_interval: Duration,
    /// Idle timeout before a session is reaped.
    pub session_expiry: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            sndbuf: 1024 * 1024,
            rcvbuf: 1024 * 1024,
            retransmit_interval: RETRANSMIT_INTERVAL,
            session_expiry: SESSION_EXPIRY,
        }
    }
}

/// The datagram server: one socket, one inbound loop, many sessions.
pub struct Server {
    socket: Arc<UdpSocket>,
    registry: Arc<Registry>,
    handler: Arc<dyn LineHandler>,
    retransmit_interval: Duration,
    session_expiry: Duration,
}

impl Server {
    /// Bind the socket and assemble a server around `handler`.
    pub async fn bind(
        config: ServerConfig,
        handler: Arc<dyn LineHandler>,
    ) -> Result<Self, TransportError> {
        let socket = bind_socket(config.bind, config.sndbuf, config.rcvbuf)?;
        tracing::info!("listening on {}", socket.local_addr()?);
        Ok(Self {
            socket: Arc::new(socket),
            registry: Arc::new(Registry::new()),
            handler,
            retransmit_interval: config.retransmit_interval,
            session_expiry: config.session_expiry,
        })
    }

    /// The address the socket actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Run the inbound dispatch loop. Never returns in normal operation;
    /// receive and send errors are logged and survived.
    pub async fn run(self) -> Result<(), TransportError> {
        // Oversized datagrams must be seen as oversized, not silently
        // truncated to a parseable prefix.
        let mut buf = vec![0u8; MAX_DATAGRAM * 2];
        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("recv failed: {e}");
                    continue;
                }
            };
            let datagram = &buf[..len];
            debug!("<-- {}", printable(datagram));

            match Message::parse(datagram) {
                Ok(message) => self.dispatch(message, peer).await,
                Err(e) => drop_malformed(e),
            }
        }
    }

    async fn dispatch(&self, message: Message, peer: SocketAddr) {
        match message {
            Message::Connect { session } => self.on_connect(session, peer).await,
            Message::Data { session, pos, data } => {
                self.on_data(session, pos as usize, &data, peer).await
            }
            Message::Ack { session, length } => {
                self.on_ack(session, length as usize, peer).await
            }
            Message::Close { session } => self.on_close(session, peer).await,
        }
    }

    /// `connect` opens the session on first sight and re-acknowledges on
    /// every sight.
    async fn on_connect(&self, id: SessionId, peer: SocketAddr) {
        if let Some(handle) = self.registry.create(id, peer).await {
            debug!("session {id} opened for {peer}");
            spawn_retransmit(
                self.socket.clone(),
                self.registry.clone(),
                id,
                handle,
                self.retransmit_interval,
                self.session_expiry,
            );
        }
        let ack = Message::Ack {
            session: id,
            length: 0,
        }
        .encode();
        send_frame(&self.socket, peer, &ack).await;
    }

    /// `data` extends the contiguous inbound stream, hands completed
    /// lines to the application, and always acks the contiguous position.
    async fn on_data(&self, id: SessionId, pos: usize, data: &Bytes, peer: SocketAddr) {
        let Some(handle) = self.registry.get(id).await else {
            self.close_unknown(id, peer).await;
            return;
        };

        let mut session = handle.lock().await;
        session.touch();

        if session.accept_data(pos, data) {
            while let Some(line) = session.next_line() {
                if let Some(mut reply) = self.handler.handle_line(&line) {
                    reply.push(b'\n');
                    stream_bytes(&self.socket, id, &mut session, &reply).await;
                }
            }
        }

        let ack = Message::Ack {
            session: id,
            length: session.received_pos as u32,
        }
        .encode();
        send_frame(&self.socket, session.peer, &ack).await;
    }

    /// `ack` retires outbound frames; a lagging ack triggers an eager
    /// resend burst, an impossible one kills the session.
    async fn on_ack(&self, id: SessionId, length: usize, peer: SocketAddr) {
        let Some(handle) = self.registry.get(id).await else {
            self.close_unknown(id, peer).await;
            return;
        };

        let mut session = handle.lock().await;
        session.touch();

        match session.apply_ack(length) {
            AckOutcome::Duplicate => {}
            AckOutcome::BeyondSent => {
                warn!(
                    "session {id} acknowledged {length} of {} sent bytes, closing",
                    session.sent_pos
                );
                session.closed = true;
                let close = Message::Close { session: id }.encode();
                send_frame(&self.socket, session.peer, &close).await;
                drop(session);
                self.registry.remove(id).await;
            }
            AckOutcome::Accepted { resend_from: Some(from) } => {
                resend_window(&self.socket, id, &session, from).await;
            }
            AckOutcome::Accepted { resend_from: None } => {}
        }
    }

    /// `close` is idempotent and always answered with a close.
    async fn on_close(&self, id: SessionId, peer: SocketAddr) {
        if let Some(handle) = self.registry.remove(id).await {
            handle.lock().await.closed = true;
            debug!("session {id} closed by peer");
        }
        let close = Message::Close { session: id }.encode();
        send_frame(&self.socket, peer, &close).await;
    }

    /// Tell a peer referencing an unknown session to stop.
    async fn close_unknown(&self, id: SessionId, peer: SocketAddr) {
        debug!("message for unknown session {id}");
        let close = Message::Close { session: id }.encode();
        send_frame(&self.socket, peer, &close).await;
    }
}

/// The protocol gives garbage no feedback; it is only logged.
fn drop_malformed(e: WireError) {
    debug!("dropping malformed datagram: {e}");
}

/// Bind via socket2 so buffer sizes are set before the socket is live,
/// then hand it to tokio.
fn bind_socket(
    addr: SocketAddr,
    sndbuf: usize,
    rcvbuf: usize,
) -> Result<UdpSocket, TransportError> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_send_buffer_size(sndbuf)?;
    socket.set_recv_buffer_size(rcvbuf)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}
