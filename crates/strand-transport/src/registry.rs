//! Session registry.
//!
//! Maps session ids to live sessions. Owned by the transport loop and
//! shared (behind `Arc`) with every per-session retransmission task; there
//! is no ambient global state.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;

use strand_wire::SessionId;

use crate::session::Session;

/// A session shared between the transport loop and its retransmission
/// task. The mutex is the per-session single-writer exclusion.
pub type SessionHandle = Arc<Mutex<Session>>;

/// The session-id to session map.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Create a session for `id` bound to `peer`.
    ///
    /// Returns the new handle, or `None` when the id is already live -
    /// a duplicate connect changes nothing.
    pub async fn create(&self, id: SessionId, peer: SocketAddr) -> Option<SessionHandle> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&id) {
            return None;
        }
        let handle = Arc::new(Mutex::new(Session::new(peer)));
        sessions.insert(id, handle.clone());
        Some(handle)
    }

    /// Look up a live session.
    pub async fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.lock().await.get(&id).cloned()
    }

    /// Remove a session, returning its handle if it was live.
    pub async fn remove(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.lock().await.remove(&id)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no sessions are live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
