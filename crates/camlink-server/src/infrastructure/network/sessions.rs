//! Registry of open control connections.
//!
//! Used for logging and status only; it never limits how many clients may
//! connect.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::SystemTime;

use tokio::sync::Mutex;
use uuid::Uuid;

/// Unique identifier for one accepted connection.
pub type SessionId = Uuid;

/// What the server knows about one open connection.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer: SocketAddr,
    pub connected_at: SystemTime,
    pub requests_served: u64,
}

/// Thread-safe map of open sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, SessionInfo>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new connection and returns its id.
    pub async fn open(&self, peer: SocketAddr) -> SessionId {
        let id = Uuid::new_v4();
        let info = SessionInfo {
            id,
            peer,
            connected_at: SystemTime::now(),
            requests_served: 0,
        };
        self.sessions.lock().await.insert(id, info);
        id
    }

    /// Counts one served request.  Unknown ids are ignored.
    pub async fn record_request(&self, id: SessionId) {
        if let Some(info) = self.sessions.lock().await.get_mut(&id) {
            info.requests_served += 1;
        }
    }

    /// Removes a session and returns its final record.
    pub async fn close(&self, id: SessionId) -> Option<SessionInfo> {
        self.sessions.lock().await.remove(&id)
    }

    /// Number of open sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
