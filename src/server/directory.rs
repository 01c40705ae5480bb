//! Directory of live sessions
//!
//! Readers never iterate under the lock: [`SessionDirectory::snapshot`] clones
//! the `Arc`s out and releases it, so broadcasting to a slow set of peers never
//! holds up a concurrent add or remove, and a remove that lands mid-broadcast
//! cannot tear the iteration.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{ChatError, Result};
use crate::server::room_manager::RoomId;
use crate::server::session::{Session, SessionId};

#[derive(Debug, Default)]
pub struct SessionDirectory {
    /// Live sessions in join order
    sessions: RwLock<Vec<Arc<Session>>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. Returns the roster size including it, or `None` if the
    /// same session was already present.
    pub async fn add(&self, session: Arc<Session>) -> Option<usize> {
        self.add_with(session, None, |_, _| {}).await.ok()
    }

    /// Add a session and call `on_added` with it and the new roster size
    /// before the write lock is released. Nothing queued by a broadcast can
    /// overtake what `on_added` queues.
    pub async fn add_with<F>(
        &self,
        session: Arc<Session>,
        limit: Option<usize>,
        on_added: F,
    ) -> Result<usize>
    where
        F: FnOnce(&Session, usize),
    {
        let mut sessions = self.sessions.write().await;
        if sessions.iter().any(|s| s.id() == session.id()) {
            return Err(ChatError::internal(format!(
                "{} is already registered",
                session.name()
            )));
        }
        if let Some(limit) = limit {
            if sessions.len() >= limit {
                return Err(ChatError::resource_limit(format!(
                    "{} session(s) already connected",
                    sessions.len()
                )));
            }
        }
        sessions.push(Arc::clone(&session));
        let roster = sessions.len();
        on_added(session.as_ref(), roster);
        Ok(roster)
    }

    /// Remove a session. Removing an absent id is a no-op returning `None`.
    pub async fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        let idx = sessions.iter().position(|s| s.id() == id)?;
        Some(sessions.remove(idx))
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        let sessions = self.sessions.read().await;
        sessions.iter().any(|s| s.id() == id)
    }

    /// Roster size
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Copy of the current roster
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.clone()
    }

    /// Snapshot of every session except `exclude`
    pub async fn others(&self, exclude: SessionId) -> Vec<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .filter(|s| s.id() != exclude)
            .cloned()
            .collect()
    }

    /// Snapshot of the sessions currently in `room`, except `exclude`
    pub async fn others_in_room(&self, exclude: SessionId, room: RoomId) -> Vec<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .filter(|s| s.id() != exclude && s.room() == room)
            .cloned()
            .collect()
    }
}
