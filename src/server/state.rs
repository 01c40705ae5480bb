//! Shared server state
//!
//! One [`ServerState`] exists per running server. The acceptor, every
//! connection worker and the liveness monitor hold an `Arc` to it; nothing is
//! reached through globals.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::Result;
use crate::notify::Notifier;
use crate::protocol::text;
use crate::server::directory::SessionDirectory;
use crate::server::room_manager::{RoomId, RoomRegistry};
use crate::server::router::BroadcastRouter;
use crate::server::session::Session;

#[derive(Debug)]
pub struct ServerState {
    rooms: Arc<RoomRegistry>,
    directory: Arc<SessionDirectory>,
    router: BroadcastRouter,
    notifier: Arc<dyn Notifier>,
}

impl ServerState {
    pub fn new(rooms: RoomRegistry, notifier: Arc<dyn Notifier>) -> Self {
        let directory = Arc::new(SessionDirectory::new());
        Self {
            rooms: Arc::new(rooms),
            router: BroadcastRouter::new(Arc::clone(&directory)),
            directory,
            notifier,
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    pub fn router(&self) -> &BroadcastRouter {
        &self.router
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.notifier)
    }

    /// Publish `session` in the directory and queue its welcome block.
    ///
    /// The welcome is queued under the directory lock, so it is always the
    /// first thing the client receives. Returns the roster size including
    /// the new session; refused with `ResourceLimit` once `limit` sessions
    /// are connected.
    pub async fn register(&self, session: &Arc<Session>, limit: Option<usize>) -> Result<usize> {
        let rooms = &self.rooms;
        self.directory
            .add_with(Arc::clone(session), limit, |session, roster| {
                let lines = text::welcome_block(
                    session.name(),
                    rooms,
                    rooms.name(session.room()),
                    roster,
                );
                if let Err(e) = session.send_lines(&lines) {
                    debug!("Welcome to {} dropped: {}", session.name(), e);
                }
            })
            .await
    }

    /// Current roster, overall and per room
    pub async fn stats(&self) -> ServerStats {
        let sessions = self.directory.snapshot().await;
        let per_room = self
            .rooms
            .iter()
            .map(|room| {
                let count = sessions.iter().filter(|s| s.room() == room.id).count();
                (room.id, count)
            })
            .collect();
        ServerStats {
            total_sessions: sessions.len(),
            per_room,
        }
    }

    /// Announce `session`'s departure and the new roster size to everyone
    /// else, then remove it from the directory.
    ///
    /// Quit, read failure and the liveness monitor can all race to end the
    /// same session. Only the first caller does anything; the rest get
    /// `false`.
    pub async fn depart(&self, session: &Session) -> bool {
        if !session.claim_departure() {
            return false;
        }

        let remaining = self.directory.others(session.id()).await.len();
        self.router
            .broadcast_to_all(session, &text::left_chat(session.name()))
            .await;
        self.router
            .broadcast_to_all(session, &text::roster_count(remaining))
            .await;
        self.directory.remove(session.id()).await;

        match session.peer() {
            Some(peer) => info!(
                "{} ({}) left after {:?}, {} user(s) remain",
                session.name(),
                peer,
                session.uptime(),
                remaining
            ),
            None => info!(
                "{} left after {:?}, {} user(s) remain",
                session.name(),
                session.uptime(),
                remaining
            ),
        }
        true
    }
}

/// Server statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStats {
    pub total_sessions: usize,
    /// Session count for every registered room, in id order
    pub per_room: Vec<(RoomId, usize)>,
}

/// Listens for the server-wide shutdown signal
#[derive(Debug)]
pub struct Shutdown {
    shutdown: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub fn new(notify: broadcast::Receiver<()>) -> Self {
        Self {
            shutdown: false,
            notify,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Wait for the signal. A dropped sender counts as a signal.
    pub async fn recv(&mut self) {
        if self.shutdown {
            return;
        }
        let _ = self.notify.recv().await;
        self.shutdown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::SilentNotifier;
    use crate::server::session::test_support::{detached, queued_lines};

    fn state() -> ServerState {
        ServerState::new(RoomRegistry::standard(), Arc::new(SilentNotifier))
    }

    #[tokio::test]
    async fn test_depart_announces_once() {
        let state = state();
        let (a, mut ra) = detached("Guest 1");
        let (b, mut rb) = detached("Guest 2");
        let (c, mut rc) = detached("Guest 3");
        c.set_room(1);
        for s in [&a, &b, &c] {
            state.directory().add(Arc::clone(s)).await;
        }

        assert!(state.depart(&b).await);
        assert!(!state.depart(&b).await);

        let expected = vec![
            "Guest 2 left the chat.".to_string(),
            "Currently there are 2 user(s) on the platform.".to_string(),
        ];
        assert_eq!(queued_lines(&mut ra), expected);
        assert_eq!(queued_lines(&mut rc), expected, "departures are global");
        assert!(queued_lines(&mut rb).is_empty());
        assert!(!state.directory().contains(b.id()).await);
        assert_eq!(state.directory().len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_depart_single_winner() {
        let state = Arc::new(state());
        let (a, mut ra) = detached("Guest 1");
        let (b, _rb) = detached("Guest 2");
        state.directory().add(a.clone()).await;
        state.directory().add(b.clone()).await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let state = Arc::clone(&state);
            let b = Arc::clone(&b);
            tasks.push(tokio::spawn(async move { state.depart(&b).await }));
        }
        let mut winners = 0;
        for t in tasks {
            if t.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        let lines = queued_lines(&mut ra);
        assert_eq!(
            lines.iter().filter(|l| *l == "Guest 2 left the chat.").count(),
            1
        );
    }

    #[tokio::test]
    async fn test_register_queues_welcome_first() {
        let state = Arc::new(state());
        let (talker, _rt) = detached("Guest 1");
        state.directory().add(talker.clone()).await;

        let chatter = {
            let state = Arc::clone(&state);
            let talker = Arc::clone(&talker);
            tokio::spawn(async move {
                for i in 0..200 {
                    state
                        .router()
                        .broadcast_to_all(&talker, &format!("Guest 1: {}", i))
                        .await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut joined = Vec::new();
        for i in 0..20 {
            let (s, rx) = detached(&format!("Guest {}", i + 2));
            let roster = state.register(&s, None).await.unwrap();
            assert_eq!(roster, i + 2);
            joined.push(rx);
            tokio::task::yield_now().await;
        }
        chatter.await.unwrap();

        for mut rx in joined {
            let lines = queued_lines(&mut rx);
            assert!(lines[0].starts_with("Hi Guest "), "got {:?}", lines[0]);
        }
    }

    #[tokio::test]
    async fn test_register_refuses_beyond_limit() {
        let state = state();
        let (a, mut ra) = detached("Guest 1");
        let (b, mut rb) = detached("Guest 2");

        assert_eq!(state.register(&a, Some(1)).await.unwrap(), 1);
        let lines = queued_lines(&mut ra);
        assert_eq!(
            lines[2],
            "Currently there are 1 user(s) on the platform including you."
        );

        let refused = state.register(&b, Some(1)).await;
        assert!(matches!(refused, Err(crate::error::ChatError::ResourceLimit(_))));
        assert!(queued_lines(&mut rb).is_empty(), "no welcome when refused");
        assert!(!state.directory().contains(b.id()).await);
    }

    #[tokio::test]
    async fn test_stats() {
        let state = state();
        let (a, _ra) = detached("Guest 1");
        let (b, _rb) = detached("Guest 2");
        b.set_room(3);
        state.directory().add(a).await;
        state.directory().add(b).await;

        let stats = state.stats().await;
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.per_room, vec![(0, 1), (1, 0), (2, 0), (3, 1)]);
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let (tx, _) = broadcast::channel(1);
        let mut shutdown = Shutdown::new(tx.subscribe());
        assert!(!shutdown.is_shutdown());
        tx.send(()).unwrap();
        shutdown.recv().await;
        assert!(shutdown.is_shutdown());
        shutdown.recv().await;
    }
}
