//! Per-connection worker
//!
//! Runs one session from welcome to teardown:
//!
//! ```text
//! Welcomed -> Active -> Closing -> Dead    (/q or server shutdown)
//!                    \-------------> Dead    (EOF, read error, idle, reaped)
//! ```
//!
//! The worker owns the read half of the connection. Writes go through the
//! session's writer task, which other workers and the monitor share.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info};

use crate::error::{ChatError, Result};
use crate::protocol::command::{Command, RoomArgError};
use crate::protocol::text;
use crate::server::room_manager::RoomId;
use crate::server::session::Session;
use crate::server::state::{ServerState, Shutdown};

/// Lifecycle of a session as seen by its worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Welcome block sent, join announced
    Welcomed,
    /// Reading commands
    Active,
    /// Orderly teardown in progress
    Closing,
    /// Removed from the directory, connection closed
    Dead,
}

/// What ended a wait for the next line
#[derive(Debug)]
enum ReadOutcome {
    Line(String),
    Eof,
    Failed(ChatError),
    Idle,
    Reaped,
    Shutdown,
}

pub struct ConnectionHandler<R> {
    state: Arc<ServerState>,
    session: Arc<Session>,
    reader: BufReader<R>,
    shutdown: Shutdown,
    idle_timeout: Option<Duration>,
    phase: SessionState,
    /// Dropped when the worker finishes; the server waits on it at shutdown
    _shutdown_complete: mpsc::Sender<()>,
}

impl<R> ConnectionHandler<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(
        state: Arc<ServerState>,
        session: Arc<Session>,
        reader: R,
        shutdown: Shutdown,
        shutdown_complete: mpsc::Sender<()>,
    ) -> Self {
        Self {
            state,
            session,
            reader: BufReader::new(reader),
            shutdown,
            idle_timeout: None,
            phase: SessionState::Welcomed,
            _shutdown_complete: shutdown_complete,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Serve a session already published with [`ServerState::register`]
    /// until it ends. Errors are per-connection only.
    pub async fn run(mut self) -> Result<()> {
        self.announce_join().await;
        self.transition(SessionState::Active);

        loop {
            match self.next_line().await {
                ReadOutcome::Line(line) => match Command::parse(&line) {
                    Command::Empty => {}
                    Command::Quit => {
                        self.handle_quit().await;
                        return Ok(());
                    }
                    Command::ChangeRoom(arg) => self.handle_room_change(arg).await,
                    Command::Chat(message) => {
                        let line = text::chat_line(self.session.name(), &message);
                        self.state
                            .router()
                            .broadcast_to_room(&self.session, &line)
                            .await;
                    }
                },
                ReadOutcome::Eof => {
                    debug!("{} closed the connection", self.session.name());
                    self.handle_dead().await;
                    return Ok(());
                }
                ReadOutcome::Failed(e) => {
                    self.handle_dead().await;
                    return Err(e);
                }
                ReadOutcome::Idle => {
                    info!("{} idle for too long, disconnecting", self.session.name());
                    self.handle_dead().await;
                    return Err(ChatError::timeout(format!(
                        "{} sent nothing for {:?}",
                        self.session.name(),
                        self.idle_timeout.unwrap_or_default()
                    )));
                }
                ReadOutcome::Reaped => {
                    debug!("{} was closed elsewhere", self.session.name());
                    self.handle_dead().await;
                    return Ok(());
                }
                ReadOutcome::Shutdown => {
                    self.handle_shutdown().await;
                    return Ok(());
                }
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!("{}: {:?} -> {:?}", self.session.name(), self.phase, next);
        self.phase = next;
    }

    fn reply(&self, line: &str) {
        if let Err(e) = self.session.send(line) {
            debug!("Reply to {} dropped: {}", self.session.name(), e);
        }
    }

    async fn announce_join(&mut self) {
        self.state
            .router()
            .broadcast_to_room(&self.session, &text::joined_chat(self.session.name()))
            .await;
    }

    async fn next_line(&mut self) -> ReadOutcome {
        let reader = &mut self.reader;
        let shutdown = &mut self.shutdown;
        let session = &self.session;
        let idle_timeout = self.idle_timeout;

        tokio::select! {
            outcome = read_line(reader, idle_timeout) => outcome,
            _ = shutdown.recv() => ReadOutcome::Shutdown,
            _ = session.closed() => ReadOutcome::Reaped,
        }
    }

    /// Disconnect notice, global departure, removal, close. In that order.
    async fn handle_quit(&mut self) {
        self.transition(SessionState::Closing);
        self.reply(&text::disconnect_notice());
        self.state.depart(&self.session).await;
        self.session.close();
        self.transition(SessionState::Dead);
    }

    async fn handle_dead(&mut self) {
        self.session.mark_closed();
        self.state.depart(&self.session).await;
        self.session.close();
        self.transition(SessionState::Dead);
    }

    async fn handle_shutdown(&mut self) {
        self.transition(SessionState::Closing);
        self.reply(&text::server_shutdown());
        // Everyone is going away, so nobody is told about this departure
        self.session.claim_departure();
        self.state.directory().remove(self.session.id()).await;
        self.session.close();
        self.transition(SessionState::Dead);
    }

    async fn handle_room_change(&mut self, arg: std::result::Result<RoomId, RoomArgError>) {
        let rooms = self.state.rooms();
        let current = rooms.name(self.session.room());

        let room = match arg {
            Ok(id) if rooms.contains(id) => id,
            Ok(_) | Err(RoomArgError::OutOfRange(_)) => {
                self.reply(&text::incorrect_room(current));
                return;
            }
            Err(RoomArgError::Missing) | Err(RoomArgError::NotANumber(_)) => {
                self.reply(&text::room_usage(current));
                return;
            }
        };

        self.session.set_room(room);
        let room_name = rooms.name(room);
        self.reply(&text::room_changed(room_name));
        self.state
            .router()
            .broadcast_to_all(
                &self.session,
                &text::joined_room(self.session.name(), room_name),
            )
            .await;

        info!("{} moved to '{}'", self.session.name(), room_name);
    }
}

async fn read_line<R>(reader: &mut BufReader<R>, idle_timeout: Option<Duration>) -> ReadOutcome
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let read = reader.read_until(b'\n', &mut buf);

    let result = match idle_timeout {
        Some(limit) => match time::timeout(limit, read).await {
            Ok(result) => result,
            Err(_) => return ReadOutcome::Idle,
        },
        None => read.await,
    };

    match result {
        Ok(0) => ReadOutcome::Eof,
        Ok(_) => ReadOutcome::Line(text::clean_line(&buf)),
        Err(e) => ReadOutcome::Failed(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::SilentNotifier;
    use crate::server::room_manager::RoomRegistry;
    use crate::server::session::test_support::{detached, queued_lines};
    use tokio::io::AsyncWriteExt;
    use tokio::sync::broadcast;
    use tokio::time::timeout;

    struct Harness {
        state: Arc<ServerState>,
        notify_shutdown: broadcast::Sender<()>,
        complete_tx: mpsc::Sender<()>,
    }

    impl Harness {
        fn new() -> Self {
            let (notify_shutdown, _) = broadcast::channel(1);
            let (complete_tx, _complete_rx) = mpsc::channel(1);
            Self {
                state: Arc::new(ServerState::new(
                    RoomRegistry::standard(),
                    Arc::new(SilentNotifier),
                )),
                notify_shutdown,
                complete_tx,
            }
        }

        /// Register `session` and build a worker reading from `reader`
        async fn handler<R: AsyncRead + Unpin + Send>(
            &self,
            session: &Arc<Session>,
            reader: R,
        ) -> ConnectionHandler<R> {
            self.state.register(session, None).await.unwrap();
            ConnectionHandler::new(
                Arc::clone(&self.state),
                Arc::clone(session),
                reader,
                Shutdown::new(self.notify_shutdown.subscribe()),
                self.complete_tx.clone(),
            )
        }
    }

    #[tokio::test]
    async fn test_scripted_session() {
        let harness = Harness::new();
        let (peer, mut peer_rx) = detached("Guest 1");
        harness.state.directory().add(peer.clone()).await;

        let (me, mut me_rx) = detached("Guest 2");
        let script: &[u8] = b"hello\n/r 9\n/r x\n/r 2\nin sports\n   \n/q\n";
        let handler = harness.handler(&me, script).await;
        handler.run().await.unwrap();

        let mine = queued_lines(&mut me_rx);
        assert_eq!(mine[0], "Hi Guest 2");
        assert!(mine.contains(&"Currently there are 2 user(s) on the platform including you.".to_string()));
        assert!(mine.contains(&"Incorrect option. You are still in 'Main'".to_string()));
        assert!(mine.contains(&"Usage: /r <room number>. You are still in 'Main'".to_string()));
        assert!(mine.contains(&"You successfully changed rooms. Welcome to 'Sports'".to_string()));
        assert_eq!(mine.last().unwrap(), "You're being disconnected...");

        let theirs = queued_lines(&mut peer_rx);
        assert_eq!(
            theirs,
            vec![
                "Guest 2 joined the chat.",
                "Guest 2: hello",
                "Guest 2 joined 'Sports' chatroom",
                "Guest 2 left the chat.",
                "Currently there are 1 user(s) on the platform.",
            ],
            "chat after the room change stays in Sports"
        );

        assert!(!harness.state.directory().contains(me.id()).await);
        assert!(me.is_closed());
        assert!(me.has_departed());
    }

    #[tokio::test]
    async fn test_eof_announces_departure() {
        let harness = Harness::new();
        let (peer, mut peer_rx) = detached("Guest 1");
        harness.state.directory().add(peer.clone()).await;

        let (me, _me_rx) = detached("Guest 2");
        let handler = harness.handler(&me, &b"bye without quitting"[..]).await;
        handler.run().await.unwrap();

        let theirs = queued_lines(&mut peer_rx);
        assert_eq!(theirs[1], "Guest 2: bye without quitting");
        assert_eq!(theirs[2], "Guest 2 left the chat.");
        assert!(me.is_closed());
        assert_eq!(harness.state.directory().len().await, 1);
        assert!(!harness.state.directory().contains(me.id()).await);
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let harness = Harness::new();
        let (me, _me_rx) = detached("Guest 1");
        let (_client, server) = tokio::io::duplex(64);
        let handler = harness
            .handler(&me, server)
            .await
            .with_idle_timeout(Some(Duration::from_millis(50)));

        let result = timeout(Duration::from_secs(2), handler.run()).await.unwrap();
        assert!(matches!(result, Err(ChatError::Timeout(_))));
        assert!(harness.state.directory().is_empty().await);
    }

    #[tokio::test]
    async fn test_reaped_session_stops_worker() {
        let harness = Harness::new();
        let (me, _me_rx) = detached("Guest 1");
        let (_client, server) = tokio::io::duplex(64);
        let handler = harness.handler(&me, server).await;
        let task = tokio::spawn(handler.run());

        me.mark_closed();
        timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(harness.state.directory().is_empty().await);
    }

    #[tokio::test]
    async fn test_shutdown_is_silent_to_others() {
        let harness = Harness::new();
        let (peer, mut peer_rx) = detached("Guest 1");
        harness.state.directory().add(peer.clone()).await;

        let (me, mut me_rx) = detached("Guest 2");
        let (mut client, server) = tokio::io::duplex(64);
        let handler = harness.handler(&me, server).await;
        let task = tokio::spawn(handler.run());

        client.write_all(b"hi\n").await.unwrap();
        tokio::task::yield_now().await;
        harness.notify_shutdown.send(()).unwrap();
        timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(queued_lines(&mut me_rx).last().unwrap(), "Server is shutting down. Goodbye.");
        assert!(!queued_lines(&mut peer_rx)
            .iter()
            .any(|l| l == "Guest 2 left the chat."));
        assert!(!harness.state.directory().contains(me.id()).await);
    }
}
