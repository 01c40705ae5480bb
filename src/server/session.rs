//! Server-side session handle
//!
//! A [`Session`] is shared between its own connection worker, every other
//! worker that broadcasts to it, and the liveness monitor. Everything on it is
//! therefore safe to call concurrently:
//! - the room id is an atomic;
//! - outbound data goes through an unbounded channel to a single writer task,
//!   so two messages can never interleave on the socket and a slow peer never
//!   blocks the sender;
//! - departure is claimed exactly once.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ChatError, Result};
use crate::notify::Notifier;
use crate::protocol::text::{encode_line, encode_lines};
use crate::server::room_manager::{RoomId, DEFAULT_ROOM};

/// Directory identity of a session. Display names are not unique.
pub type SessionId = Uuid;

/// Commands for a session's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Already framed bytes, one or more complete lines
    Data(Bytes),
    /// Flush and shut down the write side
    Close,
}

/// Closed flag plus a wake-up for whoever waits on it
#[derive(Debug, Default)]
struct Liveness {
    closed: AtomicBool,
    signal: Notify,
}

impl Liveness {
    fn mark_closed(&self) -> bool {
        let newly = !self.closed.swap(true, Ordering::AcqRel);
        if newly {
            self.signal.notify_waiters();
        }
        newly
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn wait(&self) {
        loop {
            let notified = self.signal.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    name: String,
    room: AtomicU32,
    peer: Option<SocketAddr>,
    outbound: mpsc::UnboundedSender<Outbound>,
    liveness: Arc<Liveness>,
    departed: AtomicBool,
    connected_at: Instant,
}

impl Session {
    fn with_channel(
        name: String,
        peer: Option<SocketAddr>,
        outbound: mpsc::UnboundedSender<Outbound>,
        liveness: Arc<Liveness>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            room: AtomicU32::new(DEFAULT_ROOM),
            peer,
            outbound,
            liveness,
            departed: AtomicBool::new(false),
            connected_at: Instant::now(),
        }
    }

    /// Create a session in the default room and spawn its writer task on
    /// `writer`. The writer stops on [`Session::close`], on the first write
    /// error, or once the session is dropped.
    pub fn spawn<W>(
        name: impl Into<String>,
        peer: Option<SocketAddr>,
        writer: W,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn_inner(name.into(), peer, writer, notifier, None)
    }

    /// Like [`Session::spawn`], but the writer task holds `complete` until it
    /// has flushed and exited, so whoever waits on the receiving end also
    /// waits for the last queued line.
    pub fn spawn_tracked<W>(
        name: impl Into<String>,
        peer: Option<SocketAddr>,
        writer: W,
        notifier: Arc<dyn Notifier>,
        complete: mpsc::Sender<()>,
    ) -> Arc<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn_inner(name.into(), peer, writer, notifier, Some(complete))
    }

    fn spawn_inner<W>(
        name: String,
        peer: Option<SocketAddr>,
        writer: W,
        notifier: Arc<dyn Notifier>,
        complete: Option<mpsc::Sender<()>>,
    ) -> Arc<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let liveness = Arc::new(Liveness::default());
        let session = Arc::new(Self::with_channel(
            name,
            peer,
            tx,
            Arc::clone(&liveness),
        ));

        tokio::spawn(write_outbound(
            writer,
            rx,
            liveness,
            notifier,
            session.name.clone(),
            complete,
        ));

        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Current room
    pub fn room(&self) -> RoomId {
        self.room.load(Ordering::Acquire)
    }

    /// Move to another room. Callers validate `room` against the registry.
    pub fn set_room(&self, room: RoomId) {
        self.room.store(room, Ordering::Release);
    }

    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Queue one line
    pub fn send(&self, line: &str) -> Result<()> {
        self.send_bytes(encode_line(line))
    }

    /// Queue several lines that must reach the client back to back
    pub fn send_lines<S: AsRef<str>>(&self, lines: &[S]) -> Result<()> {
        self.send_bytes(encode_lines(lines))
    }

    /// Queue pre-encoded data. Broadcasts encode once and share the buffer.
    pub fn send_bytes(&self, data: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(ChatError::connection(format!(
                "Session {} is closed",
                self.name
            )));
        }
        self.outbound
            .send(Outbound::Data(data))
            .map_err(|_| ChatError::connection(format!("Writer for {} has stopped", self.name)))
    }

    /// Whether the underlying connection is known to be gone
    pub fn is_closed(&self) -> bool {
        self.liveness.is_closed()
    }

    /// Record that the connection is gone without touching the socket.
    /// Returns `true` the first time.
    pub fn mark_closed(&self) -> bool {
        self.liveness.mark_closed()
    }

    /// Mark closed and shut the write side down once queued data is flushed
    pub fn close(&self) {
        self.mark_closed();
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Resolves once the session has been marked closed by anyone
    pub async fn closed(&self) {
        self.liveness.wait().await
    }

    /// Claim the right to announce this session's departure. Only the first
    /// caller gets `true`.
    pub fn claim_departure(&self) -> bool {
        !self.departed.swap(true, Ordering::AcqRel)
    }

    pub fn has_departed(&self) -> bool {
        self.departed.load(Ordering::Acquire)
    }
}

async fn write_outbound<W>(
    writer: W,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    liveness: Arc<Liveness>,
    notifier: Arc<dyn Notifier>,
    name: String,
    _complete: Option<mpsc::Sender<()>>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut writer = BufWriter::new(writer);

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Outbound::Data(data) => {
                let written = async {
                    writer.write_all(&data).await?;
                    writer.flush().await
                }
                .await;

                if let Err(e) = written {
                    debug!("Write to {} failed: {}", name, e);
                    break;
                }

                if let Err(e) = notifier.notify(&name) {
                    debug!("Notification for {} failed: {}", name, e);
                }
            }
            Outbound::Close => {
                if let Err(e) = writer.shutdown().await {
                    debug!("Shutdown of {} failed: {}", name, e);
                }
                break;
            }
        }
    }

    liveness.mark_closed();
    debug!("Writer for {} stopped", name);
}
