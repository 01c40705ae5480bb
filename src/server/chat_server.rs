//! TCP chat server
//!
//! [`ChatServer`] owns the listening socket. Every accepted connection gets a
//! [`Session`] registered in the directory and a [`ConnectionHandler`] task;
//! the [`LivenessMonitor`] runs alongside for the lifetime of the server.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{ChatError, Result};
use crate::notify::{BellNotifier, Notifier, SilentNotifier};
use crate::protocol::text;
use crate::server::connection_handler::ConnectionHandler;
use crate::server::monitor::LivenessMonitor;
use crate::server::room_manager::RoomRegistry;
use crate::server::session::Session;
use crate::server::state::{ServerState, Shutdown};

pub struct ChatServer {
    acceptor: Acceptor,
    /// Resolves once every worker and session writer has dropped its sender
    shutdown_complete_rx: mpsc::Receiver<()>,
}

/// Accept loop state. Dropped as a whole once the server stops accepting.
struct Acceptor {
    config: ServerConfig,
    state: Arc<ServerState>,
    listener: TcpListener,
    /// Each worker and the monitor subscribe; dropping it signals shutdown
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
}

impl ChatServer {
    /// Bind with the standard room set
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        Self::bind_with_rooms(config, RoomRegistry::standard()).await
    }

    pub async fn bind_with_rooms(config: ServerConfig, rooms: RoomRegistry) -> Result<Self> {
        let notifier: Arc<dyn Notifier> = if config.bell {
            Arc::new(BellNotifier)
        } else {
            Arc::new(SilentNotifier)
        };

        let listener = TcpListener::bind(config.bind_addr).await.map_err(|e| {
            ChatError::config(format!("Cannot listen on {}: {}", config.bind_addr, e))
        })?;
        info!("Server listening on {}", listener.local_addr()?);

        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, shutdown_complete_rx) = mpsc::channel(1);

        Ok(Self {
            acceptor: Acceptor {
                state: Arc::new(ServerState::new(rooms, notifier)),
                config,
                listener,
                notify_shutdown,
                shutdown_complete_tx,
            },
            shutdown_complete_rx,
        })
    }

    /// The bound address, useful when binding to port 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.acceptor.listener.local_addr()?)
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.acceptor.state)
    }

    /// Serve until `shutdown` resolves or the listener fails.
    ///
    /// On the way out every connected client is told the server is going
    /// away and disconnected. This only returns once all workers are done
    /// and every writer has flushed its last line.
    pub async fn run(self, shutdown: impl Future) -> Result<()> {
        let ChatServer {
            acceptor,
            mut shutdown_complete_rx,
        } = self;

        let monitor = LivenessMonitor::new(
            Arc::clone(&acceptor.state),
            acceptor.config.monitor_interval,
            Shutdown::new(acceptor.notify_shutdown.subscribe()),
        );
        let monitor_task = tokio::spawn(monitor.run());

        let result = tokio::select! {
            res = acceptor.accept_loop() => {
                if let Err(e) = &res {
                    error!(cause = %e, "Failed to accept");
                }
                res
            }
            _ = shutdown => {
                info!("Shutting down");
                Ok(())
            }
        };

        let stats = acceptor.state.stats().await;
        info!(
            "Disconnecting {} session(s), per room: {:?}",
            stats.total_sessions, stats.per_room
        );

        // Closes the listener, signals every subscriber and releases our
        // completion sender, so the receive below ends with the last worker
        // or writer.
        drop(acceptor);
        let _ = shutdown_complete_rx.recv().await;
        if let Err(e) = monitor_task.await {
            warn!("Liveness monitor task failed: {}", e);
        }

        info!("Server stopped");
        result
    }
}

impl Acceptor {
    async fn accept_loop(&self) -> Result<()> {
        loop {
            let (socket, peer) = self.accept().await?;
            self.admit(socket, peer).await;
        }
    }

    /// Next connection. Errors that only concern the one pending connection
    /// are logged and skipped.
    async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        loop {
            match self.listener.accept().await {
                Ok(pair) => return Ok(pair),
                Err(e) if is_transient(&e) => {
                    warn!("Dropped a connection during accept: {}", e);
                }
                Err(e) => {
                    return Err(ChatError::network(format!("Listener failed: {}", e)));
                }
            }
        }
    }

    async fn admit(&self, socket: TcpStream, peer: SocketAddr) {
        if let Err(e) = socket.set_nodelay(true) {
            debug!("set_nodelay failed for {}: {}", peer, e);
        }
        let (reader, writer) = socket.into_split();

        let name = format!("Guest {}", self.state.directory().len().await + 1);
        let session = Session::spawn_tracked(
            name,
            Some(peer),
            writer,
            self.state.notifier(),
            self.shutdown_complete_tx.clone(),
        );

        if let Err(e) = self
            .state
            .register(&session, self.config.max_connections)
            .await
        {
            warn!(cause = %e, "Refusing {}", peer);
            if let Err(e) = session.send(&text::server_full()) {
                debug!("Could not tell {} the server is full: {}", peer, e);
            }
            session.close();
            return;
        }

        info!("{} connected from {}", session.name(), peer);

        let handler = ConnectionHandler::new(
            Arc::clone(&self.state),
            session,
            reader,
            Shutdown::new(self.notify_shutdown.subscribe()),
            self.shutdown_complete_tx.clone(),
        )
        .with_idle_timeout(self.config.idle_timeout);

        tokio::spawn(async move {
            if let Err(e) = handler.run().await {
                debug!(cause = %e, "Connection from {} ended", peer);
            }
        });
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
