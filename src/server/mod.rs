//! Chat relay server
//!
//! ## Task layout
//!
//! - **Acceptor** ([`ChatServer`]): accepts TCP connections, names and
//!   registers a session, spawns its worker
//! - **Worker** ([`ConnectionHandler`]): one per connection, reads and
//!   dispatches lines
//! - **Writer**: one per session, the only task that writes to its socket
//! - **Monitor** ([`LivenessMonitor`]): periodically reaps sessions whose
//!   connection is known to be closed

pub mod chat_server;
pub mod connection_handler;
pub mod directory;
pub mod monitor;
pub mod room_manager;
pub mod router;
pub mod session;
pub mod state;

pub use chat_server::ChatServer;
pub use connection_handler::{ConnectionHandler, SessionState};
pub use directory::SessionDirectory;
pub use monitor::LivenessMonitor;
pub use room_manager::{Room, RoomId, RoomRegistry, DEFAULT_ROOM};
pub use router::BroadcastRouter;
pub use session::{Session, SessionId};
pub use state::{ServerState, ServerStats, Shutdown};
