//! Multi-room, line-based TCP chat relay
//!
//! Clients connect over plain TCP and exchange newline-terminated UTF-8
//! lines. Each client gets a default `Guest N` name and starts in the `Main`
//! room; `/r <n>` switches rooms and `/q` leaves. Chat lines are relayed to
//! the sender's room, while joins, departures and room changes are
//! announced.

pub mod client;
pub mod config;
pub mod error;
pub mod notify;
pub mod protocol;
pub mod server;

pub use client::{ChatClient, Disconnect};
pub use config::{ClientConfig, Properties, ServerConfig};
pub use error::{ChatError, Result};
pub use server::ChatServer;
