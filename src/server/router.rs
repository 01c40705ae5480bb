//! Broadcast routing
//!
//! Both operations take a directory snapshot when called. A session that joins
//! or leaves after that point neither receives nor misses that message. A
//! failed delivery is logged and skipped.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::protocol::text::encode_line;
use crate::server::directory::SessionDirectory;
use crate::server::session::Session;

#[derive(Debug, Clone)]
pub struct BroadcastRouter {
    directory: Arc<SessionDirectory>,
}

impl BroadcastRouter {
    pub fn new(directory: Arc<SessionDirectory>) -> Self {
        Self { directory }
    }

    /// Deliver `message` to every live session except `sender`.
    /// Returns the number of sessions it was handed to.
    pub async fn broadcast_to_all(&self, sender: &Session, message: &str) -> usize {
        if message.is_empty() {
            return 0;
        }
        let targets = self.directory.others(sender.id()).await;
        deliver(&targets, message)
    }

    /// Deliver `message` to the sessions sharing `sender`'s current room,
    /// except `sender`
    pub async fn broadcast_to_room(&self, sender: &Session, message: &str) -> usize {
        if message.is_empty() {
            return 0;
        }
        let targets = self
            .directory
            .others_in_room(sender.id(), sender.room())
            .await;
        deliver(&targets, message)
    }
}

fn deliver(targets: &[Arc<Session>], message: &str) -> usize {
    let data = encode_line(message);
    let mut delivered = 0;
    for target in targets {
        match target.send_bytes(data.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => warn!("Delivery to {} failed: {}", target.name(), e),
        }
    }
    trace!("Delivered to {}/{} sessions", delivered, targets.len());
    delivered
}
