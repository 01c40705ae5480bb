//! Liveness monitor
//!
//! Periodically reaps sessions whose connection is known to be closed but
//! which are still in the directory, e.g. a peer that vanished and was only
//! noticed by a failed write while its worker is still blocked reading.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::server::state::{ServerState, Shutdown};

pub struct LivenessMonitor {
    state: Arc<ServerState>,
    interval: Duration,
    shutdown: Shutdown,
}

impl LivenessMonitor {
    pub fn new(state: Arc<ServerState>, interval: Duration, shutdown: Shutdown) -> Self {
        Self {
            state,
            interval,
            shutdown,
        }
    }

    /// Tick until shutdown
    pub async fn run(mut self) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("Liveness monitor running every {:?}", self.interval);

        while !self.shutdown.is_shutdown() {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = self.shutdown.recv() => {}
            }
        }

        debug!("Liveness monitor stopped");
    }

    /// One pass over a directory snapshot. Returns how many sessions this pass
    /// reaped; sessions a worker already tore down are skipped.
    pub async fn sweep(&self) -> usize {
        let mut reaped = 0;
        for session in self.state.directory().snapshot().await {
            if !session.is_closed() {
                continue;
            }
            if self.state.depart(&session).await {
                session.close();
                info!("Reaped dead session {}", session.name());
                reaped += 1;
            }
        }
        reaped
    }
}
