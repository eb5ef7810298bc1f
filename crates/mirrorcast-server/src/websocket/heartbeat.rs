//! Periodic ping/pong liveness sweep.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use mirrorcast_core::ConnectionId;
use mirrorcast_core::constants::{CLOSE_GOING_AWAY, HEARTBEAT_TIMEOUT_REASON};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::ConnectionRegistry;
use crate::metrics::WS_HEARTBEAT_EVICTIONS_TOTAL;

/// Evicts connections that did not answer the previous probe.
pub struct HeartbeatMonitor {
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
}

impl HeartbeatMonitor {
    /// Create a monitor sweeping `registry` every `interval`.
    pub fn new(registry: Arc<ConnectionRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Run one sweep and return the IDs evicted.
    ///
    /// A connection whose flag is still clear from the previous sweep is
    /// closed with 1001 and removed; every other connection has its flag
    /// cleared and gets a Ping.
    pub fn tick(&self) -> Vec<ConnectionId> {
        let mut evicted = Vec::new();
        for conn in self.registry.snapshot() {
            if conn.check_alive() {
                if !conn.send_ping() {
                    debug!(conn_id = %conn.id(), "ping not queued");
                }
                continue;
            }
            warn!(conn_id = %conn.id(), age = ?conn.age(), "no pong since last probe, evicting");
            conn.close(CLOSE_GOING_AWAY, HEARTBEAT_TIMEOUT_REASON);
            let _ = self.registry.remove(conn.id());
            evicted.push(conn.id().clone());
        }
        if !evicted.is_empty() {
            counter!(WS_HEARTBEAT_EVICTIONS_TOTAL).increment(evicted.len() as u64);
        }
        evicted
    }

    /// Sweep every period until `cancel` fires. The first sweep happens one
    /// full period after start.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "heartbeat monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.tick();
                }
                () = cancel.cancelled() => {
                    debug!("heartbeat monitor stopped");
                    return;
                }
            }
        }
    }
}
