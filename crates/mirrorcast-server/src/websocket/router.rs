//! Subscription-aware event fan-out.

use std::collections::HashSet;
use std::sync::Arc;

use metrics::counter;
use mirrorcast_core::protocol::encode;
use mirrorcast_core::{Event, timestamp_now};
use tracing::{debug, warn};

use super::registry::ConnectionRegistry;
use crate::metrics::{WS_BROADCAST_DROPS_TOTAL, WS_BROADCAST_EVENTS_TOTAL};

/// Whether a connection with `subscriptions` should receive an event from `source`.
///
/// Events without a source reach everyone. An empty set means "everything".
pub fn should_deliver(subscriptions: &HashSet<String>, source: Option<&str>) -> bool {
    match source {
        None => true,
        Some(source) => subscriptions.is_empty() || subscriptions.contains(source),
    }
}

/// Routes producer events to registered connections.
pub struct BroadcastRouter {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastRouter {
    /// Create a router over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Stamp, serialize once, and queue `event` for every matching connection.
    ///
    /// Returns the number of connections the frame was queued for. A full or
    /// closed queue on one connection is counted and skipped.
    pub fn route(&self, event: &Event) -> usize {
        let stamped = event.clone().with_timestamp(timestamp_now());
        let frame: Arc<str> = match encode(&stamped) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(event_type = stamped.event_type(), error = %e, "failed to serialize event");
                return 0;
            }
        };
        let source = stamped.source_account_id();

        let mut delivered = 0;
        let mut dropped = 0u64;
        self.registry.for_each(|conn| {
            if !conn.with_subscriptions(|subs| should_deliver(subs, source)) {
                return;
            }
            if conn.send(frame.clone()) {
                delivered += 1;
            } else {
                dropped += 1;
                warn!(conn_id = %conn.id(), event_type = stamped.event_type(), "failed to queue event for client");
            }
        });

        counter!(WS_BROADCAST_EVENTS_TOTAL, "type" => stamped.event_type().to_owned()).increment(1);
        if dropped > 0 {
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(dropped);
        }
        debug!(
            event_type = stamped.event_type(),
            source_account_id = source,
            delivered,
            dropped,
            "routed event"
        );
        delivered
    }
}
