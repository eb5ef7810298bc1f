//! Inbound control message handling.

use std::sync::Arc;

use mirrorcast_core::protocol::{decode_client_message, encode};
use mirrorcast_core::{ClientMessage, ConnectionId, Decoded, ServerMessage};
use tracing::{debug, instrument, warn};

use super::registry::{ConnectionRegistry, SubscriptionChange};

/// Handle one inbound text frame from `conn_id`.
///
/// Returns the serialized reply to queue, if any. Malformed and unknown
/// frames are logged and dropped.
#[instrument(skip_all, fields(conn_id = %conn_id))]
pub fn handle_message(
    text: &str,
    conn_id: &ConnectionId,
    registry: &ConnectionRegistry,
) -> Option<Arc<str>> {
    let message = match decode_client_message(text) {
        Decoded::Message(message) => message,
        Decoded::Unknown(kind) => {
            debug!(kind, "ignoring unknown message type");
            return None;
        }
        Decoded::Malformed(e) => {
            warn!(error = %e, "discarding malformed message");
            return None;
        }
    };

    let reply = match message {
        ClientMessage::Subscribe { source_account_id } => {
            let _ = registry.update_subscription(conn_id, &source_account_id, SubscriptionChange::Add);
            None
        }
        ClientMessage::Unsubscribe { source_account_id } => {
            let _ = registry.update_subscription(conn_id, &source_account_id, SubscriptionChange::Remove);
            None
        }
        ClientMessage::Ping => Some(ServerMessage::pong()),
    }?;

    match encode(&reply) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            warn!(error = %e, "failed to serialize reply");
            None
        }
    }
}
