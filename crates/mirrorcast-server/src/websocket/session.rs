//! WebSocket session lifecycle: one accepted observer from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::counter;
use mirrorcast_core::constants::CONNECTED_MESSAGE;
use mirrorcast_core::protocol::encode;
use mirrorcast_core::{ConnectionId, ServerMessage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::{Connection, Outbound};
use super::handler::handle_message;
use super::registry::ConnectionRegistry;
use crate::metrics::{WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

/// How long the writer may keep flushing after the reader stops.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Run a session for an upgraded socket.
///
/// 1. Registers the connection and queues the `connected` greeting
/// 2. Spawns the writer task, the only place the socket sink is written
/// 3. Applies inbound control messages; Pong frames mark the peer alive
/// 4. Stops on peer close, transport error or cancellation, then
///    deregisters (idempotent with heartbeat eviction and shutdown)
#[instrument(skip_all, fields(conn_id = %id))]
pub async fn run_session(
    ws: WebSocket,
    id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
    queue_capacity: usize,
    cancel: CancellationToken,
) {
    let (send_tx, send_rx) = mpsc::channel(queue_capacity);
    let connection = Arc::new(Connection::new(id.clone(), send_tx, cancel.clone()));

    let _ = registry.add(connection.clone());
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!("client connected");

    match encode(&ServerMessage::connected(CONNECTED_MESSAGE)) {
        Ok(json) => {
            let _ = connection.send(Arc::from(json));
        }
        Err(e) => warn!(error = %e, "failed to serialize greeting"),
    }

    let (ws_tx, mut ws_rx) = ws.split();
    let mut writer = tokio::spawn(write_loop(ws_tx, send_rx));

    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("session cancelled");
                break;
            }
            frame = ws_rx.next() => frame,
        };

        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "transport error");
                break;
            }
            None => break,
        };

        let text = match msg {
            Message::Text(ref t) => Some(t.as_str()),
            Message::Binary(ref data) => {
                let decoded = std::str::from_utf8(data).ok();
                if decoded.is_none() {
                    debug!(len = data.len(), "discarding non-UTF-8 binary frame");
                }
                decoded
            }
            Message::Pong(_) => {
                connection.mark_alive();
                None
            }
            Message::Ping(_) => None,
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
        };

        if let Some(text) = text {
            if let Some(reply) = handle_message(text, &id, &registry) {
                if !connection.send(reply) {
                    debug!("failed to queue reply (channel full or closed)");
                }
            }
        }
    }

    let _ = registry.remove(&id);
    let duration = connection.age();
    // Dropping the last sender lets the writer drain and exit.
    drop(connection);
    if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }

    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    info!(?duration, "client disconnected");
}

async fn write_loop(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(frame) = rx.recv().await {
        let (msg, last) = match frame {
            Outbound::Text(text) => (Message::Text(text.as_ref().into()), false),
            Outbound::Ping => (Message::Ping(Vec::new().into()), false),
            Outbound::Close { code, reason } => (
                Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })),
                true,
            ),
        };
        if sink.send(msg).await.is_err() || last {
            break;
        }
    }
    // Flushes a pending close reply to a peer-initiated close.
    let _ = sink.close().await;
}
