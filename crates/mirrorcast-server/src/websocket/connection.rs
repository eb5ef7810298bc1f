//! Per-connection server state.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use mirrorcast_core::ConnectionId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A frame queued for a connection's writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized JSON text, shared across every recipient of one broadcast.
    Text(Arc<str>),
    /// Transport-level liveness probe.
    Ping,
    /// Close frame; the writer stops after sending it.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// One accepted observer connection.
///
/// Owned by the [`ConnectionRegistry`](super::registry::ConnectionRegistry);
/// the subscription set is only mutated through registry operations.
pub struct Connection {
    id: ConnectionId,
    subscriptions: Mutex<HashSet<String>>,
    tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
    connected_at: Instant,
    is_alive: AtomicBool,
    dropped_messages: AtomicU64,
}

impl Connection {
    /// Create a connection that starts alive with an empty subscription set.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Outbound>, cancel: CancellationToken) -> Self {
        Self {
            id,
            subscriptions: Mutex::new(HashSet::new()),
            tx,
            cancel,
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Connection ID.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Queue a text frame without waiting.
    ///
    /// Returns `false` if the queue is full or closed, and increments the
    /// dropped message counter.
    pub fn send(&self, text: Arc<str>) -> bool {
        self.enqueue(Outbound::Text(text))
    }

    /// Queue a Ping frame.
    pub fn send_ping(&self) -> bool {
        self.enqueue(Outbound::Ping)
    }

    fn enqueue(&self, frame: Outbound) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Queue a close frame and cancel the session.
    ///
    /// The close frame is best-effort: if the queue is full the session is
    /// still cancelled.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.tx.try_send(Outbound::Close {
            code,
            reason: reason.to_owned(),
        });
        self.cancel.cancel();
    }

    /// Whether [`close`](Self::close) was called or the server is shutting down.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token the session task waits on.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Mark the connection as alive (pong received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Current liveness flag.
    pub fn is_alive(&self) -> bool {
        self.is_alive.load(Ordering::Relaxed)
    }

    /// Read and clear the liveness flag.
    ///
    /// Returns `true` if the peer answered since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Snapshot of the subscription set.
    pub fn subscriptions(&self) -> HashSet<String> {
        self.subscriptions.lock().clone()
    }

    /// Evaluate `f` against the live subscription set.
    pub(crate) fn with_subscriptions<R>(&self, f: impl FnOnce(&HashSet<String>) -> R) -> R {
        f(&self.subscriptions.lock())
    }

    pub(crate) fn subscribe(&self, source_account_id: &str) -> bool {
        self.subscriptions
            .lock()
            .insert(source_account_id.to_owned())
    }

    pub(crate) fn unsubscribe(&self, source_account_id: &str) -> bool {
        self.subscriptions.lock().remove(source_account_id)
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
