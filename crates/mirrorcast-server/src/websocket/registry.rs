//! Registry of live connections.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::gauge;
use mirrorcast_core::ConnectionId;
use parking_lot::RwLock;
use tracing::debug;

use super::connection::Connection;
use crate::metrics::WS_CONNECTIONS_ACTIVE;

/// Direction of a subscription update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionChange {
    /// Add the source account to the set.
    Add,
    /// Remove the source account from the set.
    Remove,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    /// Set by `close_all`; later arrivals are closed with the same frame.
    sealed: Option<(u16, String)>,
}

/// All registered connections, keyed by ID.
///
/// One lock serializes every add, remove, iteration and subscription update.
/// Iteration order is unspecified.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, returning any entry it replaced.
    ///
    /// After [`close_all`](Self::close_all) the connection is closed with the
    /// same code and reason instead of being registered.
    pub fn add(&self, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        let mut inner = self.inner.write();
        if let Some((code, reason)) = &inner.sealed {
            debug!(conn_id = %connection.id(), "registry closed, rejecting connection");
            connection.close(*code, reason);
            return None;
        }
        let previous = inner
            .connections
            .insert(connection.id().clone(), connection);
        record_active(inner.connections.len());
        previous
    }

    /// Remove a connection. Unknown IDs are a no-op.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let mut inner = self.inner.write();
        let removed = inner.connections.remove(id);
        if removed.is_some() {
            record_active(inner.connections.len());
        }
        removed
    }

    /// Look up a connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.inner.read().connections.get(id).cloned()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.inner.read().connections.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.read().connections.is_empty()
    }

    /// Whether [`close_all`](Self::close_all) has run.
    pub fn is_sealed(&self) -> bool {
        self.inner.read().sealed.is_some()
    }

    /// IDs of every registered connection.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.inner.read().connections.keys().cloned().collect()
    }

    /// Call `f` for each registered connection while holding the read lock.
    ///
    /// `f` must not call back into the registry's mutating operations.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<Connection>)) {
        for conn in self.inner.read().connections.values() {
            f(conn);
        }
    }

    /// Clone out every registered connection.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.inner.read().connections.values().cloned().collect()
    }

    /// Add or remove a source account on one connection's set.
    ///
    /// Returns `false` if the connection is not registered.
    pub fn update_subscription(
        &self,
        id: &ConnectionId,
        source_account_id: &str,
        change: SubscriptionChange,
    ) -> bool {
        let inner = self.inner.write();
        let Some(conn) = inner.connections.get(id) else {
            return false;
        };
        let changed = match change {
            SubscriptionChange::Add => conn.subscribe(source_account_id),
            SubscriptionChange::Remove => conn.unsubscribe(source_account_id),
        };
        debug!(conn_id = %id, source_account_id, ?change, changed, "subscription updated");
        true
    }

    /// Close and remove every connection, and seal the registry so later
    /// arrivals are closed the same way. Returns how many were closed.
    pub fn close_all(&self, code: u16, reason: &str) -> usize {
        let drained: Vec<_> = {
            let mut inner = self.inner.write();
            inner.sealed = Some((code, reason.to_owned()));
            let drained = inner.connections.drain().map(|(_, c)| c).collect();
            record_active(0);
            drained
        };
        for conn in &drained {
            conn.close(code, reason);
        }
        drained.len()
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_active(count: usize) {
    gauge!(WS_CONNECTIONS_ACTIVE).set(count as f64);
}
