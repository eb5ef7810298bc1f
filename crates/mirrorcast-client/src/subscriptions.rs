//! Tracks which source accounts were subscribed on the current transport.

use std::collections::HashSet;

use mirrorcast_core::ClientMessage;

/// Subscribe or unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionOp {
    /// Add a source account.
    Subscribe,
    /// Remove a source account.
    Unsubscribe,
}

impl SubscriptionOp {
    /// Control message for this operation.
    pub fn message(self, source_account_id: &str) -> ClientMessage {
        let source_account_id = source_account_id.to_owned();
        match self {
            Self::Subscribe => ClientMessage::Subscribe { source_account_id },
            Self::Unsubscribe => ClientMessage::Unsubscribe { source_account_id },
        }
    }
}

/// Record of subscribe/unsubscribe messages sent on the live transport.
///
/// Nothing is queued while disconnected and nothing is replayed after a
/// reconnect; [`clear`](Self::clear) runs on every disconnect.
#[derive(Debug, Default)]
pub struct SubscriptionMultiplexer {
    active: HashSet<String>,
}

impl SubscriptionMultiplexer {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an operation that was successfully sent.
    pub fn record(&mut self, op: SubscriptionOp, source_account_id: &str) {
        match op {
            SubscriptionOp::Subscribe => {
                let _ = self.active.insert(source_account_id.to_owned());
            }
            SubscriptionOp::Unsubscribe => {
                let _ = self.active.remove(source_account_id);
            }
        }
    }

    /// Forget everything (transport went away).
    pub fn clear(&mut self) {
        self.active.clear();
    }

    /// Whether `source_account_id` is subscribed on this transport.
    pub fn contains(&self, source_account_id: &str) -> bool {
        self.active.contains(source_account_id)
    }

    /// Sorted snapshot of subscribed IDs.
    pub fn snapshot(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.iter().cloned().collect();
        ids.sort();
        ids
    }
}
