//! Fan inbound messages out to registered handlers.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use mirrorcast_core::protocol::decode_event;
use mirrorcast_core::{Decoded, Event};
use parking_lot::Mutex;
use tracing::{error, trace, warn};

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Handler>>,
}

/// Registry of message handlers.
///
/// Cheap to clone; clones share the same handler set.
#[derive(Clone, Default)]
pub struct MessageDispatcher {
    handlers: Arc<Handlers>,
}

impl MessageDispatcher {
    /// Create a dispatcher with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every inbound message.
    pub fn register(&self, handler: impl Fn(&Event) + Send + Sync + 'static) -> Registration {
        let id = self.handlers.next_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.handlers.entries.lock().insert(id, Arc::new(handler));
        Registration {
            id,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.entries.lock().len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.entries.lock().is_empty()
    }

    /// Invoke every handler registered at call time with `event`.
    ///
    /// A panicking handler is logged and skipped. Returns how many handlers
    /// completed normally.
    pub fn dispatch(&self, event: &Event) -> usize {
        let snapshot: Vec<(u64, Handler)> = self
            .handlers
            .entries
            .lock()
            .iter()
            .map(|(id, h)| (*id, Arc::clone(h)))
            .collect();

        let mut completed = 0;
        for (handler_id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => completed += 1,
                Err(panic) => {
                    error!(
                        handler_id,
                        event_type = event.event_type(),
                        panic = panic_message(panic.as_ref()),
                        "message handler panicked"
                    );
                }
            }
        }
        completed
    }

    /// Decode one text frame and dispatch it.
    ///
    /// Returns `None` if the frame was malformed and discarded.
    pub fn dispatch_text(&self, text: &str) -> Option<usize> {
        match decode_event(text) {
            Decoded::Message(event) => {
                trace!(event_type = event.event_type(), "dispatching message");
                Some(self.dispatch(&event))
            }
            Decoded::Malformed(e) => {
                warn!(error = %e, "discarding malformed message");
                None
            }
            Decoded::Unknown(kind) => {
                warn!(kind, "discarding undecodable message");
                None
            }
        }
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("handlers", &self.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// Handle for one registered handler.
///
/// Dropping it leaves the handler registered; call [`remove`](Self::remove).
#[derive(Debug)]
pub struct Registration {
    id: u64,
    handlers: Weak<Handlers>,
}

impl Registration {
    /// Handler ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Deregister the handler. Returns `true` only on the first call.
    pub fn remove(&self) -> bool {
        self.handlers
            .upgrade()
            .is_some_and(|h| h.entries.lock().remove(&self.id).is_some())
    }
}
