//! Event producer: the seam between the backend and the router.

use std::fmt;

use mirrorcast_core::errors::Result as ProtocolResult;
use mirrorcast_core::protocol::decode_event;
use mirrorcast_core::{Decoded, DomainEvent, Event};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Subscriber = Box<dyn Fn(&Event) + Send + Sync>;

/// Fans produced events out to an explicit list of subscribers.
///
/// Subscribers are registered by binding code at startup (typically
/// [`EventServer::bind_producer`](crate::server::EventServer::bind_producer)).
#[derive(Default)]
pub struct EventProducer {
    subscribers: Vec<Subscriber>,
}

impl EventProducer {
    /// Create a producer with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber.
    pub fn subscribe(&mut self, f: impl Fn(&Event) + Send + Sync + 'static) {
        self.subscribers.push(Box::new(f));
    }

    /// Number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Hand `event` to every subscriber.
    pub fn emit(&self, event: &Event) {
        for subscriber in &self.subscribers {
            subscriber(event);
        }
    }

    /// Build an event from a typed payload and emit it.
    pub fn emit_domain<E: DomainEvent>(&self, source_account_id: &str, payload: &E) -> ProtocolResult<()> {
        let event = Event::from_domain(source_account_id, payload)?;
        self.emit(&event);
        Ok(())
    }

    /// Emit one event per JSON line read from `reader` until EOF or `cancel`.
    ///
    /// Blank lines are skipped; malformed lines are logged and skipped.
    /// Returns the number of events emitted.
    pub async fn pump_lines<R>(&self, reader: R, cancel: CancellationToken) -> std::io::Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut emitted = 0;
        loop {
            let line = tokio::select! {
                () = cancel.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match decode_event(line) {
                Decoded::Message(event) => {
                    self.emit(&event);
                    emitted += 1;
                }
                Decoded::Malformed(e) => warn!(error = %e, "skipping malformed event line"),
                Decoded::Unknown(kind) => debug!(kind, "skipping event line"),
            }
        }
        Ok(emitted)
    }
}

impl fmt::Debug for EventProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventProducer")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
