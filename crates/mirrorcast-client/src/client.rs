//! `EventClient`: connection lifecycle manager.
//!
//! A single actor task owns the transport, the reconnect timer and the
//! subscription record. The public handle talks to it over a command
//! channel and observes status through a watch channel.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use mirrorcast_core::Event;
use mirrorcast_core::protocol::encode;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, instrument, trace, warn};

use crate::backoff::ReconnectScheduler;
use crate::config::ClientConfig;
use crate::dispatcher::{MessageDispatcher, Registration};
use crate::errors::{ClientError, Result};
use crate::status::ConnectionStatus;
use crate::subscriptions::{SubscriptionMultiplexer, SubscriptionOp};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const COMMAND_CAPACITY: usize = 64;

enum Command {
    Connect {
        done: oneshot::Sender<()>,
    },
    Subscription {
        op: SubscriptionOp,
        source_account_id: String,
        reply: oneshot::Sender<bool>,
    },
    Subscriptions {
        reply: oneshot::Sender<Vec<String>>,
    },
    ReconnectAttempts {
        reply: oneshot::Sender<u32>,
    },
    Shutdown {
        done: Option<oneshot::Sender<()>>,
    },
}

/// Handle to a resilient observer connection.
///
/// The connection starts immediately and reconnects with exponential backoff
/// after every close until [`shutdown`](Self::shutdown).
pub struct EventClient {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    dispatcher: MessageDispatcher,
    task: JoinHandle<()>,
}

impl EventClient {
    /// Validate `config` and start the connection task.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn spawn(config: ClientConfig) -> Result<Self> {
        validate_url(&config.url)?;

        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (status_tx, status) = watch::channel(ConnectionStatus::Connecting);
        let dispatcher = MessageDispatcher::new();

        let actor = ConnectionActor {
            scheduler: ReconnectScheduler::new(
                config.reconnect_base_delay(),
                config.reconnect_max_delay(),
            ),
            config,
            transport: None,
            pending: None,
            connect_waiters: Vec::new(),
            subscriptions: SubscriptionMultiplexer::new(),
            dispatcher: dispatcher.clone(),
            status: status_tx,
        };
        let task = tokio::spawn(actor.run(command_rx));

        Ok(Self {
            commands,
            status,
            dispatcher,
            task,
        })
    }

    /// Connect now if no transport is held.
    ///
    /// A no-op while connected. While a reconnect timer is pending, cancels
    /// it and attempts immediately. While an attempt is already in flight,
    /// waits for that one. Resolves once the attempt has finished.
    pub async fn connect(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Connect { done }).await?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Send a `subscribe` for `source_account_id`.
    ///
    /// Returns `false` without queueing anything if not connected.
    pub async fn subscribe(&self, source_account_id: impl Into<String>) -> bool {
        self.subscription(SubscriptionOp::Subscribe, source_account_id.into())
            .await
    }

    /// Send an `unsubscribe` for `source_account_id`.
    ///
    /// Returns `false` without queueing anything if not connected.
    pub async fn unsubscribe(&self, source_account_id: impl Into<String>) -> bool {
        self.subscription(SubscriptionOp::Unsubscribe, source_account_id.into())
            .await
    }

    async fn subscription(&self, op: SubscriptionOp, source_account_id: String) -> bool {
        let (reply, rx) = oneshot::channel();
        let cmd = Command::Subscription {
            op,
            source_account_id,
            reply,
        };
        if self.send(cmd).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Source accounts subscribed on the current transport.
    pub async fn subscriptions(&self) -> Vec<String> {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Subscriptions { reply }).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Reconnect attempts scheduled since the last successful connection.
    pub async fn reconnect_attempts(&self) -> u32 {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::ReconnectAttempts { reply }).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or_default()
    }

    /// Register a handler for every inbound message.
    pub fn on_message(&self, handler: impl Fn(&Event) + Send + Sync + 'static) -> Registration {
        self.dispatcher.register(handler)
    }

    /// The handler registry.
    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// A receiver for status changes.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Wait until the status equals `target`.
    pub async fn wait_for(&self, target: ConnectionStatus) -> Result<()> {
        let mut rx = self.status.clone();
        rx.wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::Closed)
    }

    /// Cancel any pending reconnect or in-flight connect attempt, close the
    /// transport and stop the task.
    ///
    /// Idempotent.
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        if self.send(Command::Shutdown { done: Some(done) }).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Whether the connection task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.commands.send(cmd).await.map_err(|_| ClientError::Closed)
    }
}

impl Drop for EventClient {
    fn drop(&mut self) {
        let _ = self.commands.try_send(Command::Shutdown { done: None });
    }
}

impl std::fmt::Debug for EventClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventClient")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn validate_url(url: &str) -> Result<()> {
    let invalid = |reason: String| ClientError::InvalidUrl {
        url: url.to_owned(),
        reason,
    };
    let request = url.into_client_request().map_err(|e| invalid(e.to_string()))?;
    match request.uri().scheme_str() {
        Some("ws" | "wss") => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}

// ── Connection task ─────────────────────────────────────────────────────────

enum ConnectOutcome {
    Opened(Box<WsStream>),
    Failed(tungstenite::Error),
    TimedOut(Duration),
}

type ConnectFuture = Pin<Box<dyn Future<Output = ConnectOutcome> + Send>>;

struct ConnectionActor {
    config: ClientConfig,
    transport: Option<WsStream>,
    /// In-flight connect attempt, polled from the main loop.
    pending: Option<ConnectFuture>,
    connect_waiters: Vec<oneshot::Sender<()>>,
    scheduler: ReconnectScheduler,
    subscriptions: SubscriptionMultiplexer,
    dispatcher: MessageDispatcher,
    status: watch::Sender<ConnectionStatus>,
}

impl ConnectionActor {
    #[instrument(skip_all, fields(url = %self.config.url))]
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.start_connect();

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown { done }) => {
                        self.close().await;
                        if let Some(done) = done {
                            let _ = done.send(());
                        }
                        return;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        self.close().await;
                        return;
                    }
                },
                outcome = next_outcome(&mut self.pending) => self.finish_connect(outcome),
                frame = next_frame(&mut self.transport) => self.handle_frame(frame),
                () = self.scheduler.fired() => self.start_connect(),
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { done } => {
                if self.transport.is_some() {
                    debug!("connect requested while connected, ignoring");
                    let _ = done.send(());
                    return;
                }
                if self.pending.is_none() {
                    self.start_connect();
                }
                self.connect_waiters.push(done);
            }
            Command::Subscription {
                op,
                source_account_id,
                reply,
            } => {
                let sent = self.send_subscription(op, &source_account_id).await;
                let _ = reply.send(sent);
            }
            Command::Subscriptions { reply } => {
                let _ = reply.send(self.subscriptions.snapshot());
            }
            Command::ReconnectAttempts { reply } => {
                let _ = reply.send(self.scheduler.attempt());
            }
            // Handled in `run`.
            Command::Shutdown { .. } => {}
        }
    }

    fn start_connect(&mut self) {
        let _ = self.scheduler.cancel();
        self.set_status(ConnectionStatus::Connecting);

        let url = self.config.url.clone();
        let limit = self.config.connect_timeout();
        self.pending = Some(Box::pin(async move {
            match timeout(limit, connect_async(url)).await {
                Ok(Ok((ws, _response))) => ConnectOutcome::Opened(Box::new(ws)),
                Ok(Err(e)) => ConnectOutcome::Failed(e),
                Err(_) => ConnectOutcome::TimedOut(limit),
            }
        }));
    }

    fn finish_connect(&mut self, outcome: ConnectOutcome) {
        self.pending = None;
        match outcome {
            ConnectOutcome::Opened(ws) => {
                self.transport = Some(*ws);
                self.scheduler.reset();
                self.set_status(ConnectionStatus::Connected);
                info!("connected");
            }
            ConnectOutcome::Failed(e) => {
                warn!(error = %e, "connect attempt failed");
                self.handle_disconnect();
            }
            ConnectOutcome::TimedOut(limit) => {
                warn!(timeout = ?limit, "connect attempt timed out");
                self.handle_disconnect();
            }
        }
        for done in self.connect_waiters.drain(..) {
            let _ = done.send(());
        }
    }

    fn handle_disconnect(&mut self) {
        self.transport = None;
        self.subscriptions.clear();
        self.set_status(ConnectionStatus::Disconnected);
        let delay = self.scheduler.schedule();
        self.set_status(ConnectionStatus::Reconnecting);
        info!(attempt = self.scheduler.attempt(), ?delay, "reconnect scheduled");
    }

    fn handle_frame(&mut self, frame: Option<std::result::Result<Message, tungstenite::Error>>) {
        match frame {
            Some(Ok(Message::Text(text))) => {
                let _ = self.dispatcher.dispatch_text(text.as_str());
            }
            Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    let _ = self.dispatcher.dispatch_text(text);
                }
                Err(_) => debug!(len = data.len(), "discarding non-UTF-8 binary frame"),
            },
            // tungstenite queues the Pong reply itself.
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                trace!("control frame");
            }
            Some(Ok(Message::Close(frame))) => {
                match frame {
                    Some(f) => info!(code = u16::from(f.code), reason = f.reason.as_str(), "server closed connection"),
                    None => info!("server closed connection"),
                }
                self.handle_disconnect();
            }
            Some(Err(e)) => {
                warn!(error = %e, "transport error");
                self.handle_disconnect();
            }
            None => {
                info!("stream ended");
                self.handle_disconnect();
            }
        }
    }

    async fn send_subscription(&mut self, op: SubscriptionOp, source_account_id: &str) -> bool {
        let Some(ws) = self.transport.as_mut() else {
            debug!(?op, source_account_id, "not connected, dropping subscription request");
            return false;
        };
        let json = match encode(&op.message(source_account_id)) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize control message");
                return false;
            }
        };
        if let Err(e) = ws.send(Message::text(json)).await {
            warn!(error = %e, "failed to send control message");
            self.handle_disconnect();
            return false;
        }
        self.subscriptions.record(op, source_account_id);
        debug!(?op, source_account_id, "subscription sent");
        true
    }

    /// Timer first, then any in-flight attempt, then the transport.
    async fn close(&mut self) {
        let _ = self.scheduler.cancel();
        if self.pending.take().is_some() {
            debug!("abandoning in-flight connect attempt");
        }
        // Dropped senders resolve waiting `connect()` calls with `Closed`.
        self.connect_waiters.clear();
        if let Some(mut ws) = self.transport.take() {
            if timeout(self.config.connect_timeout(), ws.close(None)).await.is_err() {
                debug!("close handshake timed out");
            }
        }
        self.subscriptions.clear();
        self.set_status(ConnectionStatus::Closed);
        info!("client closed");
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            debug!(from = %previous, to = %status, "status changed");
        }
    }
}

async fn next_outcome(pending: &mut Option<ConnectFuture>) -> ConnectOutcome {
    match pending {
        Some(attempt) => attempt.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_frame(
    transport: &mut Option<WsStream>,
) -> Option<std::result::Result<Message, tungstenite::Error>> {
    match transport {
        Some(ws) => ws.next().await,
        None => std::future::pending().await,
    }
}
