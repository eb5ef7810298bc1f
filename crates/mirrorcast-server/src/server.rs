//! `EventServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use mirrorcast_core::ConnectionId;
use mirrorcast_core::constants::{CLOSE_NORMAL, SHUTDOWN_REASON};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::errors::{Result, ServerError};
use crate::health::{self, HealthResponse};
use crate::producer::EventProducer;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::heartbeat::HeartbeatMonitor;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::router::BroadcastRouter;
use crate::websocket::session::run_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The event distribution server.
///
/// Owns its registry and router; nothing is process-global.
pub struct EventServer {
    config: Arc<ServerConfig>,
    registry: Arc<ConnectionRegistry>,
    router: Arc<BroadcastRouter>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EventServer {
    /// Create a new server.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            config: Arc::new(config),
            router: Arc::new(BroadcastRouter::new(registry.clone())),
            registry,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
            start_time: Instant::now(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn app(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            shutdown: self.shutdown.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route(&self.config.ws_path, get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Route every event `producer` emits through this server's router.
    pub fn bind_producer(&self, producer: &mut EventProducer) {
        let router = self.router.clone();
        producer.subscribe(move |event| {
            let _ = router.route(event);
        });
    }

    /// Bind the listener, start the heartbeat monitor and serve.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        self.config.validate()?;
        let addr = self.config.bind_address()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local = listener.local_addr()?;

        let monitor = HeartbeatMonitor::new(self.registry.clone(), self.config.heartbeat_interval());
        let heartbeat = tokio::spawn(monitor.run(self.shutdown.token()));

        let app = self.app();
        let token = self.shutdown.token();
        let serve = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
        });

        self.tasks.lock().push(heartbeat);
        info!(addr = %local, path = %self.config.ws_path, "event server listening");
        Ok((local, serve))
    }

    /// Close every connection with 1000 "Server shutting down", then stop the
    /// listener and background tasks.
    ///
    /// New upgrades are refused before the registry is drained, and a session
    /// that registers after the drain is closed with the same frame.
    pub async fn shutdown(&self) {
        self.shutdown.begin_drain();
        let closed = self.registry.close_all(CLOSE_NORMAL, SHUTDOWN_REASON);
        info!(closed, "closing connections for shutdown");
        let tasks = std::mem::take(&mut *self.tasks.lock());
        self.shutdown
            .graceful_shutdown(tasks, self.config.shutdown_timeout())
            .await;
    }

    /// The broadcast router.
    pub fn router(&self) -> &Arc<BroadcastRouter> {
        &self.router
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The shutdown coordinator.
    pub fn shutdown_coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.registry.len()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET {ws_path}: WebSocket upgrade.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let cancel = state.shutdown.child_token();
    let capacity = state.config.send_queue_capacity;
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            run_session(socket, ConnectionId::new(), state.registry, capacity, cancel)
        })
}
