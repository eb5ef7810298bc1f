//! Protocol-wide constants shared by server and client.

/// Current version (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Path the WebSocket endpoint is mounted at.
pub const WS_PATH: &str = "/ws";

/// Heartbeat probe period in milliseconds.
pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// First reconnect delay in milliseconds.
pub const RECONNECT_BASE_DELAY_MS: u64 = 1_000;

/// Upper bound on any reconnect delay in milliseconds.
pub const RECONNECT_MAX_DELAY_MS: u64 = 16_000;

/// Human-readable text sent in the `connected` greeting.
pub const CONNECTED_MESSAGE: &str = "Connected to real-time event stream";

/// Close reason sent to every connection on server shutdown.
pub const SHUTDOWN_REASON: &str = "Server shutting down";

/// Close reason sent to connections evicted by the heartbeat monitor.
pub const HEARTBEAT_TIMEOUT_REASON: &str = "Heartbeat timeout";

/// WebSocket close code: normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// WebSocket close code: endpoint going away.
pub const CLOSE_GOING_AWAY: u16 = 1001;
