//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use mirrorcast_core::constants::{HEARTBEAT_INTERVAL_MS, WS_PATH};
use mirrorcast_settings::ServerSettings;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ServerError};

/// Configuration for the event server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Path the WebSocket endpoint is mounted at.
    pub ws_path: String,
    /// Heartbeat probe period in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Outbound queue depth per connection.
    pub send_queue_capacity: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Time allowed for background tasks to finish on shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl ServerConfig {
    /// Heartbeat period as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Shutdown drain timeout as a `Duration`.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Reject values that would stall the heartbeat or every session.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ServerError::InvalidConfig(msg));
        if !self.ws_path.starts_with('/') {
            return invalid(format!("wsPath must start with '/': {}", self.ws_path));
        }
        if self.heartbeat_interval_ms == 0 {
            return invalid("heartbeatIntervalMs must be positive".into());
        }
        if self.send_queue_capacity == 0 {
            return invalid("sendQueueCapacity must be positive".into());
        }
        if self.max_message_size == 0 {
            return invalid("maxMessageSize must be positive".into());
        }
        Ok(())
    }

    /// Parse `host:port` into a socket address.
    pub fn bind_address(&self) -> Result<SocketAddr> {
        let raw = if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        };
        raw.parse().map_err(|_| ServerError::InvalidAddress(raw))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ws_path: WS_PATH.into(),
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            send_queue_capacity: 256,
            max_message_size: 64 * 1024,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            ws_path: s.ws_path.clone(),
            heartbeat_interval_ms: s.heartbeat_interval_ms,
            send_queue_capacity: s.send_queue_capacity,
            max_message_size: s.max_message_size,
            shutdown_timeout_ms: s.shutdown_timeout_ms,
        }
    }
}
