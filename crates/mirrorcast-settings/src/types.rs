//! Settings types and their compiled defaults.

use mirrorcast_core::constants::{
    HEARTBEAT_INTERVAL_MS, RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_DELAY_MS, WS_PATH,
};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Event server settings.
    pub server: ServerSettings,
    /// Observer client settings.
    pub client: ClientSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl Settings {
    /// Reject combinations that cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        if !self.server.ws_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "server.wsPath must start with '/': {}",
                self.server.ws_path
            )));
        }
        if self.server.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalMs must be positive".into(),
            ));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be positive".into(),
            ));
        }
        if self.client.reconnect_base_delay_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "client.reconnectBaseDelayMs must be positive".into(),
            ));
        }
        if self.client.reconnect_max_delay_ms < self.client.reconnect_base_delay_ms {
            return Err(SettingsError::InvalidValue(format!(
                "client.reconnectMaxDelayMs ({}) is below reconnectBaseDelayMs ({})",
                self.client.reconnect_max_delay_ms, self.client.reconnect_base_delay_ms
            )));
        }
        Ok(())
    }
}

/// Event server network and liveness settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` picks a free port).
    pub port: u16,
    /// Path of the WebSocket endpoint.
    pub ws_path: String,
    /// Heartbeat probe period in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Per-connection outbound queue depth.
    pub send_queue_capacity: usize,
    /// Maximum inbound frame size in bytes.
    pub max_message_size: usize,
    /// How long shutdown waits for background tasks, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ws_path: WS_PATH.to_string(),
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            send_queue_capacity: 256,
            max_message_size: 64 * 1024,
            shutdown_timeout_ms: 5_000,
        }
    }
}

/// Observer client connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Full WebSocket URL of the event server.
    pub url: String,
    /// First reconnect delay in milliseconds.
    pub reconnect_base_delay_ms: u64,
    /// Reconnect delay cap in milliseconds.
    pub reconnect_max_delay_ms: u64,
    /// Bound on a single connect attempt in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: format!("ws://127.0.0.1:8080{WS_PATH}"),
            reconnect_base_delay_ms: RECONNECT_BASE_DELAY_MS,
            reconnect_max_delay_ms: RECONNECT_MAX_DELAY_MS,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`..`error`) or an `EnvFilter` directive.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let settings = Settings::default();
        assert_eq!(settings.server.heartbeat_interval_ms, 30_000);
        assert_eq!(settings.server.ws_path, "/ws");
        assert_eq!(settings.client.reconnect_base_delay_ms, 1_000);
        assert_eq!(settings.client.reconnect_max_delay_ms, 16_000);
        assert_eq!(settings.client.url, "ws://127.0.0.1:8080/ws");
    }

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn camel_case_on_the_wire() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert!(json["server"]["heartbeatIntervalMs"].is_number());
        assert!(json["client"]["reconnectMaxDelayMs"].is_number());
    }

    #[test]
    fn validate_rejects_cap_below_base() {
        let mut settings = Settings::default();
        settings.client.reconnect_max_delay_ms = 500;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("reconnectMaxDelayMs"));
    }

    #[test]
    fn validate_rejects_relative_path() {
        let mut settings = Settings::default();
        settings.server.ws_path = "ws".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_heartbeat() {
        let mut settings = Settings::default();
        settings.server.heartbeat_interval_ms = 0;
        assert!(settings.validate().is_err());
    }
}
