//! Client configuration.

use std::time::Duration;

use mirrorcast_core::constants::{RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_DELAY_MS, WS_PATH};
use mirrorcast_settings::ClientSettings;
use serde::{Deserialize, Serialize};

/// Configuration for an [`EventClient`](crate::EventClient).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// WebSocket URL of the event server.
    pub url: String,
    /// First reconnect delay in milliseconds.
    pub reconnect_base_delay_ms: u64,
    /// Reconnect delay cap in milliseconds.
    pub reconnect_max_delay_ms: u64,
    /// Bound on a single connect attempt in milliseconds.
    pub connect_timeout_ms: u64,
}

impl ClientConfig {
    /// Config for `url` with default timings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// First reconnect delay.
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    /// Reconnect delay cap.
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    /// Connect attempt timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: format!("ws://127.0.0.1:8080{WS_PATH}"),
            reconnect_base_delay_ms: RECONNECT_BASE_DELAY_MS,
            reconnect_max_delay_ms: RECONNECT_MAX_DELAY_MS,
            connect_timeout_ms: 10_000,
        }
    }
}

impl From<&ClientSettings> for ClientConfig {
    fn from(s: &ClientSettings) -> Self {
        Self {
            url: s.url.clone(),
            reconnect_base_delay_ms: s.reconnect_base_delay_ms,
            reconnect_max_delay_ms: s.reconnect_max_delay_ms,
            connect_timeout_ms: s.connect_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.reconnect_base_delay(), Duration::from_secs(1));
        assert_eq!(cfg.reconnect_max_delay(), Duration::from_secs(16));
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn new_keeps_default_timings() {
        let cfg = ClientConfig::new("ws://example:1/ws");
        assert_eq!(cfg.url, "ws://example:1/ws");
        assert_eq!(cfg.reconnect_base_delay_ms, 1_000);
    }

    #[test]
    fn from_settings() {
        let settings = ClientSettings {
            url: "ws://h:2/ws".into(),
            reconnect_max_delay_ms: 4_000,
            ..ClientSettings::default()
        };
        let cfg = ClientConfig::from(&settings);
        assert_eq!(cfg.url, "ws://h:2/ws");
        assert_eq!(cfg.reconnect_max_delay_ms, 4_000);
    }

    #[test]
    fn deserialize_partial_json() {
        let cfg: ClientConfig = serde_json::from_str(r#"{"connectTimeoutMs":250}"#).unwrap();
        assert_eq!(cfg.connect_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.reconnect_max_delay_ms, 16_000);
    }
}
