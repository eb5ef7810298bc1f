//! Connection lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the client is in its connect/reconnect cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// A connect attempt is in flight.
    Connecting,
    /// The transport is open.
    Connected,
    /// The transport closed or the attempt failed.
    Disconnected,
    /// A reconnect timer is armed.
    Reconnecting,
    /// Shut down; never reconnects.
    Closed,
}

impl ConnectionStatus {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }

    /// Whether this is the terminal state.
    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
