//! Client error types.

use thiserror::Error;

/// Errors surfaced by [`EventClient`](crate::EventClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured URL cannot be used for a WebSocket handshake.
    #[error("invalid server URL {url:?}: {reason}")]
    InvalidUrl {
        /// URL as configured.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The client was shut down (or its task exited).
    #[error("client is closed")]
    Closed,
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
