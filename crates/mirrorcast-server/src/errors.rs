//! Server error types.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised while starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured host/port pair is not a socket address.
    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),
    /// A configuration value cannot work at runtime.
    #[error("invalid server config: {0}")]
    InvalidConfig(String),
    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Any other listener I/O failure.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
