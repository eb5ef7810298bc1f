//! # mirrorcast-server
//!
//! Axum HTTP + `WebSocket` server that fans producer events out to observers.
//!
//! - Connection registry with per-connection subscription sets
//! - Subscription-aware broadcast router (empty set receives everything)
//! - Heartbeat monitor evicting peers that miss a Ping
//! - `/health` and Prometheus `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod producer;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use producer::EventProducer;
pub use server::EventServer;
