//! WebSocket connection management, subscription routing and heartbeat.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod registry;
pub mod router;
pub mod session;
