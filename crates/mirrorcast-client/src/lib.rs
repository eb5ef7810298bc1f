//! # mirrorcast-client
//!
//! Observer side of mirrorcast: a WebSocket client that stays connected.
//!
//! - [`EventClient`]: lifecycle manager running as one owned actor task
//! - [`ReconnectScheduler`]: exponential backoff with a single pending timer
//! - [`SubscriptionMultiplexer`]: subscribe/unsubscribe on the live transport only
//! - [`MessageDispatcher`]: isolated fan-out to registered handlers

#![deny(unsafe_code)]

pub mod backoff;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod status;
pub mod subscriptions;

pub use backoff::ReconnectScheduler;
pub use client::EventClient;
pub use config::ClientConfig;
pub use dispatcher::{MessageDispatcher, Registration};
pub use errors::{ClientError, Result};
pub use status::ConnectionStatus;
pub use subscriptions::{SubscriptionMultiplexer, SubscriptionOp};
