//! # mirrorcast-core
//!
//! Shared vocabulary for the mirrorcast server and client:
//!
//! - **Events**: [`Event`] with a type tag, optional source account and free-form payload
//! - **Domain payloads**: trade detections, mirror results, stream status
//! - **Wire protocol**: [`ClientMessage`] / [`ServerMessage`] and the [`Decoded`] outcome
//! - **IDs**: [`ConnectionId`] newtype
//! - **Errors**: [`ProtocolError`] via `thiserror`
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod protocol;

pub use errors::ProtocolError;
pub use events::{DomainEvent, Event, timestamp_now};
pub use ids::ConnectionId;
pub use protocol::{ClientMessage, Decoded, ServerMessage};
