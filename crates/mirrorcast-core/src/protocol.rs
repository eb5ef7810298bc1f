//! Control messages exchanged between observers and the server.
//!
//! Every frame is one JSON object with a string `type`. Decoding never
//! raises: [`decode_client_message`] and [`decode_event`] return a
//! [`Decoded`] outcome and the caller decides whether to log or discard.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ProtocolError, Result};
use crate::events::{Event, timestamp_now};

/// Observer → server control message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Add a source account to this connection's subscription set.
    Subscribe {
        /// Source account to follow.
        #[serde(rename = "sourceAccountId")]
        source_account_id: String,
    },
    /// Remove a source account from this connection's subscription set.
    Unsubscribe {
        /// Source account to drop.
        #[serde(rename = "sourceAccountId")]
        source_account_id: String,
    },
    /// Application-level ping; answered with [`ServerMessage::Pong`].
    Ping,
}

impl ClientMessage {
    const TYPES: [&'static str; 3] = ["subscribe", "unsubscribe", "ping"];
}

/// Server → observer control message (domain events travel as [`Event`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Greeting sent once right after accept.
    Connected {
        /// Human-readable greeting.
        message: String,
        /// When the connection was accepted.
        timestamp: String,
    },
    /// Reply to [`ClientMessage::Ping`].
    Pong {
        /// When the reply was produced.
        timestamp: String,
    },
}

impl ServerMessage {
    /// Build the greeting with the current time.
    pub fn connected(message: impl Into<String>) -> Self {
        Self::Connected {
            message: message.into(),
            timestamp: timestamp_now(),
        }
    }

    /// Build a pong with the current time.
    pub fn pong() -> Self {
        Self::Pong {
            timestamp: timestamp_now(),
        }
    }
}

/// Outcome of decoding one inbound text frame.
#[derive(Debug)]
pub enum Decoded<T> {
    /// A well-formed message.
    Message(T),
    /// A well-formed object whose `type` this side does not understand.
    Unknown(String),
    /// Not a usable message at all.
    Malformed(ProtocolError),
}

impl<T> Decoded<T> {
    /// Return the message, discarding unknown and malformed outcomes.
    pub fn into_message(self) -> Option<T> {
        match self {
            Self::Message(m) => Some(m),
            Self::Unknown(_) | Self::Malformed(_) => None,
        }
    }
}

/// Parse text into a JSON object and return it with its `type` tag.
fn parse_tagged(text: &str) -> Result<(String, Value)> {
    let value: Value = serde_json::from_str(text)?;
    let Some(obj) = value.as_object() else {
        return Err(ProtocolError::NotAnObject);
    };
    let Some(tag) = obj.get("type").and_then(Value::as_str) else {
        return Err(ProtocolError::MissingType);
    };
    Ok((tag.to_owned(), value))
}

/// Decode an observer → server frame.
pub fn decode_client_message(text: &str) -> Decoded<ClientMessage> {
    let (tag, value) = match parse_tagged(text) {
        Ok(parsed) => parsed,
        Err(e) => return Decoded::Malformed(e),
    };
    if !ClientMessage::TYPES.contains(&tag.as_str()) {
        return Decoded::Unknown(tag);
    }
    match serde_json::from_value(value) {
        Ok(msg) => Decoded::Message(msg),
        Err(e) => Decoded::Malformed(e.into()),
    }
}

/// Decode a server → observer frame.
///
/// Every tagged object is an [`Event`] from the observer's point of view
/// (including `connected` and `pong`), so this never yields
/// [`Decoded::Unknown`].
pub fn decode_event(text: &str) -> Decoded<Event> {
    let value = match parse_tagged(text) {
        Ok((_, value)) => value,
        Err(e) => return Decoded::Malformed(e),
    };
    match serde_json::from_value(value) {
        Ok(event) => Decoded::Message(event),
        Err(e) => Decoded::Malformed(e.into()),
    }
}

/// Serialize any wire message to a text frame.
pub fn encode<T: Serialize>(message: &T) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}
