//! Domain events fanned out to observers.
//!
//! An [`Event`] is a type tag, an optional source account, and arbitrary
//! payload fields flattened into the same JSON object:
//!
//! ```json
//! {"type":"trade_detected","sourceAccountId":"acc1","tradeId":"t1","timestamp":"..."}
//! ```
//!
//! Events are built once by the producer and never mutated afterwards. The
//! broadcast router stamps `timestamp` at delivery time via
//! [`Event::with_timestamp`], which consumes the value and returns a new one.

use chrono::SecondsFormat;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ProtocolError, Result};

/// Keys owned by the envelope; payload fields may not shadow them.
const RESERVED_KEYS: [&str; 3] = ["type", "sourceAccountId", "timestamp"];

/// Current UTC time as RFC 3339 with millisecond precision.
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A domain event as it travels over the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

impl Event {
    /// Create an event with no source and an empty payload.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source_account_id: None,
            timestamp: None,
            payload: Map::new(),
        }
    }

    /// Scope the event to a source account.
    #[must_use]
    pub fn with_source(mut self, source_account_id: impl Into<String>) -> Self {
        self.source_account_id = Some(source_account_id.into());
        self
    }

    /// Add a payload field. Envelope keys (`type`, `sourceAccountId`,
    /// `timestamp`) are ignored.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if RESERVED_KEYS.contains(&key.as_str()) {
            tracing::debug!(key, "ignoring reserved payload key");
            return self;
        }
        let _ = self.payload.insert(key, value.into());
        self
    }

    /// Return a copy stamped with the given delivery timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Build an event from a typed domain payload.
    pub fn from_domain<E: DomainEvent>(
        source_account_id: impl Into<String>,
        payload: &E,
    ) -> Result<Self> {
        let Value::Object(fields) = serde_json::to_value(payload)? else {
            return Err(ProtocolError::PayloadNotAnObject {
                event_type: E::EVENT_TYPE.to_owned(),
            });
        };
        let mut event = Self::new(E::EVENT_TYPE).with_source(source_account_id);
        for (key, value) in fields {
            event = event.with_field(key, value);
        }
        Ok(event)
    }

    /// Decode the payload back into a typed domain event.
    ///
    /// Returns `None` if the type tag does not match or the payload is
    /// missing required fields.
    pub fn to_domain<E: DomainEvent + DeserializeOwned>(&self) -> Option<E> {
        if self.event_type != E::EVENT_TYPE {
            return None;
        }
        serde_json::from_value(Value::Object(self.payload.clone())).ok()
    }

    /// The type tag.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The source account this event is scoped to, if any.
    pub fn source_account_id(&self) -> Option<&str> {
        self.source_account_id.as_deref()
    }

    /// Delivery timestamp, set by the router.
    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    /// Payload fields (excluding the envelope).
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Look up one payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

/// A typed payload with a fixed event type tag.
pub trait DomainEvent: Serialize {
    /// Wire `type` value for this payload.
    const EVENT_TYPE: &'static str;
}

/// Direction of a detected trade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

/// A trade observed on a source account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeDetected {
    /// Upstream trade identifier.
    pub trade_id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: TradeSide,
    /// Filled quantity.
    pub quantity: f64,
    /// Fill price.
    pub price: f64,
}

impl DomainEvent for TradeDetected {
    const EVENT_TYPE: &'static str = "trade_detected";
}

/// Outcome of mirroring a source trade onto a target account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorCompleted {
    /// Source trade that was mirrored.
    pub trade_id: String,
    /// Account the trade was copied to.
    pub target_account_id: String,
    /// Whether the mirror order was accepted.
    pub success: bool,
    /// Failure reason when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DomainEvent for MirrorCompleted {
    const EVENT_TYPE: &'static str = "mirror_completed";
}

/// Health of the upstream stream for a source account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    /// Upstream stream is live.
    Connected,
    /// Upstream stream dropped.
    Disconnected,
    /// Upstream stream reported an error.
    Error,
}

/// Upstream stream health change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    /// New state.
    pub status: StreamState,
    /// Optional detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DomainEvent for StreamStatus {
    const EVENT_TYPE: &'static str = "stream_status";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_trade() -> TradeDetected {
        TradeDetected {
            trade_id: "t1".into(),
            symbol: "ES".into(),
            side: TradeSide::Buy,
            quantity: 2.0,
            price: 5012.25,
        }
    }

    #[test]
    fn payload_fields_flatten_into_envelope() {
        let event = Event::new("custom").with_source("acc1").with_field("n", 3);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "custom", "sourceAccountId": "acc1", "n": 3}));
    }

    #[test]
    fn unscoped_event_omits_source_and_timestamp() {
        let value = serde_json::to_value(Event::new("heartbeat")).unwrap();
        assert_eq!(value, json!({"type": "heartbeat"}));
    }

    #[test]
    fn deserialize_collects_unknown_fields_into_payload() {
        let event: Event = serde_json::from_str(
            r#"{"type":"x","sourceAccountId":"a","timestamp":"2026-01-01T00:00:00.000Z","k":[1,2]}"#,
        )
        .unwrap();
        assert_eq!(event.event_type(), "x");
        assert_eq!(event.source_account_id(), Some("a"));
        assert_eq!(event.timestamp(), Some("2026-01-01T00:00:00.000Z"));
        assert_eq!(event.get("k"), Some(&json!([1, 2])));
        assert_eq!(event.payload().len(), 1);
    }

    #[test]
    fn reserved_keys_are_not_shadowed() {
        let event = Event::new("x")
            .with_field("type", "evil")
            .with_field("timestamp", "never");
        assert_eq!(event.event_type(), "x");
        assert!(event.timestamp().is_none());
        assert!(event.payload().is_empty());
    }

    #[test]
    fn with_timestamp_overwrites() {
        let event = Event::new("x").with_timestamp("a").with_timestamp("b");
        assert_eq!(event.timestamp(), Some("b"));
    }

    #[test]
    fn trade_detected_wire_shape() {
        let event = Event::from_domain("acc1", &sample_trade()).unwrap();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "trade_detected");
        assert_eq!(value["sourceAccountId"], "acc1");
        assert_eq!(value["tradeId"], "t1");
        assert_eq!(value["side"], "buy");
        assert_eq!(value["price"], 5012.25);
    }

    #[test]
    fn domain_payload_decodes_back() {
        let event = Event::from_domain("acc1", &sample_trade()).unwrap();
        let trade: TradeDetected = event.to_domain().unwrap();
        assert_eq!(trade, sample_trade());
    }

    #[test]
    fn to_domain_rejects_mismatched_type() {
        let event = Event::from_domain("acc1", &sample_trade()).unwrap();
        assert!(event.to_domain::<MirrorCompleted>().is_none());
    }

    #[test]
    fn mirror_completed_omits_empty_error() {
        let result = MirrorCompleted {
            trade_id: "t1".into(),
            target_account_id: "acc9".into(),
            success: true,
            error: None,
        };
        let event = Event::from_domain("acc1", &result).unwrap();
        assert_eq!(event.event_type(), "mirror_completed");
        assert!(event.get("error").is_none());
        assert_eq!(event.get("targetAccountId"), Some(&json!("acc9")));
    }

    #[test]
    fn stream_status_lowercase_state() {
        let status = StreamStatus {
            status: StreamState::Disconnected,
            message: Some("upstream closed".into()),
        };
        let event = Event::from_domain("acc2", &status).unwrap();
        assert_eq!(event.get("status"), Some(&json!("disconnected")));
    }

    #[test]
    fn timestamp_now_is_rfc3339_millis_utc() {
        let ts = timestamp_now();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
        // "YYYY-MM-DDTHH:MM:SS.mmmZ"
        assert_eq!(ts.len(), 24);
    }
}
