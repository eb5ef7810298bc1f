//! Wire protocol errors.

use thiserror::Error;

/// Failure to decode or encode a wire message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The text was not valid JSON, or a known message had the wrong shape.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The JSON value was not an object.
    #[error("message is not a JSON object")]
    NotAnObject,
    /// The object had no string `type` field.
    #[error("message has no string `type` field")]
    MissingType,
    /// A domain payload did not serialize to a JSON object.
    #[error("payload for `{event_type}` is not a JSON object")]
    PayloadNotAnObject {
        /// The event type being built.
        event_type: String,
    },
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_error_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err = ProtocolError::from(json_err);
        assert!(err.to_string().starts_with("invalid JSON"));
    }

    #[test]
    fn missing_type_display() {
        assert_eq!(
            ProtocolError::MissingType.to_string(),
            "message has no string `type` field"
        );
    }

    #[test]
    fn payload_error_names_event_type() {
        let err = ProtocolError::PayloadNotAnObject {
            event_type: "trade_detected".into(),
        };
        assert!(err.to_string().contains("trade_detected"));
    }
}
