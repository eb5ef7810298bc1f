//! Connection identifier newtype.
//!
//! IDs are UUID v7 (time-ordered) with a `conn_` prefix so they read well in
//! logs next to account IDs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque handle identifying one accepted transport session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a new random ID.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// Create from an existing string value.
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn new_id_has_prefix() {
        assert!(ConnectionId::new().as_str().starts_with("conn_"));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ConnectionId::from("conn_1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"conn_1\"");
    }

    #[test]
    fn display_matches_inner() {
        let id = ConnectionId::from_string("conn_xyz".into());
        assert_eq!(id.to_string(), "conn_xyz");
    }
}
