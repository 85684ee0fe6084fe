//! Connection handles and user identities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Transport-assigned token for one live WebSocket connection.
///
/// Minted by the server on upgrade and never reused. Serialized as a bare
/// string (`conn_<uuid v7>`), which is what clients see as `socketId`.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Mint a fresh connection id.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// Wrap an existing id string without validation.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Client-asserted user identity.
///
/// Not authenticated and not format-checked: whatever string the client
/// registers with is the identity, including the empty string.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap an identity string.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrow the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_has_prefix() {
        let id = ConnectionId::new();
        assert!(id.as_str().starts_with("conn_"), "got: {id}");
    }

    #[test]
    fn connection_ids_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn connection_id_serializes_transparent() {
        let id = ConnectionId::from_raw("conn_abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"conn_abc\"");
    }

    #[test]
    fn user_id_accepts_any_string() {
        assert_eq!(UserId::from("").as_str(), "");
        assert_eq!(UserId::from("alice@example").to_string(), "alice@example");
    }

    #[test]
    fn user_id_deserializes_from_bare_string() {
        let id: UserId = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(id, UserId::new("bob"));
    }

    #[test]
    fn user_ids_order_lexically() {
        let mut ids = vec![UserId::from("carol"), UserId::from("alice"), UserId::from("bob")];
        ids.sort();
        assert_eq!(ids, vec![UserId::from("alice"), UserId::from("bob"), UserId::from("carol")]);
    }
}
