//! Item model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::util::now_millis;

/// Local identifier of an item, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalKey(Uuid);

impl LocalKey {
    /// Create a new unique local key using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this key
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for LocalKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocalKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identifier assigned by the remote service on first successful create
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteKey(String);

impl RemoteKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// An item in the local replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Local identifier, immutable for the lifetime of the record
    pub local_key: LocalKey,
    /// Remote identifier, absent until the first successful push
    pub remote_key: Option<RemoteKey>,
    /// Free-form user content
    pub text: String,
    /// Last mutation timestamp (Unix ms), the conflict tiebreaker
    pub updated_at: i64,
    /// Tombstone flag, kept until the remote delete is confirmed
    pub deleted: bool,
}

impl Item {
    /// Create a new local-only item with the given text
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            local_key: LocalKey::new(),
            remote_key: None,
            text: text.into(),
            updated_at: now_millis(),
            deleted: false,
        }
    }

    /// Materialize a remote record as a new local item
    #[must_use]
    pub fn from_remote(remote: &RemoteItem) -> Self {
        Self {
            local_key: LocalKey::new(),
            remote_key: Some(remote.id.clone()),
            text: remote.text.clone(),
            updated_at: remote.updated_at,
            deleted: false,
        }
    }

    /// Whether the remote service has ever acknowledged this item
    pub const fn is_known_to_remote(&self) -> bool {
        self.remote_key.is_some()
    }

    /// Mark this item as a tombstone
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    /// Request body carrying this item's content
    #[must_use]
    pub fn payload(&self) -> ItemPayload {
        ItemPayload {
            text: self.text.clone(),
            updated_at: self.updated_at,
        }
    }

    /// Whether the remote copy holds exactly this item's content
    pub fn matches_remote(&self, remote: &RemoteItem) -> bool {
        self.text == remote.text && self.updated_at == remote.updated_at
    }

    /// First line with whitespace collapsed, ellipsized past `max_len` characters
    #[must_use]
    pub fn preview(&self, max_len: usize) -> String {
        let first_line = self.text.lines().next().unwrap_or("");
        let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

        if collapsed.chars().count() <= max_len {
            return collapsed;
        }
        let mut truncated = collapsed
            .chars()
            .take(max_len.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

/// A record as held by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteItem {
    pub id: RemoteKey,
    pub text: String,
    pub updated_at: i64,
}

/// Body of create and update requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    pub text: String,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_local_key_unique() {
        assert_ne!(LocalKey::new(), LocalKey::new());
    }

    #[test]
    fn test_local_key_parse() {
        let key = LocalKey::new();
        let parsed: LocalKey = key.as_str().parse().unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn test_item_new_is_unsynced() {
        let item = Item::new("buy milk");
        assert_eq!(item.text, "buy milk");
        assert!(!item.deleted);
        assert!(!item.is_known_to_remote());
        assert!(item.updated_at > 0);
    }

    #[test]
    fn test_from_remote_copies_fields() {
        let remote = RemoteItem {
            id: RemoteKey::from("7"),
            text: "from server".to_string(),
            updated_at: 700,
        };
        let item = Item::from_remote(&remote);
        assert_eq!(item.remote_key, Some(RemoteKey::from("7")));
        assert_eq!(item.text, "from server");
        assert_eq!(item.updated_at, 700);
        assert!(item.matches_remote(&remote));
    }

    #[test]
    fn test_remote_item_wire_format() {
        let remote: RemoteItem =
            serde_json::from_str(r#"{"id":"42","text":"hi","updatedAt":100}"#).unwrap();
        assert_eq!(remote.id.as_str(), "42");
        assert_eq!(remote.updated_at, 100);

        let payload = ItemPayload {
            text: "hi".to_string(),
            updated_at: 100,
        };
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"text":"hi","updatedAt":100}"#
        );
    }

    #[test]
    fn test_preview_uses_first_line() {
        let item = Item::new("First   line\nSecond line");
        assert_eq!(item.preview(50), "First line");
        assert_eq!(item.preview(8), "First...");
    }
}
