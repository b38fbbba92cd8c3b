//! Authoritative in-process item collection
//!
//! Holds the canonical copy of the collection the way the Jot service does:
//! sequential ids, server-side last-write-wins on update, and a change
//! notice for every mutation.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::{ChangeKind, ChangeNotice, ItemPayload, RemoteItem, RemoteKey};

/// Refusals raised by [`ItemCollection`], each mapping to an HTTP status
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("{0}")]
    Rejected(String),
    #[error("Item {0} not found")]
    NotFound(RemoteKey),
    #[error("Item {0} was deleted")]
    Gone(RemoteKey),
    #[error("Item {key} has a newer revision ({stored} > {incoming})")]
    Stale {
        key: RemoteKey,
        stored: i64,
        incoming: i64,
    },
}

impl CollectionError {
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Rejected(_) => 400,
            Self::NotFound(_) => 404,
            Self::Gone(_) => 410,
            Self::Stale { .. } => 409,
        }
    }
}

#[derive(Default)]
struct Records {
    next_id: u64,
    live: BTreeMap<u64, RemoteItem>,
    deleted: HashSet<u64>,
}

/// The canonical replica
pub struct ItemCollection {
    records: Mutex<Records>,
    changes: broadcast::Sender<ChangeNotice>,
}

impl ItemCollection {
    /// Create an empty collection whose change feed buffers `capacity` notices
    pub fn new(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            records: Mutex::new(Records {
                next_id: 1,
                ..Records::default()
            }),
            changes,
        }
    }

    /// Subscribe to change notices published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.changes.subscribe()
    }

    /// All live records, in id order
    pub fn list(&self) -> Vec<RemoteItem> {
        self.records().live.values().cloned().collect()
    }

    pub fn get(&self, key: &RemoteKey) -> Result<RemoteItem, CollectionError> {
        let records = self.records();
        let id = parse_id(key)?;
        if let Some(item) = records.live.get(&id) {
            return Ok(item.clone());
        }
        Err(missing(&records, id, key))
    }

    pub fn create(&self, payload: &ItemPayload) -> Result<RemoteItem, CollectionError> {
        validate_text(&payload.text)?;
        let item = {
            let mut records = self.records();
            let id = records.next_id;
            records.next_id += 1;
            let item = RemoteItem {
                id: RemoteKey::new(id.to_string()),
                text: payload.text.clone(),
                updated_at: payload.updated_at,
            };
            records.live.insert(id, item.clone());
            item
        };
        self.publish(ChangeKind::Created, &item.id);
        Ok(item)
    }

    /// Replace a record unless the stored revision is newer
    pub fn update(
        &self,
        key: &RemoteKey,
        payload: &ItemPayload,
    ) -> Result<RemoteItem, CollectionError> {
        let item = {
            let mut records = self.records();
            let id = parse_id(key)?;
            if !records.live.contains_key(&id) {
                return Err(missing(&records, id, key));
            }
            validate_text(&payload.text)?;

            let Some(stored) = records.live.get_mut(&id) else {
                return Err(CollectionError::NotFound(key.clone()));
            };
            if stored.updated_at > payload.updated_at {
                return Err(CollectionError::Stale {
                    key: key.clone(),
                    stored: stored.updated_at,
                    incoming: payload.updated_at,
                });
            }
            stored.text.clone_from(&payload.text);
            stored.updated_at = payload.updated_at;
            stored.clone()
        };
        self.publish(ChangeKind::Updated, key);
        Ok(item)
    }

    pub fn delete(&self, key: &RemoteKey) -> Result<(), CollectionError> {
        {
            let mut records = self.records();
            let id = parse_id(key)?;
            if records.live.remove(&id).is_none() {
                return Err(missing(&records, id, key));
            }
            records.deleted.insert(id);
        }
        self.publish(ChangeKind::Deleted, key);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, kind: ChangeKind, key: &RemoteKey) {
        // No subscribers is fine
        let _ = self.changes.send(ChangeNotice {
            kind,
            id: key.clone(),
        });
    }
}

impl Default for ItemCollection {
    fn default() -> Self {
        Self::new(256)
    }
}

fn parse_id(key: &RemoteKey) -> Result<u64, CollectionError> {
    key.as_str()
        .parse()
        .map_err(|_| CollectionError::NotFound(key.clone()))
}

fn missing(records: &Records, id: u64, key: &RemoteKey) -> CollectionError {
    if records.deleted.contains(&id) {
        CollectionError::Gone(key.clone())
    } else {
        CollectionError::NotFound(key.clone())
    }
}

fn validate_text(text: &str) -> Result<(), CollectionError> {
    if text.trim().is_empty() {
        Err(CollectionError::Rejected("text must not be empty".to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn payload(text: &str, updated_at: i64) -> ItemPayload {
        ItemPayload {
            text: text.to_string(),
            updated_at,
        }
    }

    #[test]
    fn create_assigns_sequential_ids() {
        let collection = ItemCollection::default();
        let first = collection.create(&payload("a", 1)).unwrap();
        let second = collection.create(&payload("b", 2)).unwrap();
        assert_eq!(first.id.as_str(), "1");
        assert_eq!(second.id.as_str(), "2");
        assert_eq!(collection.list(), vec![first, second]);
    }

    #[test]
    fn create_rejects_blank_text() {
        let collection = ItemCollection::default();
        let error = collection.create(&payload("   ", 1)).unwrap_err();
        assert_eq!(error.status_code(), 400);
        assert!(collection.is_empty());
    }

    #[test]
    fn update_enforces_last_write_wins() {
        let collection = ItemCollection::default();
        let item = collection.create(&payload("new", 200)).unwrap();

        let error = collection.update(&item.id, &payload("old", 100)).unwrap_err();
        assert_eq!(error.status_code(), 409);
        assert_eq!(collection.get(&item.id).unwrap().text, "new");

        let updated = collection.update(&item.id, &payload("newer", 300)).unwrap();
        assert_eq!(updated.text, "newer");
        assert_eq!(updated.updated_at, 300);
    }

    #[test]
    fn update_unknown_is_not_found() {
        let collection = ItemCollection::default();
        let error = collection
            .update(&RemoteKey::from("9"), &payload("x", 1))
            .unwrap_err();
        assert_eq!(error.status_code(), 404);
    }

    #[test]
    fn delete_distinguishes_gone_from_unknown() {
        let collection = ItemCollection::default();
        let item = collection.create(&payload("a", 1)).unwrap();

        collection.delete(&item.id).unwrap();
        assert_eq!(collection.delete(&item.id).unwrap_err().status_code(), 410);
        assert_eq!(collection.get(&item.id).unwrap_err().status_code(), 410);
        assert_eq!(
            collection
                .delete(&RemoteKey::from("77"))
                .unwrap_err()
                .status_code(),
            404
        );
    }

    #[test]
    fn mutations_publish_notices() {
        let collection = ItemCollection::default();
        let mut changes = collection.subscribe();

        let item = collection.create(&payload("a", 1)).unwrap();
        collection.update(&item.id, &payload("b", 2)).unwrap();
        collection.delete(&item.id).unwrap();

        let kinds: Vec<ChangeKind> = (0..3).map(|_| changes.try_recv().unwrap().kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Created, ChangeKind::Updated, ChangeKind::Deleted]
        );
    }
}
