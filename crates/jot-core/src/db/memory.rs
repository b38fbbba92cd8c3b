//! In-memory item store

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::{Item, LocalKey, RemoteKey};

use super::{ItemFilter, LocalStore};

/// Ephemeral `LocalStore` with the same constraints as the libSQL store.
#[derive(Default)]
pub struct MemoryItemStore {
    items: RwLock<HashMap<LocalKey, Item>>,
    fail_writes: AtomicBool,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put`/`delete` fail, simulating a storage fault
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(Error::Database("write rejected by storage fault".to_string()))
        } else {
            Ok(())
        }
    }
}

impl LocalStore for MemoryItemStore {
    async fn put(&self, item: &Item) -> Result<()> {
        self.check_writable()?;
        let mut items = self.items.write().await;

        if let Some(remote_key) = &item.remote_key {
            let taken = items.values().any(|other| {
                other.local_key != item.local_key && other.remote_key.as_ref() == Some(remote_key)
            });
            if taken {
                return Err(Error::Database(format!(
                    "remote key {remote_key} already belongs to another item"
                )));
            }
        }

        items.insert(item.local_key, item.clone());
        Ok(())
    }

    async fn get_all(&self, filter: ItemFilter) -> Result<Vec<Item>> {
        let items = self.items.read().await;
        let mut matching: Vec<Item> = items
            .values()
            .filter(|item| filter.admits(item))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(matching)
    }

    async fn get_by_key(&self, key: &LocalKey) -> Result<Option<Item>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn get_by_remote_key(&self, key: &RemoteKey) -> Result<Option<Item>> {
        Ok(self
            .items
            .read()
            .await
            .values()
            .find(|item| item.remote_key.as_ref() == Some(key))
            .cloned())
    }

    async fn delete(&self, key: &LocalKey) -> Result<()> {
        self.check_writable()?;
        self.items.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_rejects_duplicate_remote_key() {
        let store = MemoryItemStore::new();
        let mut first = Item::new("one");
        first.remote_key = Some(RemoteKey::from("1"));
        let mut second = Item::new("two");
        second.remote_key = Some(RemoteKey::from("1"));

        store.put(&first).await.unwrap();
        assert!(store.put(&second).await.is_err());
        // Re-putting the owner is fine
        store.put(&first).await.unwrap();
    }

    #[tokio::test]
    async fn write_faults_surface_as_errors() {
        let store = MemoryItemStore::new();
        store.set_fail_writes(true);
        assert!(store.put(&Item::new("nope")).await.is_err());
        assert!(store.is_empty().await);

        store.set_fail_writes(false);
        store.put(&Item::new("yes")).await.unwrap();
        assert_eq!(store.len().await, 1);
    }
}
