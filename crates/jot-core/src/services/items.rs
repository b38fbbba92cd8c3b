//! User-intent facade over the local replica and the coordinator

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::db::{ItemFilter, LocalStore};
use crate::error::{Error, Result};
use crate::models::{Item, LocalKey};
use crate::remote::RemoteClient;
use crate::sync::{RunOutcome, SyncCoordinator, SyncEvent, SyncHandle};

const AMBIGUOUS_PREVIEW: usize = 3;

/// A committed local mutation and the sync run it requested, if any
#[must_use]
pub struct Committed<T> {
    pub value: T,
    pub sync: Option<SyncHandle>,
}

impl<T> Committed<T> {
    /// Wait for the requested run; `None` when sync is disabled
    pub async fn synced(self) -> (T, Option<RunOutcome>) {
        let outcome = match self.sync {
            Some(handle) => Some(handle.await),
            None => None,
        };
        (self.value, outcome)
    }
}

/// What views use: local reads and writes, with sync behind them.
///
/// Mutations are committed locally before a run is requested. Storage
/// errors are returned; sync failures only show up in the outcome.
pub struct ItemService<L, R> {
    store: Arc<L>,
    coordinator: Option<SyncCoordinator<L, R>>,
}

impl<L, R> Clone for ItemService<L, R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<L, R> ItemService<L, R>
where
    L: LocalStore + 'static,
    R: RemoteClient + 'static,
{
    /// Sync-enabled service sharing the coordinator's local store
    pub fn new(coordinator: SyncCoordinator<L, R>) -> Self {
        Self {
            store: Arc::clone(coordinator.local()),
            coordinator: Some(coordinator),
        }
    }

    /// Service that never talks to a remote
    pub const fn local_only(store: Arc<L>) -> Self {
        Self {
            store,
            coordinator: None,
        }
    }

    pub const fn coordinator(&self) -> Option<&SyncCoordinator<L, R>> {
        self.coordinator.as_ref()
    }

    pub fn store(&self) -> &Arc<L> {
        &self.store
    }

    /// Capture a new item
    pub async fn create(&self, text: &str) -> Result<Committed<Item>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("item text cannot be empty".to_string()));
        }

        let item = Item::new(text);
        self.store.put(&item).await?;
        tracing::debug!(local_key = %item.local_key, "Item created");
        Ok(self.committed(item))
    }

    /// Mark an item deleted; it is purged once the remote confirms
    pub async fn delete(&self, key: &LocalKey) -> Result<Committed<Item>> {
        let mut item = self
            .store
            .get_by_key(key)
            .await?
            .filter(|item| !item.deleted)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;

        item.mark_deleted();
        self.store.put(&item).await?;
        tracing::debug!(local_key = %item.local_key, "Item marked deleted");
        Ok(self.committed(item))
    }

    /// Non-deleted items, newest first
    pub async fn visible_items(&self) -> Result<Vec<Item>> {
        let mut items = self.store.get_all(ItemFilter::Live).await?;
        items.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.local_key.cmp(&a.local_key))
        });
        Ok(items)
    }

    /// Resolve a visible item by local key, remote key, or unique local key prefix
    pub async fn find_by_prefix(&self, query: &str) -> Result<Item> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("item key cannot be empty".to_string()));
        }
        // Local keys are lowercase UUIDs; remote keys are opaque and compared as given
        let local_query = query.to_ascii_lowercase();

        let items = self.store.get_all(ItemFilter::Live).await?;
        if let Some(item) = items.iter().find(|item| {
            item.local_key.as_str() == local_query
                || item
                    .remote_key
                    .as_ref()
                    .is_some_and(|key| key.as_str() == query)
        }) {
            return Ok(item.clone());
        }

        let mut matching: Vec<Item> = items
            .into_iter()
            .filter(|item| item.local_key.as_str().starts_with(&local_query))
            .collect();
        match matching.len() {
            0 => Err(Error::NotFound(query.to_string())),
            1 => Ok(matching.remove(0)),
            _ => {
                let options = matching
                    .iter()
                    .take(AMBIGUOUS_PREVIEW)
                    .map(|item| item.local_key.as_str().chars().take(13).collect::<String>())
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(Error::InvalidInput(format!(
                    "key prefix '{query}' is ambiguous; matches: {options}"
                )))
            }
        }
    }

    /// Request a run and wait for it; `None` when sync is disabled
    pub async fn sync_now(&self) -> Option<RunOutcome> {
        match &self.coordinator {
            Some(coordinator) => Some(coordinator.request().await),
            None => None,
        }
    }

    /// View-refresh signal; `None` when sync is disabled
    pub fn subscribe(&self) -> Option<broadcast::Receiver<SyncEvent>> {
        self.coordinator.as_ref().map(SyncCoordinator::subscribe)
    }

    fn committed<T>(&self, value: T) -> Committed<T> {
        Committed {
            value,
            sync: self.coordinator.as_ref().map(SyncCoordinator::request),
        }
    }
}
