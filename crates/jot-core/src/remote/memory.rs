//! In-process [`RemoteClient`] with fault injection

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_stream::stream;
use futures::StreamExt;
use tokio::sync::{broadcast, watch, Notify};

use crate::models::{ItemPayload, RemoteItem, RemoteKey};

use super::collection::{CollectionError, ItemCollection};
use super::{ChangeEvent, ChangeStream, RemoteClient, RemoteError, RemoteResult};

/// Remote operations, for counters and injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    List,
    Create,
    Update,
    Delete,
    Get,
    Changes,
}

/// Talks directly to an [`ItemCollection`].
///
/// Tests can take it offline, queue failing statuses per operation, count
/// calls, hold `list` at a gate, and cut open change streams.
pub struct MemoryRemote {
    collection: Arc<ItemCollection>,
    online: AtomicBool,
    list_paused: watch::Sender<bool>,
    disconnects: watch::Sender<u64>,
    injected: Mutex<HashMap<RemoteOp, VecDeque<u16>>>,
    calls: Mutex<HashMap<RemoteOp, usize>>,
    called: Notify,
}

impl MemoryRemote {
    pub fn new(collection: Arc<ItemCollection>) -> Self {
        Self {
            collection,
            online: AtomicBool::new(true),
            list_paused: watch::Sender::new(false),
            disconnects: watch::Sender::new(0),
            injected: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            called: Notify::new(),
        }
    }

    pub fn collection(&self) -> &Arc<ItemCollection> {
        &self.collection
    }

    /// Offline makes every call fail as unreachable
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Fail the next call of `op` with `status`; queued statuses are used in order
    pub fn fail_next(&self, op: RemoteOp, status: u16) {
        lock(&self.injected).entry(op).or_default().push_back(status);
    }

    /// Hold every `list` call until [`Self::resume_list`]
    pub fn pause_list(&self) {
        self.list_paused.send_replace(true);
    }

    pub fn resume_list(&self) {
        self.list_paused.send_replace(false);
    }

    /// End every open change stream
    pub fn disconnect_streams(&self) {
        self.disconnects.send_modify(|generation| *generation += 1);
    }

    /// Number of calls made to `op` so far
    pub fn calls(&self, op: RemoteOp) -> usize {
        lock(&self.calls).get(&op).copied().unwrap_or(0)
    }

    /// Wait until `op` has been called at least `count` times
    pub async fn wait_for_calls(&self, op: RemoteOp, count: usize) {
        loop {
            let called = self.called.notified();
            if self.calls(op) >= count {
                return;
            }
            called.await;
        }
    }

    fn record(&self, op: RemoteOp) {
        *lock(&self.calls).entry(op).or_default() += 1;
        self.called.notify_waiters();
    }

    fn check(&self, op: RemoteOp) -> RemoteResult<()> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("remote is offline".to_string()));
        }
        let injected = lock(&self.injected)
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        match injected {
            Some(status) => Err(RemoteError::status(
                status,
                format!("injected failure ({status})"),
            )),
            None => Ok(()),
        }
    }

    fn enter(&self, op: RemoteOp) -> RemoteResult<()> {
        self.record(op);
        self.check(op)
    }
}

impl RemoteClient for MemoryRemote {
    async fn list(&self) -> RemoteResult<Vec<RemoteItem>> {
        self.record(RemoteOp::List);
        let mut paused = self.list_paused.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = paused.wait_for(|paused| !*paused).await;

        self.check(RemoteOp::List)?;
        Ok(self.collection.list())
    }

    async fn create(&self, payload: &ItemPayload) -> RemoteResult<RemoteItem> {
        self.enter(RemoteOp::Create)?;
        self.collection.create(payload).map_err(into_remote)
    }

    async fn update(&self, key: &RemoteKey, payload: &ItemPayload) -> RemoteResult<()> {
        self.enter(RemoteOp::Update)?;
        self.collection
            .update(key, payload)
            .map(|_| ())
            .map_err(into_remote)
    }

    async fn delete(&self, key: &RemoteKey) -> RemoteResult<()> {
        self.enter(RemoteOp::Delete)?;
        self.collection.delete(key).map_err(into_remote)
    }

    async fn get(&self, key: &RemoteKey) -> RemoteResult<Option<RemoteItem>> {
        self.enter(RemoteOp::Get)?;
        match self.collection.get(key) {
            Ok(item) => Ok(Some(item)),
            Err(CollectionError::NotFound(_) | CollectionError::Gone(_)) => Ok(None),
            Err(error) => Err(into_remote(error)),
        }
    }

    async fn changes(&self) -> RemoteResult<ChangeStream> {
        self.enter(RemoteOp::Changes)?;
        let mut notices = self.collection.subscribe();
        let mut disconnects = self.disconnects.subscribe();

        let events = stream! {
            loop {
                let received = tokio::select! {
                    received = notices.recv() => Some(received),
                    _ = disconnects.changed() => None,
                };
                match received {
                    Some(Ok(notice)) => yield Ok::<_, RemoteError>(ChangeEvent { notice: Some(notice) }),
                    // Missed notices still mean something changed
                    Some(Err(broadcast::error::RecvError::Lagged(_))) => yield Ok(ChangeEvent { notice: None }),
                    Some(Err(broadcast::error::RecvError::Closed)) | None => break,
                }
            }
        };
        Ok(events.boxed())
    }
}

fn into_remote(error: CollectionError) -> RemoteError {
    RemoteError::status(error.status_code(), error.to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::FailureKind;

    fn payload(text: &str) -> ItemPayload {
        ItemPayload {
            text: text.to_string(),
            updated_at: 1,
        }
    }

    #[tokio::test]
    async fn offline_calls_are_transient() {
        let remote = MemoryRemote::new(Arc::new(ItemCollection::default()));
        remote.set_online(false);
        let error = remote.list().await.unwrap_err();
        assert_eq!(error.kind(), FailureKind::Transient);
        assert_eq!(remote.calls(RemoteOp::List), 1);
    }

    #[tokio::test]
    async fn injected_status_applies_once() {
        let remote = MemoryRemote::new(Arc::new(ItemCollection::default()));
        remote.fail_next(RemoteOp::Create, 400);

        let error = remote.create(&payload("a")).await.unwrap_err();
        assert_eq!(error.kind(), FailureKind::Rejected);
        let created = remote.create(&payload("a")).await.unwrap();
        assert_eq!(created.id.as_str(), "1");
    }

    #[tokio::test]
    async fn get_maps_missing_to_none() {
        let remote = MemoryRemote::new(Arc::new(ItemCollection::default()));
        let created = remote.create(&payload("a")).await.unwrap();
        remote.delete(&created.id).await.unwrap();

        assert_eq!(remote.get(&created.id).await.unwrap(), None);
        assert_eq!(remote.get(&RemoteKey::from("99")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn change_stream_follows_collection() {
        let remote = MemoryRemote::new(Arc::new(ItemCollection::default()));
        let mut changes = remote.changes().await.unwrap();

        let created = remote.create(&payload("a")).await.unwrap();
        let event = changes.next().await.unwrap().unwrap();
        assert_eq!(event.notice.map(|notice| notice.id), Some(created.id));

        remote.disconnect_streams();
        assert!(changes.next().await.is_none());
    }
}
