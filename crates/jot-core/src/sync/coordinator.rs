//! Single-flight reconciliation runs
//!
//! [`SyncCoordinator::request`] never starts a second run while one is in
//! flight. Requests made during a run collapse into exactly one follow-up run,
//! and every handle resolves with the outcome of the first run that started at
//! or after its request.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::FutureExt;
use tokio::sync::{broadcast, oneshot};

use crate::db::{ItemFilter, LocalStore};
use crate::remote::RemoteClient;

use super::apply::{execute, RunReport};
use super::plan::plan;

const EVENT_CAPACITY: usize = 64;

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    /// Running, with a follow-up run already owed
    RunningQueued,
}

/// Why a run gave up before planning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    LocalSnapshot(String),
    RemoteSnapshot(String),
    /// The run task died before reporting
    Interrupted,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalSnapshot(error) => write!(f, "local snapshot unavailable: {error}"),
            Self::RemoteSnapshot(error) => write!(f, "remote snapshot unavailable: {error}"),
            Self::Interrupted => f.write_str("run interrupted"),
        }
    }
}

/// Result of one reconciliation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunReport),
    /// Neither replica was touched. `run` is 0 when unknown.
    Aborted { run: u64, reason: AbortReason },
}

impl RunOutcome {
    pub const fn run(&self) -> u64 {
        match self {
            Self::Completed(report) => report.run,
            Self::Aborted { run, .. } => *run,
        }
    }

    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub const fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Aborted { .. } => None,
        }
    }
}

/// Broadcast after every finished run; views refresh on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub outcome: RunOutcome,
    /// A coalesced follow-up run starts right after this one
    pub follow_up: bool,
}

/// Cumulative run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub started: u64,
    pub completed: u64,
    pub aborted: u64,
}

/// Resolves once the run serving its request has finished
#[must_use = "a request runs regardless; await the handle to observe its outcome"]
pub struct SyncHandle {
    receiver: oneshot::Receiver<RunOutcome>,
}

impl Future for SyncHandle {
    type Output = RunOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            received.unwrap_or(RunOutcome::Aborted {
                run: 0,
                reason: AbortReason::Interrupted,
            })
        })
    }
}

type Waiters = Vec<oneshot::Sender<RunOutcome>>;

struct State {
    phase: Phase,
    /// Waiting on the run in flight
    current: Waiters,
    /// Waiting on the coalesced follow-up run
    queued: Waiters,
    stats: SyncStats,
}

struct Inner<L, R> {
    local: Arc<L>,
    remote: Arc<R>,
    state: Mutex<State>,
    events: broadcast::Sender<SyncEvent>,
}

/// Serialises reconciliation runs between a local and a remote replica
pub struct SyncCoordinator<L, R> {
    inner: Arc<Inner<L, R>>,
}

impl<L, R> Clone for SyncCoordinator<L, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L, R> SyncCoordinator<L, R>
where
    L: LocalStore + 'static,
    R: RemoteClient + 'static,
{
    pub fn new(local: Arc<L>, remote: Arc<R>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                local,
                remote,
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    current: Vec::new(),
                    queued: Vec::new(),
                    stats: SyncStats::default(),
                }),
                events,
            }),
        }
    }

    /// Ask for a reconciliation run.
    ///
    /// Must be called from within a tokio runtime.
    pub fn request(&self) -> SyncHandle {
        let (sender, receiver) = oneshot::channel();

        let start = {
            let mut state = self.inner.state();
            match state.phase {
                Phase::Idle => {
                    state.phase = Phase::Running;
                    state.current.push(sender);
                    true
                }
                Phase::Running | Phase::RunningQueued => {
                    state.phase = Phase::RunningQueued;
                    state.queued.push(sender);
                    false
                }
            }
        };

        if start {
            tokio::spawn(Arc::clone(&self.inner).drive());
        }
        SyncHandle { receiver }
    }

    /// Request a run without waiting for its outcome
    pub fn request_detached(&self) {
        drop(self.request());
    }

    pub fn phase(&self) -> Phase {
        self.inner.state().phase
    }

    pub fn stats(&self) -> SyncStats {
        self.inner.state().stats
    }

    /// Receive a [`SyncEvent`] for every run finished after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn local(&self) -> &Arc<L> {
        &self.inner.local
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.inner.remote
    }
}

impl<L, R> Inner<L, R> {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<L, R> Inner<L, R>
where
    L: LocalStore + 'static,
    R: RemoteClient + 'static,
{
    async fn drive(self: Arc<Self>) {
        loop {
            let run = {
                let mut state = self.state();
                state.stats.started += 1;
                state.stats.started
            };

            let outcome = AssertUnwindSafe(self.run_once(run))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    tracing::error!(run, "Reconciliation run panicked");
                    RunOutcome::Aborted {
                        run,
                        reason: AbortReason::Interrupted,
                    }
                });

            let (waiters, follow_up) = {
                let mut state = self.state();
                if outcome.is_completed() {
                    state.stats.completed += 1;
                } else {
                    state.stats.aborted += 1;
                }

                let waiters = std::mem::take(&mut state.current);
                match state.phase {
                    Phase::RunningQueued => {
                        state.phase = Phase::Running;
                        state.current = std::mem::take(&mut state.queued);
                        (waiters, true)
                    }
                    Phase::Running | Phase::Idle => {
                        state.phase = Phase::Idle;
                        (waiters, false)
                    }
                }
            };

            for waiter in waiters {
                // The caller may have dropped its handle
                let _ = waiter.send(outcome.clone());
            }
            let _ = self.events.send(SyncEvent { outcome, follow_up });

            if !follow_up {
                break;
            }
        }
    }

    async fn run_once(&self, run: u64) -> RunOutcome {
        tracing::debug!(run, "Reconciliation run started");
        let (local_items, remote_items) =
            tokio::join!(self.local.get_all(ItemFilter::All), self.remote.list());

        let local_items = match local_items {
            Ok(items) => items,
            Err(error) => {
                tracing::warn!(run, "Sync aborted, local snapshot failed: {error}");
                return RunOutcome::Aborted {
                    run,
                    reason: AbortReason::LocalSnapshot(error.to_string()),
                };
            }
        };
        let remote_items = match remote_items {
            Ok(items) => items,
            Err(error) => {
                tracing::warn!(run, "Sync aborted, remote snapshot failed: {error}");
                return RunOutcome::Aborted {
                    run,
                    reason: AbortReason::RemoteSnapshot(error.to_string()),
                };
            }
        };

        let planned = plan(&local_items, &remote_items);
        tracing::debug!(
            run,
            local = local_items.len(),
            remote = remote_items.len(),
            actions = planned.len(),
            "Reconciliation planned"
        );

        let mut report = execute(self.local.as_ref(), self.remote.as_ref(), planned).await;
        report.run = run;
        tracing::info!(
            run,
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            purged = report.purged,
            refreshed = report.refreshed,
            pulled = report.pulled,
            skipped = report.skipped,
            failed = report.failed,
            "Reconciliation run completed"
        );
        RunOutcome::Completed(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryItemStore;
    use crate::error::{Error, Result};
    use crate::models::{Item, ItemPayload, LocalKey, RemoteKey};
    use crate::remote::{ItemCollection, MemoryRemote, RemoteOp};
    use pretty_assertions::assert_eq;

    type TestCoordinator = SyncCoordinator<MemoryItemStore, MemoryRemote>;

    fn coordinator() -> TestCoordinator {
        SyncCoordinator::new(
            Arc::new(MemoryItemStore::new()),
            Arc::new(MemoryRemote::new(Arc::new(ItemCollection::default()))),
        )
    }

    fn seed_remote(coordinator: &TestCoordinator, text: &str, updated_at: i64) -> RemoteKey {
        coordinator
            .remote()
            .collection()
            .create(&ItemPayload {
                text: text.to_string(),
                updated_at,
            })
            .unwrap()
            .id
    }

    async fn live_texts(coordinator: &TestCoordinator) -> Vec<String> {
        let mut texts: Vec<String> = coordinator
            .local()
            .get_all(ItemFilter::Live)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.text)
            .collect();
        texts.sort();
        texts
    }

    #[tokio::test]
    async fn creation_flow() {
        let coordinator = coordinator();
        let item = Item::new("buy milk");
        coordinator.local().put(&item).await.unwrap();

        let outcome = coordinator.request().await;
        assert_eq!(outcome.report().map(|report| report.created), Some(1));

        let stored = coordinator
            .local()
            .get_by_key(&item.local_key)
            .await
            .unwrap()
            .unwrap();
        let key = stored.remote_key.clone().unwrap();
        let remote = coordinator.remote().collection().get(&key).unwrap();
        assert_eq!(remote.text, "buy milk");
        assert_eq!(remote.updated_at, stored.updated_at);
        assert_eq!(coordinator.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn deletion_flow() {
        let coordinator = coordinator();
        coordinator.local().put(&Item::new("short-lived")).await.unwrap();
        coordinator.request().await;

        let mut item = coordinator
            .local()
            .get_all(ItemFilter::Live)
            .await
            .unwrap()
            .remove(0);
        item.mark_deleted();
        coordinator.local().put(&item).await.unwrap();

        let outcome = coordinator.request().await;
        assert_eq!(outcome.report().map(|report| report.deleted), Some(1));
        assert!(coordinator.local().is_empty().await);
        assert!(coordinator.remote().collection().is_empty());
    }

    #[tokio::test]
    async fn remote_origin_pull() {
        let coordinator = coordinator();
        let key = seed_remote(&coordinator, "from elsewhere", 7);

        coordinator.request().await;
        coordinator.request().await;

        let items = coordinator.local().get_all(ItemFilter::All).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].remote_key, Some(key));
        assert_eq!(items[0].text, "from elsewhere");
        assert_eq!(items[0].updated_at, 7);
    }

    #[tokio::test]
    async fn server_wins_on_conflict() {
        let coordinator = coordinator();
        let key = seed_remote(&coordinator, "new", 200);
        let mut stale = Item::new("old");
        stale.remote_key = Some(key);
        stale.updated_at = 100;
        coordinator.local().put(&stale).await.unwrap();

        let outcome = coordinator.request().await;
        assert_eq!(outcome.report().map(|report| report.refreshed), Some(1));

        let stored = coordinator
            .local()
            .get_by_key(&stale.local_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.text, "new");
        assert_eq!(stored.updated_at, 200);
    }

    #[tokio::test]
    async fn ghost_remote_delete() {
        let coordinator = coordinator();
        let mut ghost = Item::new("deleted elsewhere");
        ghost.remote_key = Some(RemoteKey::from("42"));
        coordinator.local().put(&ghost).await.unwrap();

        coordinator.request().await;
        assert_eq!(
            coordinator.local().get_by_key(&ghost.local_key).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn repeated_runs_converge() {
        let coordinator = coordinator();
        seed_remote(&coordinator, "remote one", 10);
        let gone = seed_remote(&coordinator, "remote two", 20);
        coordinator.local().put(&Item::new("local one")).await.unwrap();
        coordinator.local().put(&Item::new("")).await.unwrap();
        let mut tombstone = Item::new("local tombstone");
        tombstone.mark_deleted();
        coordinator.local().put(&tombstone).await.unwrap();

        coordinator.request().await;
        // Deleted elsewhere after the first pull
        let pulled = coordinator
            .local()
            .get_by_remote_key(&gone)
            .await
            .unwrap()
            .unwrap();
        let mut deleted = pulled;
        deleted.mark_deleted();
        coordinator.local().put(&deleted).await.unwrap();

        coordinator.request().await;
        let last = coordinator.request().await;
        assert_eq!(last.report().map(RunReport::attempted), Some(0));

        let mut remote_texts: Vec<String> = coordinator
            .remote()
            .collection()
            .list()
            .into_iter()
            .map(|item| item.text)
            .collect();
        remote_texts.sort();
        assert_eq!(remote_texts, vec!["local one", "remote one"]);
        assert_eq!(live_texts(&coordinator).await, remote_texts);
        assert!(coordinator
            .local()
            .get_all(ItemFilter::Deleted)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn overlapping_requests_coalesce() {
        let coordinator = coordinator();
        coordinator.remote().pause_list();

        let first = coordinator.request();
        coordinator
            .remote()
            .wait_for_calls(RemoteOp::List, 1)
            .await;
        assert_eq!(coordinator.phase(), Phase::Running);

        let queued: Vec<SyncHandle> = (0..10).map(|_| coordinator.request()).collect();
        assert_eq!(coordinator.phase(), Phase::RunningQueued);

        coordinator.remote().resume_list();
        assert_eq!(first.await.run(), 1);
        for handle in queued {
            assert_eq!(handle.await.run(), 2);
        }

        assert_eq!(coordinator.stats().started, 2);
        assert_eq!(coordinator.remote().calls(RemoteOp::List), 2);
        assert_eq!(coordinator.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn unreachable_remote_aborts_without_mutation() {
        let coordinator = coordinator();
        let item = Item::new("offline capture");
        coordinator.local().put(&item).await.unwrap();
        coordinator.remote().set_online(false);

        let outcome = coordinator.request().await;
        assert!(matches!(
            outcome,
            RunOutcome::Aborted {
                run: 1,
                reason: AbortReason::RemoteSnapshot(_)
            }
        ));
        let stored = coordinator
            .local()
            .get_by_key(&item.local_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, item);
        assert_eq!(coordinator.remote().calls(RemoteOp::Create), 0);
        assert_eq!(
            coordinator.stats(),
            SyncStats {
                started: 1,
                completed: 0,
                aborted: 1
            }
        );

        coordinator.remote().set_online(true);
        assert!(coordinator.request().await.is_completed());
    }

    struct UnreadableStore;

    impl LocalStore for UnreadableStore {
        async fn put(&self, _item: &Item) -> Result<()> {
            Err(Error::Database("unavailable".to_string()))
        }

        async fn get_all(&self, _filter: ItemFilter) -> Result<Vec<Item>> {
            Err(Error::Database("unavailable".to_string()))
        }

        async fn get_by_key(&self, _key: &LocalKey) -> Result<Option<Item>> {
            Err(Error::Database("unavailable".to_string()))
        }

        async fn get_by_remote_key(&self, _key: &RemoteKey) -> Result<Option<Item>> {
            Err(Error::Database("unavailable".to_string()))
        }

        async fn delete(&self, _key: &LocalKey) -> Result<()> {
            Err(Error::Database("unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn unreadable_local_store_aborts() {
        let remote = Arc::new(MemoryRemote::new(Arc::new(ItemCollection::default())));
        let coordinator = SyncCoordinator::new(Arc::new(UnreadableStore), Arc::clone(&remote));
        remote
            .collection()
            .create(&ItemPayload {
                text: "untouched".to_string(),
                updated_at: 1,
            })
            .unwrap();

        let outcome = coordinator.request().await;
        assert!(matches!(
            outcome,
            RunOutcome::Aborted {
                reason: AbortReason::LocalSnapshot(_),
                ..
            }
        ));
        assert_eq!(remote.collection().len(), 1);
    }

    #[tokio::test]
    async fn finished_runs_are_broadcast() {
        let coordinator = coordinator();
        let mut events = coordinator.subscribe();

        let outcome = coordinator.request().await;
        let event = events.recv().await.unwrap();
        assert_eq!(event.outcome, outcome);
        assert!(!event.follow_up);
    }

    #[tokio::test]
    async fn dropped_handle_does_not_stall_the_run() {
        let coordinator = coordinator();
        coordinator.local().put(&Item::new("fire and forget")).await.unwrap();
        let mut events = coordinator.subscribe();

        coordinator.request_detached();
        let event = events.recv().await.unwrap();
        assert!(event.outcome.is_completed());
        assert_eq!(coordinator.remote().collection().len(), 1);
    }
}
