//! Background tasks that request reconciliation runs

use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::db::LocalStore;
use crate::remote::RemoteClient;

use super::coordinator::SyncCoordinator;

/// Follow the remote change stream, requesting a run per event.
///
/// Each (re)connect also requests a catch-up run for changes missed while
/// disconnected. After the stream fails or ends the task waits `retry` and
/// connects again, until aborted.
pub fn spawn_change_listener<L, R>(
    coordinator: SyncCoordinator<L, R>,
    retry: Duration,
) -> JoinHandle<()>
where
    L: LocalStore + 'static,
    R: RemoteClient + 'static,
{
    tokio::spawn(async move {
        loop {
            match coordinator.remote().changes().await {
                Ok(mut changes) => {
                    tracing::info!("Connected to remote change stream");
                    coordinator.request_detached();

                    while let Some(event) = changes.next().await {
                        match event {
                            Ok(event) => {
                                tracing::debug!(notice = ?event.notice, "Remote change received");
                                coordinator.request_detached();
                            }
                            Err(error) => {
                                tracing::warn!("Remote change stream failed: {error}");
                                break;
                            }
                        }
                    }
                    tracing::info!(retry_secs = retry.as_secs(), "Remote change stream closed");
                }
                Err(error) => {
                    tracing::warn!(
                        retry_secs = retry.as_secs(),
                        "Cannot open remote change stream: {error}"
                    );
                }
            }
            tokio::time::sleep(retry).await;
        }
    })
}

/// Request a run every `period`, starting one period from now
pub fn spawn_periodic<L, R>(coordinator: SyncCoordinator<L, R>, period: Duration) -> JoinHandle<()>
where
    L: LocalStore + 'static,
    R: RemoteClient + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            tracing::debug!("Periodic sync tick");
            coordinator.request_detached();
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::{ItemFilter, MemoryItemStore};
    use crate::models::ItemPayload;
    use crate::remote::{ItemCollection, MemoryRemote, RemoteOp};

    fn coordinator() -> SyncCoordinator<MemoryItemStore, MemoryRemote> {
        SyncCoordinator::new(
            Arc::new(MemoryItemStore::new()),
            Arc::new(MemoryRemote::new(Arc::new(ItemCollection::default()))),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_trigger_requests_runs() {
        let coordinator = coordinator();
        let task = spawn_periodic(coordinator.clone(), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        task.abort();
        assert_eq!(coordinator.stats().started, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn change_listener_pulls_remote_changes() {
        let coordinator = coordinator();
        let mut events = coordinator.subscribe();
        let task = spawn_change_listener(coordinator.clone(), Duration::from_secs(5));

        // Catch-up run on connect
        events.recv().await.unwrap();

        coordinator
            .remote()
            .collection()
            .create(&ItemPayload {
                text: "pushed".to_string(),
                updated_at: 1,
            })
            .unwrap();
        events.recv().await.unwrap();

        let items = coordinator.local().get_all(ItemFilter::Live).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "pushed");
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn change_listener_reconnects() {
        let coordinator = coordinator();
        let task = spawn_change_listener(coordinator.clone(), Duration::from_secs(5));
        let remote = Arc::clone(coordinator.remote());

        remote.wait_for_calls(RemoteOp::Changes, 1).await;
        remote.set_online(false);
        remote.disconnect_streams();
        // Offline: the next attempt fails and is retried
        remote.wait_for_calls(RemoteOp::Changes, 2).await;

        remote.set_online(true);
        remote.wait_for_calls(RemoteOp::Changes, 3).await;
        task.abort();
    }
}
