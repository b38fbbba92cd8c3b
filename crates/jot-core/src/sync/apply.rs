//! Applying a reconciliation plan to both replicas
//!
//! Every network action goes through [`resolve`], one decision table mapping
//! (action, failure) to what happens locally. Write-backs re-read the item by
//! local key and change only the synced fields, so a mutation committed while
//! the run was in flight is kept.

use futures::future::join_all;

use crate::db::LocalStore;
use crate::error::Result;
use crate::models::{Item, RemoteItem, RemoteKey};
use crate::remote::{FailureKind, RemoteClient, RemoteError};

use super::plan::{Action, Plan};

/// Network action kinds that can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkAction {
    Delete,
    Create,
    Update,
}

/// Local consequence of a failed network action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Remove the local item
    Purge,
    /// Read the remote copy and let it win
    Refetch,
    /// Leave the item for the next run
    Skip,
}

/// Decide what a failed network action means for the local replica
pub fn resolve(action: NetworkAction, error: &RemoteError) -> Resolution {
    match (action, error.kind()) {
        (NetworkAction::Delete, FailureKind::Gone) => Resolution::Purge,
        (NetworkAction::Create, FailureKind::Rejected) => Resolution::Purge,
        // A 404 on create means the endpoint is wrong, not that the item is
        (NetworkAction::Create, FailureKind::Gone) if is_status(error, 410) => Resolution::Purge,
        (
            NetworkAction::Update,
            FailureKind::Conflict | FailureKind::Gone | FailureKind::Rejected,
        ) => Resolution::Refetch,
        _ => Resolution::Skip,
    }
}

fn is_status(error: &RemoteError, expected: u16) -> bool {
    matches!(error, RemoteError::Status { status, .. } if *status == expected)
}

/// What applying one action did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Pushed; the item now carries its remote key
    Created,
    /// Remote copy updated to the local content
    Updated,
    /// Remote delete confirmed and tombstone purged
    Deleted,
    /// Local item removed without a confirmed remote delete
    Purged,
    /// Local item overwritten with the remote copy
    Refreshed,
    /// Remote record materialised locally
    Pulled,
    /// Nothing left to do once the fresh local state was read
    Unchanged,
    /// Transient failure; retried next run
    Skipped,
    /// The local store failed
    Failed,
}

/// Counts of what one run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Sequence number assigned by the coordinator
    pub run: u64,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub purged: usize,
    pub refreshed: usize,
    pub pulled: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub converged: usize,
}

impl RunReport {
    pub fn record(&mut self, outcome: ActionOutcome) {
        let counter = match outcome {
            ActionOutcome::Created => &mut self.created,
            ActionOutcome::Updated => &mut self.updated,
            ActionOutcome::Deleted => &mut self.deleted,
            ActionOutcome::Purged => &mut self.purged,
            ActionOutcome::Refreshed => &mut self.refreshed,
            ActionOutcome::Pulled => &mut self.pulled,
            ActionOutcome::Unchanged => &mut self.unchanged,
            ActionOutcome::Skipped => &mut self.skipped,
            ActionOutcome::Failed => &mut self.failed,
        };
        *counter += 1;
    }

    /// Number of actions attempted
    pub const fn attempted(&self) -> usize {
        self.created
            + self.updated
            + self.deleted
            + self.purged
            + self.refreshed
            + self.pulled
            + self.unchanged
            + self.skipped
            + self.failed
    }

    /// Whether every action settled for good
    pub const fn is_clean(&self) -> bool {
        self.skipped == 0 && self.failed == 0
    }
}

/// Run every action of `plan` concurrently and tally the outcomes
pub async fn execute<L, R>(local: &L, remote: &R, plan: Plan) -> RunReport
where
    L: LocalStore,
    R: RemoteClient,
{
    let mut report = RunReport {
        converged: plan.converged,
        ..RunReport::default()
    };

    let outcomes = join_all(
        plan.actions
            .into_iter()
            .map(|action| apply_logged(local, remote, action)),
    )
    .await;

    for outcome in outcomes {
        report.record(outcome);
    }
    report
}

async fn apply_logged<L, R>(local: &L, remote: &R, action: Action) -> ActionOutcome
where
    L: LocalStore,
    R: RemoteClient,
{
    let label = action.label();
    match apply(local, remote, action).await {
        Ok(outcome) => {
            tracing::debug!(action = label, ?outcome, "Applied sync action");
            outcome
        }
        Err(error) => {
            tracing::warn!(action = label, "Local store failed during sync: {error}");
            ActionOutcome::Failed
        }
    }
}

/// Apply one action; only local storage failures are returned as errors
pub async fn apply<L, R>(local: &L, remote: &R, action: Action) -> Result<ActionOutcome>
where
    L: LocalStore,
    R: RemoteClient,
{
    match action {
        Action::LocalPurge(item) => {
            local.delete(&item.local_key).await?;
            Ok(ActionOutcome::Purged)
        }
        Action::RemoteDelete(item) => {
            let Some(key) = item.remote_key.as_ref() else {
                local.delete(&item.local_key).await?;
                return Ok(ActionOutcome::Purged);
            };
            match remote.delete(key).await {
                Ok(()) => {
                    local.delete(&item.local_key).await?;
                    Ok(ActionOutcome::Deleted)
                }
                Err(error) => {
                    handle_failure(local, remote, &item, NetworkAction::Delete, &error).await
                }
            }
        }
        Action::RemoteCreate(item) => push(local, remote, &item).await,
        Action::RemoteUpdate(item) => {
            let Some(key) = item.remote_key.as_ref() else {
                return Ok(ActionOutcome::Skipped);
            };
            match remote.update(key, &item.payload()).await {
                Ok(()) => Ok(ActionOutcome::Updated),
                Err(error) => {
                    handle_failure(local, remote, &item, NetworkAction::Update, &error).await
                }
            }
        }
        Action::LocalCreate(remote_item) => pull(local, &remote_item).await,
    }
}

async fn handle_failure<L, R>(
    local: &L,
    remote: &R,
    item: &Item,
    action: NetworkAction,
    error: &RemoteError,
) -> Result<ActionOutcome>
where
    L: LocalStore,
    R: RemoteClient,
{
    let resolution = resolve(action, error);
    tracing::debug!(
        local_key = %item.local_key,
        ?action,
        ?resolution,
        "Remote action failed: {error}"
    );
    match resolution {
        Resolution::Purge => {
            local.delete(&item.local_key).await?;
            Ok(ActionOutcome::Purged)
        }
        Resolution::Refetch => refetch(local, remote, item).await,
        Resolution::Skip => Ok(ActionOutcome::Skipped),
    }
}

async fn push<L, R>(local: &L, remote: &R, item: &Item) -> Result<ActionOutcome>
where
    L: LocalStore,
    R: RemoteClient,
{
    let Some(fresh) = local.get_by_key(&item.local_key).await? else {
        return Ok(ActionOutcome::Unchanged);
    };
    if fresh.is_known_to_remote() {
        return Ok(ActionOutcome::Unchanged);
    }
    if fresh.deleted {
        local.delete(&fresh.local_key).await?;
        return Ok(ActionOutcome::Purged);
    }

    match remote.create(&fresh.payload()).await {
        Ok(created) => adopt_remote_key(local, &fresh, created.id).await,
        Err(error) => handle_failure(local, remote, &fresh, NetworkAction::Create, &error).await,
    }
}

async fn adopt_remote_key<L: LocalStore>(
    local: &L,
    item: &Item,
    remote_key: RemoteKey,
) -> Result<ActionOutcome> {
    let Some(mut fresh) = local.get_by_key(&item.local_key).await? else {
        // Purged mid-run; the orphaned remote record is pulled next run
        return Ok(ActionOutcome::Unchanged);
    };
    if fresh.remote_key.is_some() {
        return Ok(ActionOutcome::Unchanged);
    }
    fresh.remote_key = Some(remote_key);
    local.put(&fresh).await?;
    Ok(ActionOutcome::Created)
}

/// Server-wins read-back after a refused update
async fn refetch<L, R>(local: &L, remote: &R, item: &Item) -> Result<ActionOutcome>
where
    L: LocalStore,
    R: RemoteClient,
{
    let Some(key) = item.remote_key.as_ref() else {
        return Ok(ActionOutcome::Skipped);
    };
    match remote.get(key).await {
        Ok(Some(remote_item)) => {
            let Some(mut fresh) = local.get_by_key(&item.local_key).await? else {
                return Ok(ActionOutcome::Unchanged);
            };
            fresh.text = remote_item.text;
            fresh.updated_at = remote_item.updated_at;
            local.put(&fresh).await?;
            Ok(ActionOutcome::Refreshed)
        }
        Ok(None) => {
            local.delete(&item.local_key).await?;
            Ok(ActionOutcome::Purged)
        }
        Err(error) => {
            tracing::debug!(remote_key = %key, "Re-fetch failed: {error}");
            Ok(ActionOutcome::Skipped)
        }
    }
}

async fn pull<L: LocalStore>(local: &L, remote_item: &RemoteItem) -> Result<ActionOutcome> {
    if local.get_by_remote_key(&remote_item.id).await?.is_some() {
        return Ok(ActionOutcome::Unchanged);
    }
    local.put(&Item::from_remote(remote_item)).await?;
    Ok(ActionOutcome::Pulled)
}
