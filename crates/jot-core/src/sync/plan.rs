//! Reconciliation planning
//!
//! A pure diff of the two replicas. Local and remote records are the same
//! entity iff their remote keys are equal; local items without a remote key
//! never match anything.

use std::collections::{HashMap, HashSet};

use crate::models::{Item, RemoteItem, RemoteKey};

/// One step of a reconciliation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Tombstone without a remote key; nothing exists remotely
    LocalPurge(Item),
    /// Tombstone known to the remote; delete it there, then purge
    RemoteDelete(Item),
    /// Unsynced item; create it remotely and adopt the assigned key
    RemoteCreate(Item),
    /// Known item whose remote copy differs (or is missing from the listing)
    RemoteUpdate(Item),
    /// Remote record no local item corresponds to
    LocalCreate(RemoteItem),
}

impl Action {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::LocalPurge(_) => "local-purge",
            Self::RemoteDelete(_) => "remote-delete",
            Self::RemoteCreate(_) => "remote-create",
            Self::RemoteUpdate(_) => "remote-update",
            Self::LocalCreate(_) => "local-create",
        }
    }
}

/// Actions derived from one pair of snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub actions: Vec<Action>,
    /// Known items already identical on both sides
    pub converged: usize,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }
}

/// Diff a full local snapshot (tombstones included) against a full remote one
pub fn plan(local: &[Item], remote: &[RemoteItem]) -> Plan {
    let remote_by_key: HashMap<&RemoteKey, &RemoteItem> =
        remote.iter().map(|item| (&item.id, item)).collect();
    let local_keys: HashSet<&RemoteKey> = local
        .iter()
        .filter_map(|item| item.remote_key.as_ref())
        .collect();

    let mut result = Plan::default();

    for item in local {
        match (&item.remote_key, item.deleted) {
            (None, true) => result.actions.push(Action::LocalPurge(item.clone())),
            (Some(_), true) => result.actions.push(Action::RemoteDelete(item.clone())),
            (None, false) => result.actions.push(Action::RemoteCreate(item.clone())),
            (Some(key), false) => {
                let converged = remote_by_key
                    .get(key)
                    .is_some_and(|remote| item.matches_remote(remote));
                if converged {
                    result.converged += 1;
                } else {
                    result.actions.push(Action::RemoteUpdate(item.clone()));
                }
            }
        }
    }

    result.actions.extend(
        remote
            .iter()
            .filter(|item| !local_keys.contains(&item.id))
            .cloned()
            .map(Action::LocalCreate),
    );

    result
}
