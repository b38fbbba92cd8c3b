//! Reconciliation engine
//!
//! - [`plan()`]: pure diff of a local and a remote snapshot
//! - [`execute()`]: executes a plan through one failure decision table
//! - [`SyncCoordinator`]: single-flight runs with request coalescing
//! - [`spawn_change_listener`] / [`spawn_periodic`]: background triggers

mod apply;
mod coordinator;
mod plan;
mod triggers;

pub use apply::{apply, execute, resolve, ActionOutcome, NetworkAction, Resolution, RunReport};
pub use coordinator::{
    AbortReason, Phase, RunOutcome, SyncCoordinator, SyncEvent, SyncHandle, SyncStats,
};
pub use plan::{plan, Action, Plan};
pub use triggers::{spawn_change_listener, spawn_periodic};
