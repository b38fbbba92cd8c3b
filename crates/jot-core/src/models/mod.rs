//! Data models for Jot

mod change;
mod item;

pub use change::{ChangeKind, ChangeNotice};
pub use item::{Item, ItemPayload, LocalKey, RemoteItem, RemoteKey};
