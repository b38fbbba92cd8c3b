//! jot-core - Core library for Jot
//!
//! Offline-first short text items: a durable local replica, an authoritative
//! remote replica, and the reconciliation engine that keeps them converging.
//! Used by the CLI and by the reference API service.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Item, LocalKey, RemoteItem, RemoteKey};
