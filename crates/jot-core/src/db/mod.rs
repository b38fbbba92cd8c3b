//! Local replica storage for Jot

mod connection;
mod memory;
mod migrations;
mod repository;

pub use connection::Database;
pub use memory::MemoryItemStore;
pub use repository::{ItemFilter, LibSqlItemStore, LocalStore};
