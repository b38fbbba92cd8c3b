//! jot-api - reference Jot service
//!
//! Holds the authoritative copy of the item collection in memory and serves
//! it as the `/items` REST resource with a server-sent change stream.

pub mod config;
pub mod error;
pub mod routes;

pub use config::ApiConfig;
pub use routes::{app_router, AppState};
