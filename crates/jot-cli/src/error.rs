use std::io;

use jot_core::config::ConfigError;
use jot_core::remote::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] jot_core::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid log directive: {0}")]
    Logging(String),
    #[error("No item text provided")]
    EmptyText,
    #[error("Item key cannot be empty")]
    EmptyKey,
    #[error("Sync is not configured. Set JOT_API_URL or pass --api-url.")]
    SyncNotConfigured,
}
