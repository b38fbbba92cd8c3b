//! Remote replica access.
//!
//! [`RemoteClient`] is the transport boundary: plain verbs against the
//! `/items` resource plus the server-push change stream. Every failure is
//! reduced to a [`FailureKind`] so the reconciliation engine can apply one
//! decision table to all endpoints.

mod collection;
mod http;
mod memory;
mod sse;

use std::future::Future;

use futures::stream::BoxStream;
use thiserror::Error;

use crate::models::{ChangeNotice, ItemPayload, RemoteItem, RemoteKey};

pub use collection::{CollectionError, ItemCollection};
pub use http::HttpRemoteClient;
pub use memory::{MemoryRemote, RemoteOp};
pub use sse::{SseDecoder, SseEvent};

/// Errors returned by a [`RemoteClient`]
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote returned {message}")]
    Status { status: u16, message: String },
    #[error("Invalid remote payload: {0}")]
    Decode(String),
    #[error("Remote unavailable: {0}")]
    Unavailable(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// How the reconciliation engine should read a failed remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No response, timeout, 5xx: retry on a later run
    Transient,
    /// The service refused the content (400)
    Rejected,
    /// The record does not exist remotely (404/410)
    Gone,
    /// Any other refusal, typically a stale write (409)
    Conflict,
}

impl FailureKind {
    /// Classify a non-success HTTP status
    pub const fn from_status(status: u16) -> Self {
        match status {
            400 => Self::Rejected,
            404 | 410 => Self::Gone,
            408 | 429 | 500..=599 => Self::Transient,
            _ => Self::Conflict,
        }
    }
}

impl RemoteError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Status { status, .. } => FailureKind::from_status(*status),
            Self::Http(error) => error
                .status()
                .map_or(FailureKind::Transient, |status| {
                    FailureKind::from_status(status.as_u16())
                }),
            Self::Decode(_) | Self::Unavailable(_) => FailureKind::Transient,
        }
    }
}

/// One event from the change stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Decoded payload, when the event carried one we understand
    pub notice: Option<ChangeNotice>,
}

/// Stream of change events; ends when the connection drops
pub type ChangeStream = BoxStream<'static, RemoteResult<ChangeEvent>>;

/// Transport to the authoritative remote replica
pub trait RemoteClient: Send + Sync {
    /// `GET /items`
    fn list(&self) -> impl Future<Output = RemoteResult<Vec<RemoteItem>>> + Send;

    /// `POST /items`, returning the created record with its assigned id
    fn create(&self, payload: &ItemPayload)
        -> impl Future<Output = RemoteResult<RemoteItem>> + Send;

    /// `PUT /items/{key}`
    fn update(
        &self,
        key: &RemoteKey,
        payload: &ItemPayload,
    ) -> impl Future<Output = RemoteResult<()>> + Send;

    /// `DELETE /items/{key}`
    fn delete(&self, key: &RemoteKey) -> impl Future<Output = RemoteResult<()>> + Send;

    /// `GET /items/{key}`; a 404/410 resolves to `Ok(None)`
    fn get(&self, key: &RemoteKey)
        -> impl Future<Output = RemoteResult<Option<RemoteItem>>> + Send;

    /// `GET /items/stream`
    fn changes(&self) -> impl Future<Output = RemoteResult<ChangeStream>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(FailureKind::from_status(400), FailureKind::Rejected);
        assert_eq!(FailureKind::from_status(404), FailureKind::Gone);
        assert_eq!(FailureKind::from_status(410), FailureKind::Gone);
        assert_eq!(FailureKind::from_status(409), FailureKind::Conflict);
        assert_eq!(FailureKind::from_status(412), FailureKind::Conflict);
        assert_eq!(FailureKind::from_status(500), FailureKind::Transient);
        assert_eq!(FailureKind::from_status(503), FailureKind::Transient);
        assert_eq!(FailureKind::from_status(429), FailureKind::Transient);
    }

    #[test]
    fn non_status_errors_are_transient() {
        assert_eq!(
            RemoteError::Unavailable("offline".into()).kind(),
            FailureKind::Transient
        );
        assert_eq!(
            RemoteError::Decode("bad json".into()).kind(),
            FailureKind::Transient
        );
        assert_eq!(
            RemoteError::status(410, "gone").kind(),
            FailureKind::Gone
        );
    }
}
