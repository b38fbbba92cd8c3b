use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jot_core::remote::CollectionError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Gone: {0}")]
    Gone(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Gone(_) => StatusCode::GONE,
            Self::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl From<CollectionError> for AppError {
    fn from(error: CollectionError) -> Self {
        let message = error.to_string();
        match error {
            CollectionError::Rejected(_) => Self::BadRequest(message),
            CollectionError::NotFound(_) => Self::NotFound(message),
            CollectionError::Gone(_) => Self::Gone(message),
            CollectionError::Stale { .. } => Self::Conflict(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::debug!(status = status.as_u16(), "{self}");
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use jot_core::RemoteKey;

    use super::*;

    #[test]
    fn collection_errors_keep_their_status() {
        let cases = [
            CollectionError::Rejected("empty".to_string()),
            CollectionError::NotFound(RemoteKey::from("1")),
            CollectionError::Gone(RemoteKey::from("1")),
            CollectionError::Stale {
                key: RemoteKey::from("1"),
                stored: 2,
                incoming: 1,
            },
        ];
        for error in cases {
            let expected = error.status_code();
            assert_eq!(AppError::from(error).status().as_u16(), expected);
        }
    }
}
