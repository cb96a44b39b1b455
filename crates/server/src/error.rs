//! HTTP-facing error type.
//!
//! Every failure a handler can produce funnels into [`ApiError`], which maps
//! onto a status code and the usual `{"error": "..."}` body.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use collector_core::{TransitionError, ValidationError};
use collector_queue::QueueError;
use collector_storage::{LedgerError, StorageError};

use crate::api::ErrorResponse;

/// Seconds a producer is told to wait after a `QueueFull` rejection.
pub const RETRY_AFTER_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Queue(QueueError::Full { .. }) | ApiError::Queue(QueueError::Closed) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Ledger(LedgerError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Ledger(LedgerError::Transition(t)) => match t {
                TransitionError::NotAssigned { .. } => StatusCode::FORBIDDEN,
                TransitionError::AlreadyClaimed { .. }
                | TransitionError::InvalidTransition { .. } => StatusCode::CONFLICT,
            },
            ApiError::Ledger(LedgerError::Storage(e)) | ApiError::Storage(e) => storage_status(e),
        }
    }
}

fn storage_status(e: &StorageError) -> StatusCode {
    match e {
        StorageError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StorageError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        }
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        match self {
            ApiError::Queue(QueueError::Full { .. }) => (
                status,
                [(header::RETRY_AFTER, RETRY_AFTER_SECS.to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let job_id = Uuid::new_v4();
        let cases = [
            (ApiError::from(ValidationError::EmptyBatch), StatusCode::BAD_REQUEST),
            (ApiError::from(QueueError::Full { capacity: 1 }), StatusCode::SERVICE_UNAVAILABLE),
            (ApiError::from(QueueError::Closed), StatusCode::SERVICE_UNAVAILABLE),
            (ApiError::from(QueueError::Backup("down".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::from(LedgerError::NotFound(job_id)), StatusCode::NOT_FOUND),
            (
                ApiError::from(LedgerError::from(TransitionError::AlreadyClaimed {
                    job_id,
                    claimed_by: "w1".into(),
                })),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(LedgerError::from(TransitionError::NotAssigned {
                    job_id,
                    worker_id: "w2".into(),
                })),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::from(StorageError::Unavailable("pool".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::from(StorageError::Rejected("check".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ApiError::Unauthorized("no".into()), StatusCode::UNAUTHORIZED),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status(), expected, "{err}");
        }
    }

    #[test]
    fn test_queue_full_sets_retry_after() {
        let resp = ApiError::from(QueueError::Full { capacity: 10 }).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            resp.headers().get(header::RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("5")
        );
    }
}
