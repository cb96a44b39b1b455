//! Caller identity for agent endpoints.
//!
//! Agents send `Authorization: Bearer <token>` and `X-Worker-ID: <id>`. The
//! token is a single shared secret; the worker id is taken at face value once
//! the token matches.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::state::AppState;

pub const WORKER_ID_HEADER: &str = "x-worker-id";

/// The authenticated agent making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity(pub String);

impl WorkerIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromRequestParts<Arc<AppState>> for WorkerIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let expected = state.auth_token.as_deref().ok_or_else(|| {
            ApiError::Unauthorized("worker authentication is not configured".into())
        })?;

        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;
        if !token_matches(presented.trim(), expected) {
            return Err(ApiError::Unauthorized("invalid authentication token".into()));
        }

        let worker_id = parts
            .headers
            .get(WORKER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing X-Worker-ID header".into()))?;

        Ok(WorkerIdentity(worker_id.to_string()))
    }
}

/// Constant-time comparison; only the length difference can leak.
fn token_matches(presented: &str, expected: &str) -> bool {
    bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}
