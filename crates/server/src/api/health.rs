//! Liveness and operational counters.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::auth::WorkerIdentity;
use crate::error::ApiError;
use crate::service::{CollectorStats, HealthReport};
use crate::state::AppState;

/// Unauthenticated; load balancers poll it.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(state.collector.health().await)
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    worker: WorkerIdentity,
) -> Result<Json<CollectorStats>, ApiError> {
    Ok(Json(state.collector.stats(worker.as_str()).await?))
}
