//! Batch submission and heartbeats.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use collector_core::Heartbeat;

use crate::auth::WorkerIdentity;
use crate::error::ApiError;
use crate::service::BatchSubmission;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub batch_id: Uuid,
    pub messages_count: usize,
    pub message: String,
}

pub async fn submit_messages(
    State(state): State<Arc<AppState>>,
    worker: WorkerIdentity,
    Json(req): Json<BatchSubmission>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let receipt = state.collector.submit_batch(worker.as_str(), req).await?;
    Ok(Json(SubmitResponse {
        success: true,
        batch_id: receipt.batch_id,
        messages_count: receipt.items,
        message: format!("queued {} messages for processing", receipt.items),
    }))
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    worker: WorkerIdentity,
    Json(req): Json<Heartbeat>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let record = state.collector.send_heartbeat(worker.as_str(), req).await?;
    Ok(Json(HeartbeatResponse {
        success: true,
        message: "heartbeat received".into(),
        timestamp: record.last_heartbeat,
    }))
}
