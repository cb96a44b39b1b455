//! Partition registration and per-partition item statistics.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use collector_core::{PartitionKey, PartitionRecord, PartitionStats, PartitionStatus};

use crate::auth::WorkerIdentity;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpsertPartitionRequest {
    #[serde(default, alias = "username")]
    pub handle: Option<String>,
    #[serde(default = "default_status")]
    pub status: PartitionStatus,
}

fn default_status() -> PartitionStatus {
    PartitionStatus::Active
}

pub async fn upsert_partition(
    State(state): State<Arc<AppState>>,
    _worker: WorkerIdentity,
    Path(partition_key): Path<PartitionKey>,
    Json(req): Json<UpsertPartitionRequest>,
) -> Result<Json<PartitionRecord>, ApiError> {
    let record = state
        .collector
        .upsert_partition(partition_key, req.handle, req.status)
        .await?;
    Ok(Json(record))
}

pub async fn partition_stats(
    State(state): State<Arc<AppState>>,
    _worker: WorkerIdentity,
    Path(partition_key): Path<PartitionKey>,
) -> Result<Json<PartitionStats>, ApiError> {
    Ok(Json(state.collector.partition_stats(partition_key).await?))
}
