//! Job listing, creation and lifecycle transitions.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use collector_core::{Job, JobAssignment, NewJob};

use crate::auth::WorkerIdentity;
use crate::error::ApiError;
use crate::state::AppState;

use super::Ack;

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<usize>,
}

pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    _worker: WorkerIdentity,
    Query(q): Query<ListJobsQuery>,
) -> Result<Json<Vec<JobAssignment>>, ApiError> {
    Ok(Json(state.collector.list_jobs(q.limit).await?))
}

pub async fn create_job(
    State(state): State<Arc<AppState>>,
    _worker: WorkerIdentity,
    Json(req): Json<NewJob>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let job = state.collector.create_job(req).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn start_job(
    State(state): State<Arc<AppState>>,
    worker: WorkerIdentity,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Ack>, ApiError> {
    let outcome = state.collector.start_job(worker.as_str(), job_id).await?;
    let message = if outcome.newly_claimed {
        format!("job {job_id} started")
    } else {
        format!("job {job_id} already held by this worker")
    };
    Ok(Json(Ack::ok(message)))
}

#[derive(Debug, Deserialize)]
pub struct CompleteJobRequest {
    #[serde(alias = "items_collected")]
    pub messages_count: i64,
}

pub async fn complete_job(
    State(state): State<Arc<AppState>>,
    worker: WorkerIdentity,
    Path(job_id): Path<Uuid>,
    Json(req): Json<CompleteJobRequest>,
) -> Result<Json<Ack>, ApiError> {
    state
        .collector
        .complete_job(worker.as_str(), job_id, req.messages_count)
        .await?;
    Ok(Json(Ack::ok(format!("job {job_id} completed"))))
}

#[derive(Debug, Deserialize)]
pub struct FailJobRequest {
    pub error_message: String,
}

pub async fn fail_job(
    State(state): State<Arc<AppState>>,
    worker: WorkerIdentity,
    Path(job_id): Path<Uuid>,
    Json(req): Json<FailJobRequest>,
) -> Result<Json<Ack>, ApiError> {
    state
        .collector
        .fail_job(worker.as_str(), job_id, &req.error_message)
        .await?;
    Ok(Json(Ack::ok(format!("job {job_id} marked failed"))))
}
