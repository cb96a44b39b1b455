use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use collector_core::{
    Job, JobAssignment, PartitionRecord, ValidationError, WorkerRecord, WorkerStatus,
};

use crate::error::StorageError;

pub(super) const JOB_COLUMNS: &str = "job_id, partition_key, job_type, priority, state, \
     assigned_worker, created_at, started_at, completed_at, items_collected, error_message, \
     retry_count";

pub(super) const WORKER_COLUMNS: &str = "worker_id, status, last_heartbeat, current_job, \
     metadata, jobs_completed, jobs_failed, items_processed, started_at";

pub(super) const PARTITION_COLUMNS: &str =
    "partition_key, handle, status, last_ingested_at, last_item_at";

/// Text columns are CHECK-constrained, so a parse failure means the row was
/// written by something other than this crate.
fn parse_column<T>(value: &str) -> Result<T, StorageError>
where
    T: FromStr<Err = ValidationError>,
{
    value
        .parse()
        .map_err(|e: ValidationError| StorageError::Rejected(e.to_string()))
}

#[derive(sqlx::FromRow)]
pub(super) struct JobRow {
    job_id: Uuid,
    partition_key: i64,
    job_type: String,
    priority: i32,
    state: String,
    assigned_worker: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    items_collected: i64,
    error_message: Option<String>,
    retry_count: i32,
}

impl TryFrom<JobRow> for Job {
    type Error = StorageError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            job_id: row.job_id,
            partition_key: row.partition_key,
            job_type: parse_column(&row.job_type)?,
            priority: row.priority,
            state: parse_column(&row.state)?,
            assigned_worker: row.assigned_worker,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            items_collected: row.items_collected,
            error_message: row.error_message,
            retry_count: row.retry_count,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct AssignmentRow {
    job_id: Uuid,
    partition_key: i64,
    handle: Option<String>,
    job_type: String,
    priority: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<AssignmentRow> for JobAssignment {
    type Error = StorageError;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        Ok(JobAssignment {
            job_id: row.job_id,
            partition_key: row.partition_key,
            partition_handle: row.handle,
            job_type: parse_column(&row.job_type)?,
            priority: row.priority,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct WorkerRow {
    worker_id: String,
    status: String,
    last_heartbeat: DateTime<Utc>,
    current_job: Option<Uuid>,
    metadata: Option<Json<serde_json::Value>>,
    jobs_completed: i64,
    jobs_failed: i64,
    items_processed: i64,
    started_at: DateTime<Utc>,
}

impl TryFrom<WorkerRow> for WorkerRecord {
    type Error = StorageError;

    fn try_from(row: WorkerRow) -> Result<Self, Self::Error> {
        Ok(WorkerRecord {
            worker_id: row.worker_id,
            status: parse_column::<WorkerStatus>(&row.status)?,
            last_heartbeat: row.last_heartbeat,
            current_job: row.current_job,
            metadata: row.metadata.map(|Json(v)| v),
            jobs_completed: row.jobs_completed,
            jobs_failed: row.jobs_failed,
            items_processed: row.items_processed,
            started_at: row.started_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct PartitionRow {
    partition_key: i64,
    handle: Option<String>,
    status: String,
    last_ingested_at: Option<DateTime<Utc>>,
    last_item_at: Option<DateTime<Utc>>,
}

impl TryFrom<PartitionRow> for PartitionRecord {
    type Error = StorageError;

    fn try_from(row: PartitionRow) -> Result<Self, Self::Error> {
        Ok(PartitionRecord {
            partition_key: row.partition_key,
            handle: row.handle,
            status: parse_column(&row.status)?,
            last_ingested_at: row.last_ingested_at,
            last_item_at: row.last_item_at,
        })
    }
}
