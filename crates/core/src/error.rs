use thiserror::Error;
use uuid::Uuid;

use crate::job::JobState;

/// Shape violations caught at the transport boundary before an envelope is queued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty batch")]
    EmptyBatch,

    #[error("batch too large: {len} items (max {max})")]
    BatchTooLarge { len: usize, max: usize },

    #[error("item {id}: negative counter '{field}'")]
    NegativeCounter { id: i64, field: &'static str },

    #[error("invalid {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },
}

/// Illegal job state machine transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("job {job_id} already claimed by worker '{claimed_by}'")]
    AlreadyClaimed { job_id: Uuid, claimed_by: String },

    #[error("job {job_id} is not assigned to worker '{worker_id}'")]
    NotAssigned { job_id: Uuid, worker_id: String },

    #[error("job {job_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: Uuid,
        from: JobState,
        to: JobState,
    },
}
