//! Job records and the job lifecycle state machine.
//!
//! ```text
//! pending ──claim──▶ running ──complete──▶ completed
//!                       │
//!                       └──────fail──────▶ failed
//! ```
//!
//! Terminal jobs only leave the ledger through the retention sweep.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TransitionError, ValidationError};
use crate::item::PartitionKey;

/// Priority assigned when the scheduler does not specify one.
pub const DEFAULT_PRIORITY: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// First pass over a partition: recent history only.
    Initial,
    /// Incremental pass since the last run.
    Update,
    /// Complete re-collection.
    FullSync,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Initial => "initial",
            JobType::Update => "update",
            JobType::FullSync => "full_sync",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(JobType::Initial),
            "update" => Ok(JobType::Update),
            "full_sync" => Ok(JobType::FullSync),
            other => Err(ValidationError::UnknownVariant {
                kind: "job type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "running" => Ok(JobState::Running),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            other => Err(ValidationError::UnknownVariant {
                kind: "job state",
                value: other.to_string(),
            }),
        }
    }
}

/// A job as handed to the ledger by the external scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    #[serde(alias = "channel_id")]
    pub partition_key: PartitionKey,
    pub job_type: JobType,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

impl NewJob {
    pub fn new(partition_key: PartitionKey, job_type: JobType) -> Self {
        Self {
            partition_key,
            job_type,
            priority: DEFAULT_PRIORITY,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub partition_key: PartitionKey,
    pub job_type: JobType,
    /// Higher is sooner.
    pub priority: i32,
    pub state: JobState,
    pub assigned_worker: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items_collected: i64,
    pub error_message: Option<String>,
    pub retry_count: i32,
}

impl Job {
    /// Materialize a scheduler request as a `pending` job.
    pub fn from_new(new: NewJob, created_at: DateTime<Utc>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            partition_key: new.partition_key,
            job_type: new.job_type,
            priority: new.priority,
            state: JobState::Pending,
            assigned_worker: None,
            created_at,
            started_at: None,
            completed_at: None,
            items_collected: 0,
            error_message: None,
            retry_count: 0,
        }
    }

    /// `pending → running`. Returns `Ok(false)` when `worker_id` already holds
    /// the claim, in which case nothing changes.
    pub fn claim(&mut self, worker_id: &str, now: DateTime<Utc>) -> Result<bool, TransitionError> {
        match self.state {
            JobState::Pending => {
                self.state = JobState::Running;
                self.assigned_worker = Some(worker_id.to_string());
                self.started_at = Some(now);
                Ok(true)
            }
            JobState::Running => match self.assigned_worker.as_deref() {
                Some(current) if current == worker_id => Ok(false),
                current => Err(TransitionError::AlreadyClaimed {
                    job_id: self.job_id,
                    claimed_by: current.unwrap_or_default().to_string(),
                }),
            },
            from => Err(TransitionError::InvalidTransition {
                job_id: self.job_id,
                from,
                to: JobState::Running,
            }),
        }
    }

    /// `running → completed`.
    pub fn complete(
        &mut self,
        worker_id: &str,
        items_collected: i64,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_running_for(worker_id, JobState::Completed)?;
        self.state = JobState::Completed;
        self.items_collected = items_collected;
        self.completed_at = Some(now);
        Ok(())
    }

    /// `running → failed`; bumps `retry_count`.
    pub fn fail(
        &mut self,
        worker_id: &str,
        error_message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_running_for(worker_id, JobState::Failed)?;
        self.state = JobState::Failed;
        self.error_message = Some(error_message.into());
        self.retry_count += 1;
        self.completed_at = Some(now);
        Ok(())
    }

    fn ensure_running_for(&self, worker_id: &str, to: JobState) -> Result<(), TransitionError> {
        if self.state != JobState::Running {
            return Err(TransitionError::InvalidTransition {
                job_id: self.job_id,
                from: self.state,
                to,
            });
        }
        if self.assigned_worker.as_deref() != Some(worker_id) {
            return Err(TransitionError::NotAssigned {
                job_id: self.job_id,
                worker_id: worker_id.to_string(),
            });
        }
        Ok(())
    }

    /// Whether the retention sweep may delete this job.
    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        self.state.is_terminal() && self.completed_at.is_some_and(|at| at < cutoff)
    }
}

/// Read-model row returned to workers polling for work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAssignment {
    pub job_id: Uuid,
    pub partition_key: PartitionKey,
    pub partition_handle: Option<String>,
    pub job_type: JobType,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

impl JobAssignment {
    pub fn from_job(job: &Job, partition_handle: Option<String>) -> Self {
        Self {
            job_id: job.job_id,
            partition_key: job.partition_key,
            partition_handle,
            job_type: job.job_type,
            priority: job.priority,
            created_at: job.created_at,
        }
    }
}

/// Assignment order: priority descending, then oldest first, then job id so
/// the ordering is total.
pub fn assignment_order(a: &Job, b: &Job) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.job_id.cmp(&b.job_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_job() -> Job {
        Job::from_new(NewJob::new(1, JobType::Update), Utc::now())
    }

    #[test]
    fn test_claim_complete_lifecycle() {
        let mut job = pending_job();
        let now = Utc::now();

        assert_eq!(job.claim("w1", now), Ok(true));
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.assigned_worker.as_deref(), Some("w1"));
        assert_eq!(job.started_at, Some(now));

        job.complete("w1", 250, now).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.items_collected, 250);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_reclaim_by_same_worker_is_noop() {
        let mut job = pending_job();
        let first = Utc::now();
        job.claim("w1", first).unwrap();

        let later = first + chrono::Duration::seconds(30);
        assert_eq!(job.claim("w1", later), Ok(false));
        assert_eq!(job.started_at, Some(first));
    }

    #[test]
    fn test_claim_by_other_worker_conflicts() {
        let mut job = pending_job();
        job.claim("w1", Utc::now()).unwrap();

        let err = job.claim("w2", Utc::now()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::AlreadyClaimed {
                job_id: job.job_id,
                claimed_by: "w1".to_string()
            }
        );
        assert_eq!(job.assigned_worker.as_deref(), Some("w1"));
    }

    #[test]
    fn test_fail_increments_retry_count() {
        let mut job = pending_job();
        job.claim("w1", Utc::now()).unwrap();
        job.fail("w1", "flood wait", Utc::now()).unwrap();

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.error_message.as_deref(), Some("flood wait"));
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut job = pending_job();
        job.claim("w1", Utc::now()).unwrap();
        job.complete("w1", 1, Utc::now()).unwrap();

        assert!(matches!(
            job.claim("w1", Utc::now()),
            Err(TransitionError::InvalidTransition { from: JobState::Completed, .. })
        ));
        assert!(matches!(
            job.fail("w1", "late", Utc::now()),
            Err(TransitionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_complete_requires_assigned_worker() {
        let mut job = pending_job();
        assert!(matches!(
            job.complete("w1", 0, Utc::now()),
            Err(TransitionError::InvalidTransition { from: JobState::Pending, .. })
        ));

        job.claim("w1", Utc::now()).unwrap();
        assert!(matches!(
            job.complete("w2", 0, Utc::now()),
            Err(TransitionError::NotAssigned { .. })
        ));
    }

    #[test]
    fn test_assignment_order() {
        let base = Utc::now();
        let mut jobs: Vec<Job> = [1, 5, 3]
            .iter()
            .enumerate()
            .map(|(i, p)| {
                Job::from_new(
                    NewJob::new(1, JobType::Initial).with_priority(*p),
                    base + chrono::Duration::seconds(i as i64),
                )
            })
            .collect();
        let older_tie = Job::from_new(
            NewJob::new(2, JobType::Initial).with_priority(3),
            base - chrono::Duration::seconds(10),
        );
        jobs.push(older_tie.clone());

        jobs.sort_by(assignment_order);
        let priorities: Vec<i32> = jobs.iter().map(|j| j.priority).collect();
        assert_eq!(priorities, vec![5, 3, 3, 1]);
        assert_eq!(jobs[1].job_id, older_tie.job_id);
    }

    #[test]
    fn test_is_expired() {
        let mut job = pending_job();
        let now = Utc::now();
        assert!(!job.is_expired(now));

        job.claim("w", now).unwrap();
        job.fail("w", "boom", now - chrono::Duration::days(8)).unwrap();
        assert!(job.is_expired(now - chrono::Duration::days(7)));
    }

    #[test]
    fn test_job_type_roundtrip_text() {
        for t in [JobType::Initial, JobType::Update, JobType::FullSync] {
            assert_eq!(t.as_str().parse::<JobType>().unwrap(), t);
        }
        assert!("reindex".parse::<JobType>().is_err());
    }
}
