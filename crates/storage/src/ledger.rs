use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use collector_core::{Job, JobAssignment, NewJob};

use crate::error::LedgerError;

/// Result of a successful claim.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimOutcome {
    pub job: Job,
    /// `false` when the caller already held the claim.
    pub newly_claimed: bool,
}

/// Authoritative record of collection jobs and their lifecycle.
///
/// Implementations must make `claim` a single atomic conditional update so two
/// concurrent claims for one job have exactly one winner.
#[async_trait]
pub trait JobLedger: Send + Sync {
    async fn create(&self, new: NewJob) -> Result<Job, LedgerError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, LedgerError>;

    /// Pending jobs on active partitions, highest priority then oldest first.
    async fn list_assignable(&self, limit: usize) -> Result<Vec<JobAssignment>, LedgerError>;

    async fn claim(&self, job_id: Uuid, worker_id: &str) -> Result<ClaimOutcome, LedgerError>;

    /// Also bumps the worker's `jobs_completed` and `items_processed`.
    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        items_collected: i64,
    ) -> Result<Job, LedgerError>;

    /// Also bumps the worker's `jobs_failed`.
    async fn fail(&self, job_id: Uuid, worker_id: &str, error_message: &str)
        -> Result<Job, LedgerError>;

    /// Delete terminal jobs that finished before `older_than`.
    async fn sweep_terminal(&self, older_than: DateTime<Utc>) -> Result<u64, LedgerError>;
}
