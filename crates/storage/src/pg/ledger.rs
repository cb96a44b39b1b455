use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use collector_core::{Job, JobAssignment, NewJob};

use super::rows::{AssignmentRow, JobRow, JOB_COLUMNS};
use super::PgStore;
use crate::error::{LedgerError, StorageError};
use crate::ledger::{ClaimOutcome, JobLedger};

impl PgStore {
    async fn fetch_job(&self, job_id: Uuid) -> Result<Option<Job>, LedgerError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Job::try_from).transpose()?)
    }

    async fn lock_job(
        tx: &mut Transaction<'_, Postgres>,
        job_id: Uuid,
    ) -> Result<Job, LedgerError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = $1 FOR UPDATE"
        ))
        .bind(job_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(LedgerError::NotFound(job_id))?;
        Ok(Job::try_from(row)?)
    }

    async fn store_terminal(
        tx: &mut Transaction<'_, Postgres>,
        job: &Job,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "UPDATE jobs SET state = $2, completed_at = $3, items_collected = $4,
                 error_message = $5, retry_count = $6
             WHERE job_id = $1",
        )
        .bind(job.job_id)
        .bind(job.state.as_str())
        .bind(job.completed_at)
        .bind(job.items_collected)
        .bind(job.error_message.as_deref())
        .bind(job.retry_count)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_job(&self, new: NewJob) -> Result<Job, LedgerError> {
        let job = Job::from_new(new, Utc::now());
        sqlx::query(
            "INSERT INTO jobs (job_id, partition_key, job_type, priority, state, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(job.job_id)
        .bind(job.partition_key)
        .bind(job.job_type.as_str())
        .bind(job.priority)
        .bind(job.state.as_str())
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;
        Ok(job)
    }

    async fn select_assignable(&self, limit: usize) -> Result<Vec<JobAssignment>, LedgerError> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            "SELECT j.job_id, j.partition_key, p.handle, j.job_type, j.priority, j.created_at
             FROM jobs j
             JOIN partitions p ON p.partition_key = j.partition_key
             WHERE j.state = 'pending' AND p.status = 'active'
             ORDER BY j.priority DESC, j.created_at ASC, j.job_id ASC
             LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| JobAssignment::try_from(row).map_err(LedgerError::from))
            .collect()
    }

    async fn claim_job(&self, job_id: Uuid, worker_id: &str) -> Result<ClaimOutcome, LedgerError> {
        // The conditional update is the whole race: at most one caller sees a row.
        let claimed = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE jobs SET state = 'running', assigned_worker = $2, started_at = now()
             WHERE job_id = $1 AND state = 'pending'
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = claimed {
            return Ok(ClaimOutcome {
                job: Job::try_from(row)?,
                newly_claimed: true,
            });
        }

        // Lost the race or the job was never pending; let the state machine
        // decide between an idempotent re-claim and a conflict.
        let mut job = self
            .fetch_job(job_id)
            .await?
            .ok_or(LedgerError::NotFound(job_id))?;
        let newly_claimed = job.claim(worker_id, Utc::now())?;
        if newly_claimed {
            return Err(StorageError::Unavailable(format!(
                "job {job_id} changed while claiming, retry"
            ))
            .into());
        }
        Ok(ClaimOutcome {
            job,
            newly_claimed: false,
        })
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        worker_id: &str,
        items_collected: i64,
    ) -> Result<Job, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let mut job = Self::lock_job(&mut tx, job_id).await?;
        job.complete(worker_id, items_collected, Utc::now())?;
        Self::store_terminal(&mut tx, &job).await?;

        sqlx::query(
            "UPDATE workers
             SET jobs_completed = jobs_completed + 1, items_processed = items_processed + $2
             WHERE worker_id = $1",
        )
        .bind(worker_id)
        .bind(items_collected)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(job)
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error_message: &str,
    ) -> Result<Job, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let mut job = Self::lock_job(&mut tx, job_id).await?;
        job.fail(worker_id, error_message, Utc::now())?;
        Self::store_terminal(&mut tx, &job).await?;

        sqlx::query("UPDATE workers SET jobs_failed = jobs_failed + 1 WHERE worker_id = $1")
            .bind(worker_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(job)
    }
}

#[async_trait]
impl JobLedger for PgStore {
    async fn create(&self, new: NewJob) -> Result<Job, LedgerError> {
        let job = self.bounded(self.insert_job(new)).await?;
        info!(job_id = %job.job_id, partition = job.partition_key, job_type = %job.job_type, "job created");
        Ok(job)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, LedgerError> {
        self.bounded(self.fetch_job(job_id)).await
    }

    async fn list_assignable(&self, limit: usize) -> Result<Vec<JobAssignment>, LedgerError> {
        self.bounded(self.select_assignable(limit)).await
    }

    async fn claim(&self, job_id: Uuid, worker_id: &str) -> Result<ClaimOutcome, LedgerError> {
        let outcome = self.bounded(self.claim_job(job_id, worker_id)).await?;
        debug!(%job_id, worker_id, newly_claimed = outcome.newly_claimed, "job claimed");
        Ok(outcome)
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        items_collected: i64,
    ) -> Result<Job, LedgerError> {
        self.bounded(self.complete_job(job_id, worker_id, items_collected))
            .await
    }

    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error_message: &str,
    ) -> Result<Job, LedgerError> {
        self.bounded(self.fail_job(job_id, worker_id, error_message))
            .await
    }

    async fn sweep_terminal(&self, older_than: DateTime<Utc>) -> Result<u64, LedgerError> {
        let result = self
            .bounded(async {
                sqlx::query(
                    "DELETE FROM jobs
                     WHERE state IN ('completed', 'failed') AND completed_at < $1",
                )
                .bind(older_than)
                .execute(&self.pool)
                .await
                .map_err(LedgerError::from)
            })
            .await?;
        Ok(result.rows_affected())
    }
}
