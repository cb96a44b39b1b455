//! The collector service object.
//!
//! Owns handles to the ingestion queue and the storage traits and exposes one
//! method per operation a collector agent (or an operator) can invoke. The
//! HTTP layer is a thin adapter over this type; tests drive it directly.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use collector_core::{
    BatchEnvelope, Heartbeat, Item, Job, JobAssignment, NewJob, PartitionKey, PartitionRecord,
    PartitionStats, PartitionStatus, WorkerRecord, WorkerStats,
};
use collector_queue::{IngestionQueue, QueueStats};
use collector_storage::{ClaimOutcome, JobLedger, PartitionCatalog, WorkerRegistry};

use crate::error::ApiError;

/// Default and ceiling for `list_jobs`.
pub const DEFAULT_JOB_LIMIT: usize = 10;
pub const MAX_JOB_LIMIT: usize = 100;

// ── Request / report types ───────────────────────────────────────

/// One batch of items scraped from a single partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSubmission {
    #[serde(alias = "channel_id")]
    pub partition_key: PartitionKey,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    #[serde(alias = "messages")]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    pub batch_id: Uuid,
    pub items: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectorStats {
    pub queue_size: usize,
    pub queue: QueueStats,
    pub worker_stats: WorkerStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub queue_size: usize,
    pub max_queue_size: usize,
    pub batch_size: usize,
}

// ── Collector ────────────────────────────────────────────────────

pub struct Collector {
    queue: Arc<IngestionQueue>,
    ledger: Arc<dyn JobLedger>,
    registry: Arc<dyn WorkerRegistry>,
    catalog: Arc<dyn PartitionCatalog>,
    max_batch_items: usize,
    batch_size: usize,
}

impl Collector {
    /// `store` backs the ledger, the registry and the partition catalog.
    pub fn new<S>(queue: Arc<IngestionQueue>, store: Arc<S>, max_batch_items: usize, batch_size: usize) -> Self
    where
        S: JobLedger + WorkerRegistry + PartitionCatalog + 'static,
    {
        Self {
            queue,
            ledger: store.clone(),
            registry: store.clone(),
            catalog: store,
            max_batch_items,
            batch_size,
        }
    }

    pub fn queue(&self) -> &Arc<IngestionQueue> {
        &self.queue
    }

    /// Validate and enqueue. Nothing is written here; the aggregator does that.
    pub async fn submit_batch(
        &self,
        worker_id: &str,
        submission: BatchSubmission,
    ) -> Result<SubmitReceipt, ApiError> {
        let envelope = BatchEnvelope::new(
            worker_id,
            submission.partition_key,
            submission.job_id,
            submission.items,
        );
        envelope.validate(self.max_batch_items)?;

        let items = envelope.len();
        let partition = envelope.partition_key;
        match self.queue.enqueue(envelope).await {
            Ok(batch_id) => {
                debug!(worker_id, partition, items, %batch_id, "batch queued");
                Ok(SubmitReceipt { batch_id, items })
            }
            Err(e) => {
                warn!(worker_id, partition, items, error = %e, "batch refused");
                Err(e.into())
            }
        }
    }

    pub async fn send_heartbeat(
        &self,
        worker_id: &str,
        heartbeat: Heartbeat,
    ) -> Result<WorkerRecord, ApiError> {
        Ok(self.registry.record_heartbeat(worker_id, heartbeat).await?)
    }

    /// Assignable jobs, capped at [`MAX_JOB_LIMIT`].
    pub async fn list_jobs(&self, limit: Option<usize>) -> Result<Vec<JobAssignment>, ApiError> {
        let limit = limit.unwrap_or(DEFAULT_JOB_LIMIT).clamp(1, MAX_JOB_LIMIT);
        Ok(self.ledger.list_assignable(limit).await?)
    }

    pub async fn start_job(&self, worker_id: &str, job_id: Uuid) -> Result<ClaimOutcome, ApiError> {
        let outcome = self.ledger.claim(job_id, worker_id).await?;
        if outcome.newly_claimed {
            info!(worker_id, %job_id, partition = outcome.job.partition_key, "job claimed");
        }
        Ok(outcome)
    }

    pub async fn complete_job(
        &self,
        worker_id: &str,
        job_id: Uuid,
        items_collected: i64,
    ) -> Result<Job, ApiError> {
        if items_collected < 0 {
            return Err(ApiError::BadRequest(format!(
                "items collected must be non-negative, got {items_collected}"
            )));
        }
        let job = self.ledger.complete(job_id, worker_id, items_collected).await?;
        info!(worker_id, %job_id, items_collected, "job completed");
        Ok(job)
    }

    pub async fn fail_job(
        &self,
        worker_id: &str,
        job_id: Uuid,
        error_message: &str,
    ) -> Result<Job, ApiError> {
        let job = self.ledger.fail(job_id, worker_id, error_message).await?;
        warn!(worker_id, %job_id, error = error_message, "job failed");
        Ok(job)
    }

    /// Entry point for the external scheduler.
    pub async fn create_job(&self, new: NewJob) -> Result<Job, ApiError> {
        let job = self.ledger.create(new).await?;
        info!(job_id = %job.job_id, partition = job.partition_key, job_type = %job.job_type, "job created");
        Ok(job)
    }

    pub async fn upsert_partition(
        &self,
        partition_key: PartitionKey,
        handle: Option<String>,
        status: PartitionStatus,
    ) -> Result<PartitionRecord, ApiError> {
        Ok(self
            .catalog
            .upsert_partition(partition_key, handle, status)
            .await?)
    }

    pub async fn partition_stats(&self, partition_key: PartitionKey) -> Result<PartitionStats, ApiError> {
        Ok(self.catalog.partition_stats(partition_key).await?)
    }

    pub async fn stats(&self, worker_id: &str) -> Result<CollectorStats, ApiError> {
        let queue = self.queue.stats().await;
        let worker_stats = self.registry.read_stats(worker_id).await?;
        Ok(CollectorStats {
            queue_size: queue.len,
            queue,
            worker_stats,
        })
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport {
            status: if self.queue.is_closed() { "shutting_down" } else { "healthy" },
            queue_size: self.queue.len().await,
            max_queue_size: self.queue.capacity(),
            batch_size: self.batch_size,
        }
    }
}
