//! In-process implementation of every storage trait.
//!
//! Used by tests and by the server when no PostgreSQL is configured. Shares
//! the job state machine with [`crate::PgStore`], so transition semantics are
//! identical; only durability differs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use collector_core::{
    assignment_order, Heartbeat, Item, Job, JobAssignment, JobState, NewJob, PartitionKey,
    PartitionRecord, PartitionStats, PartitionStatus, WorkerRecord, WorkerStats,
};

use crate::error::{LedgerError, StorageError};
use crate::ledger::{ClaimOutcome, JobLedger};
use crate::registry::{PartitionCatalog, WorkerRegistry};
use crate::writer::StorageWriter;

#[derive(Default)]
struct MemoryState {
    items: BTreeMap<(PartitionKey, i64), Item>,
    partitions: HashMap<PartitionKey, PartitionRecord>,
    jobs: HashMap<Uuid, Job>,
    workers: HashMap<String, WorkerRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn item(&self, partition: PartitionKey, id: i64) -> Option<Item> {
        self.state.lock().await.items.get(&(partition, id)).cloned()
    }

    pub async fn item_count(&self) -> usize {
        self.state.lock().await.items.len()
    }

    /// Item ids stored for one partition, ascending.
    pub async fn item_ids(&self, partition: PartitionKey) -> Vec<i64> {
        self.state
            .lock()
            .await
            .items
            .range((partition, i64::MIN)..=(partition, i64::MAX))
            .map(|((_, id), _)| *id)
            .collect()
    }
}

#[async_trait]
impl StorageWriter for MemoryStore {
    async fn write(&self, partition: PartitionKey, items: &[Item]) -> Result<usize, StorageError> {
        // Validate up front so a rejected batch leaves no partial writes.
        for item in items {
            item.validate()
                .map_err(|e| StorageError::Rejected(e.to_string()))?;
        }

        let mut state = self.state.lock().await;
        for item in items {
            state
                .items
                .entry(item.natural_key(partition))
                .and_modify(|stored| stored.refresh_from(item))
                .or_insert_with(|| item.clone());
        }

        let now = Utc::now();
        let batch_max = items.iter().map(|i| i.timestamp).max();
        state
            .partitions
            .entry(partition)
            .or_insert_with(|| PartitionRecord::new(partition, None, PartitionStatus::Active))
            .record_ingest(now, batch_max);

        Ok(items.len())
    }
}

impl MemoryState {
    fn job_mut(&mut self, job_id: Uuid) -> Result<&mut Job, LedgerError> {
        self.jobs.get_mut(&job_id).ok_or(LedgerError::NotFound(job_id))
    }
}

#[async_trait]
impl JobLedger for MemoryStore {
    async fn create(&self, new: NewJob) -> Result<Job, LedgerError> {
        let job = Job::from_new(new, Utc::now());
        self.state.lock().await.jobs.insert(job.job_id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, LedgerError> {
        Ok(self.state.lock().await.jobs.get(&job_id).cloned())
    }

    async fn list_assignable(&self, limit: usize) -> Result<Vec<JobAssignment>, LedgerError> {
        let state = self.state.lock().await;
        let mut pending: Vec<&Job> = state
            .jobs
            .values()
            .filter(|job| job.state == JobState::Pending)
            .filter(|job| {
                state
                    .partitions
                    .get(&job.partition_key)
                    .is_some_and(PartitionRecord::is_active)
            })
            .collect();
        pending.sort_by(|a, b| assignment_order(a, b));

        Ok(pending
            .into_iter()
            .take(limit)
            .map(|job| {
                let handle = state
                    .partitions
                    .get(&job.partition_key)
                    .and_then(|p| p.handle.clone());
                JobAssignment::from_job(job, handle)
            })
            .collect())
    }

    async fn claim(&self, job_id: Uuid, worker_id: &str) -> Result<ClaimOutcome, LedgerError> {
        let mut state = self.state.lock().await;
        let job = state.job_mut(job_id)?;
        let newly_claimed = job.claim(worker_id, Utc::now())?;
        Ok(ClaimOutcome {
            job: job.clone(),
            newly_claimed,
        })
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        items_collected: i64,
    ) -> Result<Job, LedgerError> {
        let mut state = self.state.lock().await;
        let job = state.job_mut(job_id)?;
        job.complete(worker_id, items_collected, Utc::now())?;
        let job = job.clone();

        if let Some(worker) = state.workers.get_mut(worker_id) {
            worker.jobs_completed += 1;
            worker.items_processed += items_collected;
        }
        Ok(job)
    }

    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error_message: &str,
    ) -> Result<Job, LedgerError> {
        let mut state = self.state.lock().await;
        let job = state.job_mut(job_id)?;
        job.fail(worker_id, error_message, Utc::now())?;
        let job = job.clone();

        if let Some(worker) = state.workers.get_mut(worker_id) {
            worker.jobs_failed += 1;
        }
        Ok(job)
    }

    async fn sweep_terminal(&self, older_than: DateTime<Utc>) -> Result<u64, LedgerError> {
        let mut state = self.state.lock().await;
        let before = state.jobs.len();
        state.jobs.retain(|_, job| !job.is_expired(older_than));
        Ok((before - state.jobs.len()) as u64)
    }
}

#[async_trait]
impl WorkerRegistry for MemoryStore {
    async fn record_heartbeat(
        &self,
        worker_id: &str,
        heartbeat: Heartbeat,
    ) -> Result<WorkerRecord, StorageError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let record = match state.workers.get_mut(worker_id) {
            Some(existing) => {
                existing.apply_heartbeat(heartbeat, now);
                existing.clone()
            }
            None => {
                let record = WorkerRecord::first_seen(worker_id, heartbeat, now);
                state.workers.insert(worker_id.to_string(), record.clone());
                record
            }
        };
        Ok(record)
    }

    async fn get_worker(&self, worker_id: &str) -> Result<Option<WorkerRecord>, StorageError> {
        Ok(self.state.lock().await.workers.get(worker_id).cloned())
    }

    async fn read_stats(&self, worker_id: &str) -> Result<WorkerStats, StorageError> {
        Ok(self
            .state
            .lock()
            .await
            .workers
            .get(worker_id)
            .map(|w| w.stats(Utc::now()))
            .unwrap_or_default())
    }
}

#[async_trait]
impl PartitionCatalog for MemoryStore {
    async fn upsert_partition(
        &self,
        partition_key: PartitionKey,
        handle: Option<String>,
        status: PartitionStatus,
    ) -> Result<PartitionRecord, StorageError> {
        let mut state = self.state.lock().await;
        let record = state
            .partitions
            .entry(partition_key)
            .and_modify(|p| {
                p.status = status;
                if handle.is_some() {
                    p.handle = handle.clone();
                }
            })
            .or_insert_with(|| PartitionRecord::new(partition_key, handle.clone(), status));
        Ok(record.clone())
    }

    async fn get_partition(
        &self,
        partition_key: PartitionKey,
    ) -> Result<Option<PartitionRecord>, StorageError> {
        Ok(self.state.lock().await.partitions.get(&partition_key).cloned())
    }

    async fn partition_stats(&self, partition_key: PartitionKey) -> Result<PartitionStats, StorageError> {
        let state = self.state.lock().await;
        let items = state
            .items
            .range((partition_key, i64::MIN)..=(partition_key, i64::MAX))
            .map(|(_, item)| item);
        Ok(PartitionStats::from_items(partition_key, items))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use collector_core::{JobType, TransitionError, WorkerStatus};

    use super::*;

    fn item(id: i64) -> Item {
        Item::new(id, Utc::now()).with_text(format!("message {id}"))
    }

    async fn store_with_active(partitions: &[PartitionKey]) -> MemoryStore {
        let store = MemoryStore::new();
        for p in partitions {
            store
                .upsert_partition(*p, Some(format!("chan_{p}")), PartitionStatus::Active)
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_write_is_idempotent_and_refreshes_counters() {
        let store = MemoryStore::new();
        let first = item(1).with_counters(10, 0, 0);
        store.write(7, &[first.clone(), item(2)]).await.unwrap();

        let mut again = first.clone().with_counters(50, 2, 1);
        again.text = Some("rewritten".into());
        store.write(7, &[again]).await.unwrap();

        assert_eq!(store.item_count().await, 2);
        let stored = store.item(7, 1).await.unwrap();
        assert_eq!(stored.views, 50);
        assert_eq!(stored.replies, 1);
        assert_eq!(stored.text.as_deref(), Some("message 1"));
    }

    #[tokio::test]
    async fn test_write_rejects_whole_batch_on_bad_item() {
        let store = MemoryStore::new();
        let bad = item(2).with_counters(-5, 0, 0);

        let err = store.write(1, &[item(1), bad]).await.unwrap_err();
        assert!(matches!(err, StorageError::Rejected(_)));
        assert_eq!(store.item_count().await, 0);
    }

    #[tokio::test]
    async fn test_write_updates_partition_aggregate() {
        let store = MemoryStore::new();
        let newest = Utc::now();
        let older = newest - chrono::Duration::hours(3);

        store.write(3, &[Item::new(1, newest)]).await.unwrap();
        store.write(3, &[Item::new(2, older)]).await.unwrap();

        let partition = store.get_partition(3).await.unwrap().unwrap();
        assert_eq!(partition.last_item_at, Some(newest));
        assert!(partition.last_ingested_at.is_some());

        let stats = store.partition_stats(3).await.unwrap();
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.first_item_at, Some(older));
        assert_eq!(store.partition_stats(4).await.unwrap().total_items, 0);
    }

    #[tokio::test]
    async fn test_list_assignable_orders_and_filters() {
        let store = store_with_active(&[1, 2]).await;
        store
            .upsert_partition(3, None, PartitionStatus::Paused)
            .await
            .unwrap();

        let low = store.create(NewJob::new(1, JobType::Update).with_priority(1)).await.unwrap();
        let high = store.create(NewJob::new(2, JobType::Initial).with_priority(9)).await.unwrap();
        store.create(NewJob::new(3, JobType::Update).with_priority(10)).await.unwrap();
        store.create(NewJob::new(99, JobType::Update)).await.unwrap();

        let listed = store.list_assignable(10).await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|a| a.job_id).collect();
        assert_eq!(ids, vec![high.job_id, low.job_id]);
        assert_eq!(listed[0].partition_handle.as_deref(), Some("chan_2"));

        assert_eq!(store.list_assignable(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_claimed_job_is_no_longer_listed() {
        let store = store_with_active(&[1]).await;
        let job = store.create(NewJob::new(1, JobType::Update)).await.unwrap();

        store.claim(job.job_id, "w1").await.unwrap();
        assert!(store.list_assignable(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let store = Arc::new(store_with_active(&[1]).await);
        let job = store.create(NewJob::new(1, JobType::FullSync)).await.unwrap();

        let mut handles = Vec::new();
        for w in 0..8 {
            let store = store.clone();
            let job_id = job.job_id;
            handles.push(tokio::spawn(async move {
                store.claim(job_id, &format!("worker-{w}")).await
            }));
        }

        let mut winners = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(outcome) => {
                    assert!(outcome.newly_claimed);
                    winners += 1;
                }
                Err(e) if e.is_already_claimed() => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(conflicts, 7);
    }

    #[tokio::test]
    async fn test_reclaim_is_idempotent() {
        let store = store_with_active(&[1]).await;
        let job = store.create(NewJob::new(1, JobType::Update)).await.unwrap();

        let first = store.claim(job.job_id, "w1").await.unwrap();
        let second = store.claim(job.job_id, "w1").await.unwrap();
        assert!(first.newly_claimed);
        assert!(!second.newly_claimed);
        assert_eq!(first.job.started_at, second.job.started_at);
    }

    #[tokio::test]
    async fn test_complete_and_fail_update_worker_counters() {
        let store = store_with_active(&[1]).await;
        store
            .record_heartbeat("w1", Heartbeat::new(WorkerStatus::Idle))
            .await
            .unwrap();

        let a = store.create(NewJob::new(1, JobType::Update)).await.unwrap();
        let b = store.create(NewJob::new(1, JobType::Update)).await.unwrap();
        store.claim(a.job_id, "w1").await.unwrap();
        store.claim(b.job_id, "w1").await.unwrap();

        let done = store.complete(a.job_id, "w1", 120).await.unwrap();
        assert_eq!(done.state, JobState::Completed);
        let failed = store.fail(b.job_id, "w1", "rate limited").await.unwrap();
        assert_eq!(failed.retry_count, 1);

        let stats = store.read_stats("w1").await.unwrap();
        assert_eq!(stats.jobs_completed, 1);
        assert_eq!(stats.jobs_failed, 1);
        assert_eq!(stats.items_processed, 120);
    }

    #[tokio::test]
    async fn test_complete_by_other_worker_is_refused() {
        let store = store_with_active(&[1]).await;
        let job = store.create(NewJob::new(1, JobType::Update)).await.unwrap();
        store.claim(job.job_id, "w1").await.unwrap();

        let err = store.complete(job.job_id, "w2", 5).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Transition(TransitionError::NotAssigned { .. })
        ));
        let unchanged = store.get_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(unchanged.state, JobState::Running);
    }

    #[tokio::test]
    async fn test_unknown_job_not_found() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert_eq!(store.claim(id, "w1").await.unwrap_err(), LedgerError::NotFound(id));
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_terminal_jobs() {
        let store = store_with_active(&[1]).await;
        let pending = store.create(NewJob::new(1, JobType::Update)).await.unwrap();
        let done = store.create(NewJob::new(1, JobType::Update)).await.unwrap();
        store.claim(done.job_id, "w1").await.unwrap();
        store.complete(done.job_id, "w1", 0).await.unwrap();

        assert_eq!(store.sweep_terminal(Utc::now() - chrono::Duration::days(1)).await.unwrap(), 0);

        let swept = store
            .sweep_terminal(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(swept, 1);
        assert!(store.get_job(done.job_id).await.unwrap().is_none());
        assert!(store.get_job(pending.job_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_worker_reads_zero_stats() {
        let store = MemoryStore::new();
        assert_eq!(store.read_stats("ghost").await.unwrap(), WorkerStats::default());
    }
}
