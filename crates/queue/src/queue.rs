//! Bounded in-memory FIFO of batch envelopes with a durable backup.
//!
//! Producers enqueue without blocking and get [`QueueError::Full`] as
//! backpressure. A single consumer (the aggregator) dequeues with a timeout.
//! The resident contents are written to the [`BackupStore`] on shutdown and
//! on checkpoint, and read back by [`IngestionQueue::restore`] on startup.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, warn};
use uuid::Uuid;

use collector_core::BatchEnvelope;

use crate::backup::BackupStore;
use crate::error::QueueError;

/// Counters since process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub len: usize,
    pub capacity: usize,
    pub enqueued: u64,
    pub rejected: u64,
    pub dequeued: u64,
    pub requeued: u64,
}

pub struct IngestionQueue {
    items: Mutex<VecDeque<BatchEnvelope>>,
    capacity: usize,
    available: Notify,
    closed: AtomicBool,
    backup: Arc<dyn BackupStore>,
    enqueued: AtomicU64,
    rejected: AtomicU64,
    dequeued: AtomicU64,
    requeued: AtomicU64,
}

impl IngestionQueue {
    pub fn new(capacity: usize, backup: Arc<dyn BackupStore>) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity,
            available: Notify::new(),
            closed: AtomicBool::new(false),
            backup,
            enqueued: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            requeued: AtomicU64::new(0),
        }
    }

    /// Reload envelopes left in the backup by a previous run.
    ///
    /// Keeps the oldest `capacity` records and drops the rest with a warning.
    /// Records that fail to decode are skipped. A store failure leaves the
    /// queue empty; startup never fails because of the backup. Returns the
    /// number of envelopes restored.
    pub async fn restore(&self) -> usize {
        let records = match self.backup.load().await {
            Ok(records) => records,
            Err(e) => {
                error!(
                    provider = self.backup.provider(),
                    error = %e,
                    "failed to load queue backup — starting with an empty queue"
                );
                return 0;
            }
        };

        let total = records.len();
        let mut items = self.items.lock().await;
        let mut skipped = 0usize;
        let mut dropped = 0usize;
        for record in records {
            match serde_json::from_str::<BatchEnvelope>(&record) {
                Ok(envelope) if items.len() < self.capacity => items.push_back(envelope),
                Ok(envelope) => {
                    dropped += 1;
                    warn!(
                        envelope_id = %envelope.envelope_id,
                        partition = envelope.partition_key,
                        items = envelope.len(),
                        "queue backup exceeds capacity — dropping envelope"
                    );
                }
                Err(e) => {
                    skipped += 1;
                    warn!(error = %e, "skipping undecodable queue backup record");
                }
            }
        }
        let restored = items.len();
        drop(items);

        if restored > 0 {
            self.available.notify_one();
        }
        info!(
            provider = self.backup.provider(),
            total,
            restored,
            skipped,
            dropped,
            "queue restored from backup"
        );
        restored
    }

    /// Append an envelope. Never waits for space.
    pub async fn enqueue(&self, envelope: BatchEnvelope) -> Result<Uuid, QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        let id = envelope.envelope_id;
        {
            let mut items = self.items.lock().await;
            if items.len() >= self.capacity {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(QueueError::Full {
                    capacity: self.capacity,
                });
            }
            items.push_back(envelope);
        }
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.available.notify_one();
        Ok(id)
    }

    /// Hand envelopes back to the head of the queue, ahead of anything
    /// enqueued since, keeping their relative order.
    ///
    /// Bumps each `retry_count`. Capacity is not checked: the envelopes were
    /// already admitted once and must not be lost.
    pub async fn requeue(&self, envelopes: Vec<BatchEnvelope>) {
        if envelopes.is_empty() {
            return;
        }
        let count = envelopes.len() as u64;
        {
            let mut items = self.items.lock().await;
            for mut envelope in envelopes.into_iter().rev() {
                envelope.mark_retry();
                items.push_front(envelope);
            }
        }
        self.requeued.fetch_add(count, Ordering::Relaxed);
        self.available.notify_one();
    }

    /// Next envelope in FIFO order, waiting up to `timeout` for one to arrive.
    ///
    /// Cancel-safe: dropping the future never loses an envelope.
    pub async fn dequeue(&self, timeout: Duration) -> Option<BatchEnvelope> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.available.notified();
            if let Some(envelope) = self.items.lock().await.pop_front() {
                self.dequeued.fetch_add(1, Ordering::Relaxed);
                return Some(envelope);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Replace the backup with a snapshot of the current contents.
    ///
    /// Envelopes already handed to the consumer are not part of the snapshot.
    pub async fn checkpoint(&self) -> Result<usize, QueueError> {
        let records = {
            let items = self.items.lock().await;
            encode_all(items.iter())?
        };
        let count = records.len();
        self.backup.replace(records).await?;
        Ok(count)
    }

    /// Close the queue to producers and persist every resident envelope.
    ///
    /// The backup list is replaced, never appended to, so a restart restores
    /// exactly what was resident at shutdown.
    pub async fn shutdown(&self, timeout: Duration) -> Result<usize, QueueError> {
        self.closed.store(true, Ordering::Release);
        let drained: Vec<BatchEnvelope> = self.items.lock().await.drain(..).collect();
        let records = encode_all(drained.iter())?;
        let count = records.len();

        match tokio::time::timeout(timeout, self.backup.replace(records)).await {
            Ok(Ok(())) => {
                info!(
                    provider = self.backup.provider(),
                    envelopes = count,
                    "queue backed up for shutdown"
                );
                Ok(count)
            }
            Ok(Err(e)) => {
                error!(envelopes = count, error = %e, "queue shutdown backup failed");
                Err(e)
            }
            Err(_) => {
                error!(envelopes = count, "queue shutdown backup timed out");
                Err(QueueError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn stats(&self) -> QueueStats {
        QueueStats {
            len: self.len().await,
            capacity: self.capacity,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
        }
    }
}

fn encode_all<'a>(
    envelopes: impl Iterator<Item = &'a BatchEnvelope>,
) -> Result<Vec<String>, QueueError> {
    envelopes
        .map(|e| serde_json::to_string(e).map_err(QueueError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use collector_core::Item;

    use super::*;
    use crate::backup::MemoryBackupStore;

    fn envelope(partition: i64, first_id: i64) -> BatchEnvelope {
        BatchEnvelope::new(
            "producer-1",
            partition,
            None,
            vec![Item::new(first_id, Utc::now()), Item::new(first_id + 1, Utc::now())],
        )
    }

    fn queue(capacity: usize) -> (IngestionQueue, Arc<MemoryBackupStore>) {
        let backup = Arc::new(MemoryBackupStore::new());
        (IngestionQueue::new(capacity, backup.clone()), backup)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (q, _) = queue(10);
        let a = q.enqueue(envelope(1, 0)).await.unwrap();
        let b = q.enqueue(envelope(2, 0)).await.unwrap();

        let short = Duration::from_millis(10);
        assert_eq!(q.dequeue(short).await.unwrap().envelope_id, a);
        assert_eq!(q.dequeue(short).await.unwrap().envelope_id, b);
        assert!(q.dequeue(short).await.is_none());
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_blocking() {
        let (q, _) = queue(2);
        q.enqueue(envelope(1, 0)).await.unwrap();
        q.enqueue(envelope(1, 10)).await.unwrap();

        let err = q.enqueue(envelope(1, 20)).await.unwrap_err();
        assert_eq!(err, QueueError::Full { capacity: 2 });
        assert_eq!(q.len().await, 2);
        assert_eq!(q.stats().await.rejected, 1);
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let (q, _) = queue(10);
        let q = Arc::new(q);

        let consumer = {
            let q = q.clone();
            tokio::spawn(async move { q.dequeue(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let id = q.enqueue(envelope(3, 0)).await.unwrap();

        let got = consumer.await.unwrap().unwrap();
        assert_eq!(got.envelope_id, id);
    }

    #[tokio::test]
    async fn test_requeue_goes_to_head_and_counts_retry() {
        let (q, _) = queue(1);
        q.enqueue(envelope(1, 0)).await.unwrap();
        let first = q.dequeue(Duration::from_millis(10)).await.unwrap();
        q.enqueue(envelope(2, 0)).await.unwrap();

        let second = envelope(1, 10);
        q.requeue(vec![first.clone(), second.clone()]).await;
        assert_eq!(q.len().await, 3);
        assert_eq!(q.stats().await.requeued, 2);

        let back = q.dequeue(Duration::from_millis(10)).await.unwrap();
        assert_eq!(back.envelope_id, first.envelope_id);
        assert_eq!(back.retry_count, 1);
        let next = q.dequeue(Duration::from_millis(10)).await.unwrap();
        assert_eq!(next.envelope_id, second.envelope_id);
        let newest = q.dequeue(Duration::from_millis(10)).await.unwrap();
        assert_eq!(newest.partition_key, 2);
    }

    #[tokio::test]
    async fn test_shutdown_then_restore_preserves_order() {
        let backup = Arc::new(MemoryBackupStore::new());
        let q = IngestionQueue::new(10, backup.clone());
        let ids: Vec<Uuid> = {
            let mut ids = Vec::new();
            for p in 0..3 {
                ids.push(q.enqueue(envelope(p, 0)).await.unwrap());
            }
            ids
        };

        assert_eq!(q.shutdown(Duration::from_secs(1)).await.unwrap(), 3);
        assert!(q.is_closed());
        assert_eq!(q.enqueue(envelope(9, 0)).await.unwrap_err(), QueueError::Closed);

        let restarted = IngestionQueue::new(10, backup);
        assert_eq!(restarted.restore().await, 3);
        for id in ids {
            let got = restarted.dequeue(Duration::from_millis(10)).await.unwrap();
            assert_eq!(got.envelope_id, id);
        }
    }

    #[tokio::test]
    async fn test_shutdown_replaces_stale_backup() {
        let stale = serde_json::to_string(&envelope(5, 0)).unwrap();
        let backup = Arc::new(MemoryBackupStore::with_records(vec![stale]));
        let q = IngestionQueue::new(10, backup.clone());
        assert_eq!(q.restore().await, 1);

        q.dequeue(Duration::from_millis(10)).await.unwrap();
        q.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(backup.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_restore_keeps_oldest_up_to_capacity_and_skips_garbage() {
        let records = vec![
            serde_json::to_string(&envelope(1, 0)).unwrap(),
            "{not json".to_string(),
            serde_json::to_string(&envelope(2, 0)).unwrap(),
            serde_json::to_string(&envelope(3, 0)).unwrap(),
        ];
        let backup = Arc::new(MemoryBackupStore::with_records(records));
        let q = IngestionQueue::new(2, backup);

        assert_eq!(q.restore().await, 2);
        let first = q.dequeue(Duration::from_millis(10)).await.unwrap();
        let second = q.dequeue(Duration::from_millis(10)).await.unwrap();
        assert_eq!((first.partition_key, second.partition_key), (1, 2));
    }

    #[tokio::test]
    async fn test_checkpoint_snapshots_current_contents() {
        let (q, backup) = queue(10);
        q.enqueue(envelope(1, 0)).await.unwrap();
        q.enqueue(envelope(2, 0)).await.unwrap();

        assert_eq!(q.checkpoint().await.unwrap(), 2);
        assert_eq!(backup.snapshot().len(), 2);
        assert_eq!(q.len().await, 2);
    }
}
