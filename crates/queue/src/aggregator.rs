//! The single consumer of the ingestion queue.
//!
//! Dequeues envelopes, merges their items into per-partition batches and
//! hands full or timed-out batches to the [`StorageWriter`]. Items are only
//! released from memory once the writer confirms them.
//!
//! When a partition is saturated and storage will not drain it, the envelope
//! is held here and intake pauses until it fits. Producers then see the
//! bounded queue fill up instead of the envelope being reordered behind
//! newer data.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use collector_core::config::QueueConfig;
use collector_core::{BatchEnvelope, Item, PartitionKey};
use collector_storage::{StorageError, StorageWriter};

use crate::batcher::PartitionBatcher;
use crate::queue::IngestionQueue;

/// Producer id stamped on envelopes rebuilt from unflushed items at shutdown.
pub const AGGREGATOR_PRODUCER_ID: &str = "aggregator";

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub max_pending_per_partition: usize,
    pub poll_interval: Duration,
    pub shutdown_grace: Duration,
}

impl From<&QueueConfig> for AggregatorConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            batch_timeout: config.batch_timeout(),
            max_pending_per_partition: config.max_pending_per_partition,
            poll_interval: config.poll_interval(),
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

/// Running totals, reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub flushed_batches: u64,
    pub flushed_items: u64,
    /// Writes that failed with a retryable error; the items stayed pending.
    pub failed_flushes: u64,
    /// Items the store refused outright; logged and discarded.
    pub dropped_items: u64,
    /// Times intake paused because a partition was saturated.
    pub overflow_pauses: u64,
    /// Items handed back to the head of the queue at shutdown.
    pub requeued_items: u64,
}

pub struct BatchAggregator {
    queue: Arc<IngestionQueue>,
    writer: Arc<dyn StorageWriter>,
    batcher: PartitionBatcher,
    config: AggregatorConfig,
    report: FlushReport,
    /// Envelope that did not fit its partition; intake pauses while set.
    held: Option<BatchEnvelope>,
    /// Set once shutdown starts; writes still running at this instant are
    /// abandoned and their items kept.
    deadline: Option<Instant>,
}

impl BatchAggregator {
    pub fn new(
        queue: Arc<IngestionQueue>,
        writer: Arc<dyn StorageWriter>,
        config: AggregatorConfig,
    ) -> Self {
        let batcher = PartitionBatcher::new(
            config.batch_size,
            config.batch_timeout,
            config.max_pending_per_partition,
        );
        Self {
            queue,
            writer,
            batcher,
            config,
            report: FlushReport::default(),
            held: None,
            deadline: None,
        }
    }

    pub fn report(&self) -> FlushReport {
        self.report
    }

    /// Run until `shutdown` is notified, then flush what is pending and hand
    /// any leftovers back to the queue.
    pub async fn run(mut self, shutdown: Arc<Notify>) -> FlushReport {
        info!(
            batch_size = self.config.batch_size,
            batch_timeout_ms = self.config.batch_timeout.as_millis() as u64,
            max_pending = self.config.max_pending_per_partition,
            "batch aggregator started"
        );

        loop {
            // Never sleep past the end of the time window.
            let wait = self.config.poll_interval.min(self.batcher.until_sweep());

            if self.held.is_some() {
                tokio::select! {
                    biased;
                    _ = shutdown.notified() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
                self.retry_held().await;
            } else {
                tokio::select! {
                    biased;
                    _ = shutdown.notified() => break,
                    next = self.queue.dequeue(wait) => {
                        if let Some(envelope) = next {
                            self.accept(envelope).await;
                        }
                    }
                }
            }

            if self.batcher.sweep_due() {
                self.flush_all().await;
                self.batcher.mark_swept();
            }
        }

        self.shutdown().await;
        info!(
            flushed_items = self.report.flushed_items,
            failed_flushes = self.report.failed_flushes,
            dropped_items = self.report.dropped_items,
            overflow_pauses = self.report.overflow_pauses,
            requeued_items = self.report.requeued_items,
            "batch aggregator stopped"
        );
        self.report
    }

    /// Merge one envelope, or hold it if its partition is saturated.
    async fn accept(&mut self, envelope: BatchEnvelope) {
        let partition = envelope.partition_key;
        let incoming = envelope.len();

        if self.make_room(partition, incoming).await {
            self.merge(envelope).await;
            return;
        }

        self.report.overflow_pauses += 1;
        error!(
            partition,
            envelope_id = %envelope.envelope_id,
            pending = self.batcher.pending_for(partition),
            incoming,
            "partition saturated, storage not draining; intake paused"
        );
        self.held = Some(envelope);
    }

    /// Try the held envelope again; intake resumes once it is merged.
    async fn retry_held(&mut self) {
        let Some(envelope) = self.held.take() else {
            return;
        };
        let partition = envelope.partition_key;
        if self.make_room(partition, envelope.len()).await {
            info!(partition, envelope_id = %envelope.envelope_id, "intake resumed");
            self.merge(envelope).await;
        } else {
            self.held = Some(envelope);
        }
    }

    /// Whether `incoming` items fit, flushing the partition once if not.
    async fn make_room(&mut self, partition: PartitionKey, incoming: usize) -> bool {
        if self.batcher.has_room(partition, incoming) {
            return true;
        }
        self.flush_partition(partition).await;
        self.batcher.has_room(partition, incoming)
    }

    async fn merge(&mut self, envelope: BatchEnvelope) {
        let partition = envelope.partition_key;
        debug!(partition, items = envelope.len(), "envelope merged");
        if self.batcher.push(partition, envelope.items) {
            self.flush_partition(partition).await;
        }
    }

    async fn write(&self, partition: PartitionKey, items: &[Item]) -> Result<usize, StorageError> {
        let write = self.writer.write(partition, items);
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, write).await.unwrap_or_else(|_| {
                Err(StorageError::Unavailable(
                    "shutdown grace period elapsed".to_string(),
                ))
            }),
            None => write.await,
        }
    }

    async fn flush_all(&mut self) {
        for partition in self.batcher.partitions() {
            self.flush_partition(partition).await;
        }
    }

    async fn flush_partition(&mut self, partition: PartitionKey) {
        let items = self.batcher.take(partition);
        if items.is_empty() {
            return;
        }

        match self.write(partition, &items).await {
            Ok(written) => {
                self.report.flushed_batches += 1;
                self.report.flushed_items += written as u64;
                info!(partition, items = written, "flushed partition");
            }
            Err(StorageError::Unavailable(reason)) => {
                self.report.failed_flushes += 1;
                warn!(
                    partition,
                    items = items.len(),
                    error = %reason,
                    "storage unavailable — keeping batch pending"
                );
                self.batcher.restore(partition, items);
            }
            Err(StorageError::Rejected(reason)) => {
                warn!(
                    partition,
                    items = items.len(),
                    error = %reason,
                    "storage rejected batch — isolating offending items"
                );
                self.isolate(partition, items).await;
            }
        }
    }

    /// Write items one at a time so a single bad item cannot block the rest.
    async fn isolate(&mut self, partition: PartitionKey, items: Vec<Item>) {
        let mut remaining = items.into_iter();
        while let Some(item) = remaining.next() {
            match self.write(partition, std::slice::from_ref(&item)).await {
                Ok(written) => self.report.flushed_items += written as u64,
                Err(StorageError::Rejected(reason)) => {
                    self.report.dropped_items += 1;
                    error!(
                        partition,
                        item_id = item.id,
                        error = %reason,
                        "dropping item rejected by storage"
                    );
                }
                Err(StorageError::Unavailable(reason)) => {
                    self.report.failed_flushes += 1;
                    warn!(
                        partition,
                        error = %reason,
                        "storage unavailable during isolation — keeping rest pending"
                    );
                    let mut rest = vec![item];
                    rest.extend(remaining);
                    self.batcher.restore(partition, rest);
                    return;
                }
            }
        }
        self.report.flushed_batches += 1;
    }

    /// One best-effort flush of every partition within the grace period, then
    /// leftovers go back to the head of the queue so its shutdown backup
    /// keeps them ahead of anything newer.
    async fn shutdown(&mut self) {
        let pending = self.batcher.len();
        if pending > 0 {
            info!(items = pending, "flushing pending partitions before shutdown");
            self.deadline = Some(Instant::now() + self.config.shutdown_grace);
            self.flush_all().await;
        }

        let mut leftovers = Vec::new();
        for (partition, items) in self.batcher.drain() {
            warn!(
                partition,
                items = items.len(),
                "unflushed items handed back to queue for backup"
            );
            leftovers.push(BatchEnvelope::new(AGGREGATOR_PRODUCER_ID, partition, None, items));
        }
        // The held envelope arrived after everything merged for its partition.
        if let Some(envelope) = self.held.take() {
            warn!(
                partition = envelope.partition_key,
                items = envelope.len(),
                "held envelope handed back to queue for backup"
            );
            leftovers.push(envelope);
        }

        if leftovers.is_empty() {
            return;
        }
        self.report.requeued_items += leftovers.iter().map(|e| e.len() as u64).sum::<u64>();
        self.queue.requeue(leftovers).await;
    }
}
