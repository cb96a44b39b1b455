//! Per-partition accumulator for items awaiting a storage write.
//!
//! Items are grouped by partition and released when a partition reaches the
//! size threshold, or for every partition at once when the time window since
//! the last sweep has elapsed. This balances write efficiency (larger batches)
//! with latency (time-bounded delivery).

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use collector_core::{Item, PartitionKey};

pub struct PartitionBatcher {
    pending: HashMap<PartitionKey, Vec<Item>>,
    batch_size: usize,
    batch_timeout: Duration,
    max_pending: usize,
    last_sweep: Instant,
}

impl PartitionBatcher {
    /// - `batch_size`: a partition is ready once it holds this many items.
    /// - `batch_timeout`: every partition is due once this long has passed
    ///   since the last sweep.
    /// - `max_pending`: ceiling on unflushed items per partition.
    pub fn new(batch_size: usize, batch_timeout: Duration, max_pending: usize) -> Self {
        Self {
            pending: HashMap::new(),
            batch_size: batch_size.max(1),
            batch_timeout,
            max_pending: max_pending.max(batch_size),
            last_sweep: Instant::now(),
        }
    }

    /// Whether `incoming` more items fit under the partition's ceiling.
    /// An empty partition always has room, whatever the size of the envelope.
    pub fn has_room(&self, partition: PartitionKey, incoming: usize) -> bool {
        let pending = self.pending_for(partition);
        pending == 0 || pending + incoming <= self.max_pending
    }

    /// Append items in arrival order. Returns `true` if the partition reached
    /// the size threshold.
    pub fn push(&mut self, partition: PartitionKey, items: Vec<Item>) -> bool {
        if items.is_empty() {
            return self.is_ready(partition);
        }
        let buffer = self.pending.entry(partition).or_default();
        buffer.extend(items);
        buffer.len() >= self.batch_size
    }

    pub fn is_ready(&self, partition: PartitionKey) -> bool {
        self.pending_for(partition) >= self.batch_size
    }

    /// Whether the time window since the last sweep has elapsed.
    pub fn sweep_due(&self) -> bool {
        self.last_sweep.elapsed() >= self.batch_timeout
    }

    /// Time left until the window elapses; zero once a sweep is due.
    pub fn until_sweep(&self) -> Duration {
        self.batch_timeout.saturating_sub(self.last_sweep.elapsed())
    }

    /// Restart the time window.
    pub fn mark_swept(&mut self) {
        self.last_sweep = Instant::now();
    }

    /// Take a partition's full pending sequence.
    pub fn take(&mut self, partition: PartitionKey) -> Vec<Item> {
        self.pending.remove(&partition).unwrap_or_default()
    }

    /// Put items back ahead of anything that arrived since they were taken,
    /// preserving their order.
    pub fn restore(&mut self, partition: PartitionKey, mut items: Vec<Item>) {
        if items.is_empty() {
            return;
        }
        if let Some(newer) = self.pending.remove(&partition) {
            items.extend(newer);
        }
        self.pending.insert(partition, items);
    }

    /// Partitions with pending items, in ascending key order.
    pub fn partitions(&self) -> Vec<PartitionKey> {
        let mut keys: Vec<PartitionKey> = self
            .pending
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(k, _)| *k)
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Take everything, leaving the batcher empty.
    pub fn drain(&mut self) -> Vec<(PartitionKey, Vec<Item>)> {
        let mut all: Vec<(PartitionKey, Vec<Item>)> = self
            .pending
            .drain()
            .filter(|(_, items)| !items.is_empty())
            .collect();
        all.sort_unstable_by_key(|(k, _)| *k);
        all
    }

    pub fn pending_for(&self, partition: PartitionKey) -> usize {
        self.pending.get(&partition).map_or(0, Vec::len)
    }

    /// Total items buffered across all partitions.
    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.values().all(Vec::is_empty)
    }
}
