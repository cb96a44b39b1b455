use async_trait::async_trait;

use collector_core::{Heartbeat, PartitionKey, PartitionRecord, PartitionStats, PartitionStatus, WorkerRecord, WorkerStats};

use crate::error::StorageError;

#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    /// Upsert the worker's record. Always refreshes `last_heartbeat`.
    async fn record_heartbeat(
        &self,
        worker_id: &str,
        heartbeat: Heartbeat,
    ) -> Result<WorkerRecord, StorageError>;

    async fn get_worker(&self, worker_id: &str) -> Result<Option<WorkerRecord>, StorageError>;

    /// Zeroed stats for a worker that has never sent a heartbeat.
    async fn read_stats(&self, worker_id: &str) -> Result<WorkerStats, StorageError>;
}

/// Partition (channel) records. Jobs are only handed out for active partitions.
#[async_trait]
pub trait PartitionCatalog: Send + Sync {
    async fn upsert_partition(
        &self,
        partition_key: PartitionKey,
        handle: Option<String>,
        status: PartitionStatus,
    ) -> Result<PartitionRecord, StorageError>;

    async fn get_partition(
        &self,
        partition_key: PartitionKey,
    ) -> Result<Option<PartitionRecord>, StorageError>;

    /// Item count, average views and date range over stored items.
    async fn partition_stats(&self, partition_key: PartitionKey) -> Result<PartitionStats, StorageError>;
}
