use async_trait::async_trait;

use collector_core::{Item, PartitionKey};

use crate::error::StorageError;

/// Idempotent, atomic persistence of one partition's batch.
///
/// Re-writing an item that already exists refreshes only its observational
/// fields (counters, reactions, edit time). Either every item in `items` is
/// persisted or none is. Returns the number of items written.
#[async_trait]
pub trait StorageWriter: Send + Sync {
    async fn write(&self, partition: PartitionKey, items: &[Item]) -> Result<usize, StorageError>;
}
