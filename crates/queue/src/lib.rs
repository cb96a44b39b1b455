//! Ingestion queue and batch aggregation.
//!
//! Producers hand [`collector_core::BatchEnvelope`]s to the bounded
//! [`IngestionQueue`]; a single [`BatchAggregator`] drains it into
//! per-partition batches and writes them through a
//! [`collector_storage::StorageWriter`]. Queue contents survive restarts via a
//! [`BackupStore`].

pub mod aggregator;
pub mod backup;
pub mod batcher;
pub mod error;
pub mod queue;

pub use aggregator::{AggregatorConfig, BatchAggregator, FlushReport, AGGREGATOR_PRODUCER_ID};
pub use backup::{BackupStore, MemoryBackupStore};
#[cfg(feature = "redis")]
pub use backup::RedisBackupStore;
pub use batcher::PartitionBatcher;
pub use error::QueueError;
pub use queue::{IngestionQueue, QueueStats};
