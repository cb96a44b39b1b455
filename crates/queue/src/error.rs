//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Backpressure: the producer should retry later.
    #[error("queue full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("queue closed for shutdown")]
    Closed,

    #[error("backup store error: {0}")]
    Backup(String),

    #[error("backup timeout after {0}ms")]
    Timeout(u64),

    #[error("envelope serialization error: {0}")]
    Serialize(String),
}

impl QueueError {
    pub fn is_full(&self) -> bool {
        matches!(self, QueueError::Full { .. })
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for QueueError {
    fn from(e: redis::RedisError) -> Self {
        QueueError::Backup(e.to_string())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        QueueError::Serialize(e.to_string())
    }
}
