//! Batch envelopes: one inbound submission as it travels through the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::item::{Item, PartitionKey};

/// Upper bound on items per submission, enforced at the transport boundary.
pub const MAX_BATCH_ITEMS: usize = 1000;

/// One producer submission. Immutable apart from `retry_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEnvelope {
    pub envelope_id: Uuid,
    pub producer_id: String,
    pub partition_key: PartitionKey,
    pub job_id: Option<Uuid>,
    pub items: Vec<Item>,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
}

impl BatchEnvelope {
    pub fn new(
        producer_id: impl Into<String>,
        partition_key: PartitionKey,
        job_id: Option<Uuid>,
        items: Vec<Item>,
    ) -> Self {
        Self {
            envelope_id: Uuid::new_v4(),
            producer_id: producer_id.into(),
            partition_key,
            job_id,
            items,
            received_at: Utc::now(),
            retry_count: 0,
        }
    }

    /// Record a failed attempt before the envelope goes back on the queue.
    pub fn mark_retry(&mut self) {
        self.retry_count = self.retry_count.saturating_add(1);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Shape check applied before enqueue.
    pub fn validate(&self, max_items: usize) -> Result<(), ValidationError> {
        if self.items.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        if self.items.len() > max_items {
            return Err(ValidationError::BatchTooLarge {
                len: self.items.len(),
                max: max_items,
            });
        }
        self.items.iter().try_for_each(Item::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: i64) -> Vec<Item> {
        (0..n).map(|i| Item::new(i, Utc::now())).collect()
    }

    #[test]
    fn test_new_envelope_defaults() {
        let env = BatchEnvelope::new("worker-1", 100, None, items(3));
        assert_eq!(env.retry_count, 0);
        assert_eq!(env.len(), 3);
        assert_eq!(env.partition_key, 100);
    }

    #[test]
    fn test_validate_empty_and_oversized() {
        let empty = BatchEnvelope::new("w", 1, None, vec![]);
        assert_eq!(empty.validate(10), Err(ValidationError::EmptyBatch));

        let big = BatchEnvelope::new("w", 1, None, items(11));
        assert_eq!(
            big.validate(10),
            Err(ValidationError::BatchTooLarge { len: 11, max: 10 })
        );

        let ok = BatchEnvelope::new("w", 1, None, items(10));
        assert!(ok.validate(10).is_ok());
    }

    #[test]
    fn test_mark_retry_only_touches_retry_count() {
        let mut env = BatchEnvelope::new("w", 1, Some(Uuid::new_v4()), items(2));
        let before = env.clone();
        env.mark_retry();
        env.mark_retry();
        assert_eq!(env.retry_count, 2);
        assert_eq!(env.envelope_id, before.envelope_id);
        assert_eq!(env.items, before.items);
    }
}
