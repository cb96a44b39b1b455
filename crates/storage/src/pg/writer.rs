use async_trait::async_trait;
use sqlx::types::Json;
use tracing::debug;

use collector_core::{Item, PartitionKey};

use super::PgStore;
use crate::error::StorageError;
use crate::writer::StorageWriter;

// Only observational fields are refreshed on conflict; everything else is
// immutable once stored.
const UPSERT_ITEM: &str = "INSERT INTO items (
        partition_key, item_id, text, ts, views, forwards, replies, reactions, edited_at,
        media, author_id, author_name, is_forwarded, forward_from, reply_to, raw
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
    ON CONFLICT (partition_key, item_id) DO UPDATE SET
        views = EXCLUDED.views,
        forwards = EXCLUDED.forwards,
        replies = EXCLUDED.replies,
        reactions = EXCLUDED.reactions,
        edited_at = EXCLUDED.edited_at";

const UPSERT_PARTITION_AGGREGATE: &str = "INSERT INTO partitions (partition_key, last_ingested_at, last_item_at)
    VALUES ($1, now(), $2)
    ON CONFLICT (partition_key) DO UPDATE SET
        last_ingested_at = now(),
        last_item_at = GREATEST(partitions.last_item_at, EXCLUDED.last_item_at),
        updated_at = now()";

impl PgStore {
    async fn write_batch(&self, partition: PartitionKey, items: &[Item]) -> Result<usize, StorageError> {
        let mut tx = self.pool.begin().await?;

        for item in items {
            let author = item.author.as_ref();
            sqlx::query(UPSERT_ITEM)
                .bind(partition)
                .bind(item.id)
                .bind(item.text.as_deref())
                .bind(item.timestamp)
                .bind(item.views)
                .bind(item.forwards)
                .bind(item.replies)
                .bind(item.reactions.clone().map(Json))
                .bind(item.edited_at)
                .bind(item.media.clone().map(Json))
                .bind(author.and_then(|a| a.id))
                .bind(author.and_then(|a| a.name.clone()))
                .bind(item.is_forwarded)
                .bind(item.forward_from.clone())
                .bind(item.reply_to)
                .bind(item.raw.clone())
                .execute(&mut *tx)
                .await?;
        }

        let batch_max = items.iter().map(|i| i.timestamp).max();
        sqlx::query(UPSERT_PARTITION_AGGREGATE)
            .bind(partition)
            .bind(batch_max)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(partition, items = items.len(), "batch committed");
        Ok(items.len())
    }
}

#[async_trait]
impl StorageWriter for PgStore {
    async fn write(&self, partition: PartitionKey, items: &[Item]) -> Result<usize, StorageError> {
        if items.is_empty() {
            return Ok(0);
        }
        self.bounded(self.write_batch(partition, items)).await
    }
}
