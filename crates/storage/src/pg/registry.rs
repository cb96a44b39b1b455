use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;

use collector_core::{
    Heartbeat, PartitionKey, PartitionRecord, PartitionStats, PartitionStatus, WorkerRecord,
    WorkerStats,
};

use super::rows::{PartitionRow, WorkerRow, PARTITION_COLUMNS, WORKER_COLUMNS};
use super::PgStore;
use crate::error::StorageError;
use crate::registry::{PartitionCatalog, WorkerRegistry};

#[async_trait]
impl WorkerRegistry for PgStore {
    async fn record_heartbeat(
        &self,
        worker_id: &str,
        heartbeat: Heartbeat,
    ) -> Result<WorkerRecord, StorageError> {
        let query = format!(
            "INSERT INTO workers (worker_id, status, last_heartbeat, current_job, metadata, started_at)
             VALUES ($1, $2, now(), $3, $4, now())
             ON CONFLICT (worker_id) DO UPDATE SET
                 status = EXCLUDED.status,
                 last_heartbeat = now(),
                 current_job = EXCLUDED.current_job,
                 metadata = EXCLUDED.metadata
             RETURNING {WORKER_COLUMNS}"
        );
        let row = self
            .bounded(async {
                sqlx::query_as::<_, WorkerRow>(&query)
                    .bind(worker_id)
                    .bind(heartbeat.status.as_str())
                    .bind(heartbeat.current_job)
                    .bind(heartbeat.metadata.map(Json))
                    .fetch_one(&self.pool)
                    .await
                    .map_err(StorageError::from)
            })
            .await?;
        WorkerRecord::try_from(row)
    }

    async fn get_worker(&self, worker_id: &str) -> Result<Option<WorkerRecord>, StorageError> {
        let query = format!("SELECT {WORKER_COLUMNS} FROM workers WHERE worker_id = $1");
        let row = self
            .bounded(async {
                sqlx::query_as::<_, WorkerRow>(&query)
                    .bind(worker_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(StorageError::from)
            })
            .await?;
        row.map(WorkerRecord::try_from).transpose()
    }

    async fn read_stats(&self, worker_id: &str) -> Result<WorkerStats, StorageError> {
        let row: Option<(i64, i64, i64, i64)> = self
            .bounded(async {
                sqlx::query_as(
                    "SELECT jobs_completed, jobs_failed, items_processed,
                            GREATEST(EXTRACT(EPOCH FROM (now() - started_at)), 0)::BIGINT
                     FROM workers WHERE worker_id = $1",
                )
                .bind(worker_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::from)
            })
            .await?;

        Ok(row
            .map(|(jobs_completed, jobs_failed, items_processed, uptime_seconds)| WorkerStats {
                jobs_completed,
                jobs_failed,
                items_processed,
                uptime_seconds,
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl PartitionCatalog for PgStore {
    async fn upsert_partition(
        &self,
        partition_key: PartitionKey,
        handle: Option<String>,
        status: PartitionStatus,
    ) -> Result<PartitionRecord, StorageError> {
        let query = format!(
            "INSERT INTO partitions (partition_key, handle, status) VALUES ($1, $2, $3)
             ON CONFLICT (partition_key) DO UPDATE SET
                 handle = COALESCE(EXCLUDED.handle, partitions.handle),
                 status = EXCLUDED.status,
                 updated_at = now()
             RETURNING {PARTITION_COLUMNS}"
        );
        let row = self
            .bounded(async {
                sqlx::query_as::<_, PartitionRow>(&query)
                    .bind(partition_key)
                    .bind(handle)
                    .bind(status.as_str())
                    .fetch_one(&self.pool)
                    .await
                    .map_err(StorageError::from)
            })
            .await?;
        PartitionRecord::try_from(row)
    }

    async fn get_partition(
        &self,
        partition_key: PartitionKey,
    ) -> Result<Option<PartitionRecord>, StorageError> {
        let query = format!("SELECT {PARTITION_COLUMNS} FROM partitions WHERE partition_key = $1");
        let row = self
            .bounded(async {
                sqlx::query_as::<_, PartitionRow>(&query)
                    .bind(partition_key)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(StorageError::from)
            })
            .await?;
        row.map(PartitionRecord::try_from).transpose()
    }

    async fn partition_stats(&self, partition_key: PartitionKey) -> Result<PartitionStats, StorageError> {
        type StatsRow = (i64, Option<f64>, Option<DateTime<Utc>>, Option<DateTime<Utc>>);
        let (total_items, avg_views, first_item_at, last_item_at): StatsRow = self
            .bounded(async {
                sqlx::query_as(
                    "SELECT COUNT(*)::BIGINT, AVG(views)::DOUBLE PRECISION, MIN(ts), MAX(ts)
                     FROM items WHERE partition_key = $1",
                )
                .bind(partition_key)
                .fetch_one(&self.pool)
                .await
                .map_err(StorageError::from)
            })
            .await?;

        Ok(PartitionStats {
            partition_key,
            total_items,
            avg_views,
            first_item_at,
            last_item_at,
        })
    }
}
