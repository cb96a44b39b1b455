//! Durable backup of queued envelopes across restarts.
//!
//! The backup is an ordered list of opaque records (JSON-encoded
//! [`collector_core::BatchEnvelope`]s) under a single key. It is written as a
//! whole on shutdown or checkpoint and read back once on startup.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::QueueError;

/// Trait for backup store backends.
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// All records, oldest first.
    async fn load(&self) -> Result<Vec<String>, QueueError>;

    /// Replace the stored list with `records` in one atomic step.
    async fn replace(&self, records: Vec<String>) -> Result<(), QueueError>;

    /// Backend name for logs ("memory", "redis").
    fn provider(&self) -> &'static str;
}

/// In-process backup. Survives a queue being dropped and rebuilt, which is
/// enough for tests and single-process dev mode.
#[derive(Debug, Default)]
pub struct MemoryBackupStore {
    records: Mutex<Vec<String>>,
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing records.
    pub fn with_records(records: Vec<String>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BackupStore for MemoryBackupStore {
    async fn load(&self) -> Result<Vec<String>, QueueError> {
        self.records
            .lock()
            .map(|r| r.clone())
            .map_err(|e| QueueError::Backup(e.to_string()))
    }

    async fn replace(&self, records: Vec<String>) -> Result<(), QueueError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| QueueError::Backup(e.to_string()))?;
        *guard = records;
        Ok(())
    }

    fn provider(&self) -> &'static str {
        "memory"
    }
}

// ── Redis backend ───────────────────────────────────────────────────

#[cfg(feature = "redis")]
pub use self::redis_store::RedisBackupStore;

#[cfg(feature = "redis")]
mod redis_store {
    use std::future::Future;
    use std::time::Duration;

    use async_trait::async_trait;
    use redis::aio::MultiplexedConnection;
    use redis::AsyncCommands;
    use tracing::info;

    use super::BackupStore;
    use crate::error::QueueError;

    /// Redis list backup.
    ///
    /// Uses a `redis::aio::MultiplexedConnection`; `LRANGE` for load and a
    /// `MULTI`/`DEL`/`RPUSH`/`EXEC` pipeline for replace. Every call is bounded
    /// by `op_timeout`.
    pub struct RedisBackupStore {
        conn: MultiplexedConnection,
        key: String,
        op_timeout: Duration,
    }

    impl RedisBackupStore {
        pub async fn connect(
            url: &str,
            key: impl Into<String>,
            op_timeout: Duration,
        ) -> Result<Self, QueueError> {
            let client = redis::Client::open(url)?;
            let conn = bounded(op_timeout, async {
                client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(QueueError::from)
            })
            .await?;
            let key = key.into();
            info!(key = %key, "connected Redis queue backup");
            Ok(Self {
                conn,
                key,
                op_timeout,
            })
        }
    }

    async fn bounded<T, F>(op_timeout: Duration, fut: F) -> Result<T, QueueError>
    where
        F: Future<Output = Result<T, QueueError>>,
    {
        tokio::time::timeout(op_timeout, fut)
            .await
            .map_err(|_| QueueError::Timeout(op_timeout.as_millis() as u64))?
    }

    #[async_trait]
    impl BackupStore for RedisBackupStore {
        async fn load(&self) -> Result<Vec<String>, QueueError> {
            let mut conn = self.conn.clone();
            bounded(self.op_timeout, async {
                let records: Vec<String> = conn.lrange(&self.key, 0, -1).await?;
                Ok(records)
            })
            .await
        }

        async fn replace(&self, records: Vec<String>) -> Result<(), QueueError> {
            let mut conn = self.conn.clone();
            let mut pipe = redis::pipe();
            pipe.atomic().del(&self.key).ignore();
            if !records.is_empty() {
                pipe.rpush(&self.key, records).ignore();
            }
            bounded(self.op_timeout, async {
                let _: () = pipe.query_async(&mut conn).await?;
                Ok(())
            })
            .await
        }

        fn provider(&self) -> &'static str {
            "redis"
        }
    }
}
