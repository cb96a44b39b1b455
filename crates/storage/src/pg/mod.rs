//! PostgreSQL implementation of the storage traits.
//!
//! Every public operation is bounded by the configured operation timeout; a
//! timeout surfaces as [`StorageError::Unavailable`] so callers retry.

mod ledger;
mod registry;
mod rows;
mod writer;

use std::future::Future;
use std::time::Duration;

use sqlx::PgPool;

use crate::error::StorageError;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    op_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn bounded<T, E, F>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<StorageError>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::timed_out(self.op_timeout).into()),
        }
    }
}
