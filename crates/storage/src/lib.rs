//! Persistence for the collector: the idempotent item writer, the job ledger
//! and the worker registry.
//!
//! Every concern is a trait with two implementations: [`PgStore`] over
//! PostgreSQL (production) and [`MemoryStore`] (tests and dev mode). Both share
//! the job state machine defined on [`collector_core::Job`].

pub mod db;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod pg;
pub mod registry;
pub mod writer;

pub use db::init_pg_pool;
pub use error::{LedgerError, StorageError};
pub use ledger::{ClaimOutcome, JobLedger};
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use registry::{PartitionCatalog, WorkerRegistry};
pub use writer::StorageWriter;
