//! HTTP endpoints under `/api/collector`, plus the root health probe.
//!
//! Handlers are thin: extract, call the [`crate::service::Collector`], wrap the
//! result. Shared response types live here.

mod health;
mod ingest;
mod jobs;
mod partitions;

use serde::Serialize;

// ── Shared types ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Plain acknowledgement for state-changing calls.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

// ── Re-exports ───────────────────────────────────────────────────

pub use health::{health, stats};
pub use ingest::{heartbeat, submit_messages};
pub use jobs::{complete_job, create_job, fail_job, list_jobs, start_job};
pub use partitions::{partition_stats, upsert_partition};
