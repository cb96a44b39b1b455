//! Collector agent records kept up to date by heartbeats.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Caller-reported agent status. The registry never derives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Active,
    Idle,
    Busy,
    Error,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Active => "active",
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Error => "error",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(WorkerStatus::Active),
            "idle" => Ok(WorkerStatus::Idle),
            "busy" => Ok(WorkerStatus::Busy),
            "error" => Ok(WorkerStatus::Error),
            other => Err(ValidationError::UnknownVariant {
                kind: "worker status",
                value: other.to_string(),
            }),
        }
    }
}

/// A single heartbeat as reported by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub status: WorkerStatus,
    #[serde(default)]
    pub current_job: Option<Uuid>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl Heartbeat {
    pub fn new(status: WorkerStatus) -> Self {
        Self {
            status,
            current_job: None,
            metadata: None,
        }
    }

    pub fn with_job(mut self, job_id: Uuid) -> Self {
        self.current_job = Some(job_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub current_job: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub jobs_completed: i64,
    pub jobs_failed: i64,
    pub items_processed: i64,
    pub started_at: DateTime<Utc>,
}

impl WorkerRecord {
    /// Record created by a worker's first heartbeat.
    pub fn first_seen(worker_id: impl Into<String>, heartbeat: Heartbeat, now: DateTime<Utc>) -> Self {
        Self {
            worker_id: worker_id.into(),
            status: heartbeat.status,
            last_heartbeat: now,
            current_job: heartbeat.current_job,
            metadata: heartbeat.metadata,
            jobs_completed: 0,
            jobs_failed: 0,
            items_processed: 0,
            started_at: now,
        }
    }

    /// Apply a subsequent heartbeat. Counters are untouched.
    pub fn apply_heartbeat(&mut self, heartbeat: Heartbeat, now: DateTime<Utc>) {
        self.status = heartbeat.status;
        self.current_job = heartbeat.current_job;
        self.metadata = heartbeat.metadata;
        self.last_heartbeat = now;
    }

    pub fn stats(&self, now: DateTime<Utc>) -> WorkerStats {
        WorkerStats {
            jobs_completed: self.jobs_completed,
            jobs_failed: self.jobs_failed,
            items_processed: self.items_processed,
            uptime_seconds: (now - self.started_at).num_seconds().max(0),
        }
    }
}

/// Cumulative counters. `Default` is the "never seen" value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub jobs_completed: i64,
    pub jobs_failed: i64,
    pub items_processed: i64,
    pub uptime_seconds: i64,
}
