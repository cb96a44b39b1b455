use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::item::PartitionKey;

/// Whether jobs for a partition may be handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStatus {
    Active,
    Paused,
    Inactive,
}

impl PartitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionStatus::Active => "active",
            PartitionStatus::Paused => "paused",
            PartitionStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for PartitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartitionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PartitionStatus::Active),
            "paused" => Ok(PartitionStatus::Paused),
            "inactive" => Ok(PartitionStatus::Inactive),
            other => Err(ValidationError::UnknownVariant {
                kind: "partition status",
                value: other.to_string(),
            }),
        }
    }
}

/// Per-partition aggregate maintained by the storage writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionRecord {
    pub partition_key: PartitionKey,
    /// Human-readable channel handle, if known.
    pub handle: Option<String>,
    pub status: PartitionStatus,
    pub last_ingested_at: Option<DateTime<Utc>>,
    /// Maximum item timestamp seen for this partition.
    pub last_item_at: Option<DateTime<Utc>>,
}

impl PartitionRecord {
    pub fn new(partition_key: PartitionKey, handle: Option<String>, status: PartitionStatus) -> Self {
        Self {
            partition_key,
            handle,
            status,
            last_ingested_at: None,
            last_item_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PartitionStatus::Active
    }

    /// Fold a successful write into the aggregate.
    pub fn record_ingest(&mut self, now: DateTime<Utc>, batch_max: Option<DateTime<Utc>>) {
        self.last_ingested_at = Some(now);
        self.last_item_at = match (self.last_item_at, batch_max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Content summary for one partition, computed from stored items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub partition_key: PartitionKey,
    pub total_items: i64,
    pub avg_views: Option<f64>,
    pub first_item_at: Option<DateTime<Utc>>,
    pub last_item_at: Option<DateTime<Utc>>,
}

impl PartitionStats {
    /// Fold stored items into a summary. Empty input yields zero items and no dates.
    pub fn from_items<'a>(
        partition_key: PartitionKey,
        items: impl IntoIterator<Item = &'a crate::item::Item>,
    ) -> Self {
        let mut stats = PartitionStats {
            partition_key,
            ..Default::default()
        };
        let mut view_sum = 0i64;
        for item in items {
            stats.total_items += 1;
            view_sum += item.views;
            stats.first_item_at = Some(match stats.first_item_at {
                Some(t) => t.min(item.timestamp),
                None => item.timestamp,
            });
            stats.last_item_at = Some(match stats.last_item_at {
                Some(t) => t.max(item.timestamp),
                None => item.timestamp,
            });
        }
        if stats.total_items > 0 {
            stats.avg_views = Some(view_sum as f64 / stats.total_items as f64);
        }
        stats
    }
}
