//! Normalized content records carried inside batch envelopes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Channel identifier items are grouped and flushed under.
pub type PartitionKey = i64;

/// Media attached to an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// e.g. "photo", "video", "document".
    pub kind: String,
    pub url: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Author of an item, when the source exposes one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub id: Option<i64>,
    pub name: Option<String>,
}

/// A single content record. `(partition_key, id)` is its natural key.
///
/// Text, author, media and the original timestamp are immutable once stored;
/// the counters, reactions and edit timestamp are observational and get
/// refreshed on re-delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(alias = "message_id")]
    pub id: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(alias = "date")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub views: i64,
    #[serde(default)]
    pub forwards: i64,
    #[serde(default)]
    pub replies: i64,
    #[serde(default)]
    pub reactions: Option<BTreeMap<String, i64>>,
    #[serde(default, alias = "edit_date")]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub media: Option<MediaDescriptor>,
    #[serde(default)]
    pub author: Option<AuthorRef>,
    #[serde(default)]
    pub is_forwarded: bool,
    #[serde(default)]
    pub forward_from: Option<serde_json::Value>,
    #[serde(default, alias = "reply_to_msg_id")]
    pub reply_to: Option<i64>,
    /// Opaque source payload, stored verbatim and never interpreted.
    #[serde(default, alias = "raw_data")]
    pub raw: Option<serde_json::Value>,
}

impl Item {
    /// Minimal item with only the required fields set.
    pub fn new(id: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            text: None,
            timestamp,
            views: 0,
            forwards: 0,
            replies: 0,
            reactions: None,
            edited_at: None,
            media: None,
            author: None,
            is_forwarded: false,
            forward_from: None,
            reply_to: None,
            raw: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_counters(mut self, views: i64, forwards: i64, replies: i64) -> Self {
        self.views = views;
        self.forwards = forwards;
        self.replies = replies;
        self
    }

    pub fn natural_key(&self, partition: PartitionKey) -> (PartitionKey, i64) {
        (partition, self.id)
    }

    /// Basic shape check; deeper validation belongs to the transport layer.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("views", self.views),
            ("forwards", self.forwards),
            ("replies", self.replies),
        ] {
            if value < 0 {
                return Err(ValidationError::NegativeCounter { id: self.id, field });
            }
        }
        Ok(())
    }

    /// Overwrite the observational fields with `newer`'s values, leaving the
    /// immutable ones untouched.
    pub fn refresh_from(&mut self, newer: &Item) {
        self.views = newer.views;
        self.forwards = newer.forwards;
        self.replies = newer.replies;
        self.reactions = newer.reactions.clone();
        self.edited_at = newer.edited_at;
    }
}
