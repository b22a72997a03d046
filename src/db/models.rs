use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted association between a monitored channel and a delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WatchRecord {
    pub id: i64,
    pub guild_id: String,
    pub delivery_channel_id: String,
    pub channel_id: String,
    pub created_at: String,
}

/// Where a notification should be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryTarget {
    pub guild_id: String,
    pub delivery_channel_id: String,
}

/// A watch to be created.
#[derive(Debug, Clone)]
pub struct NewWatch {
    pub guild_id: String,
    pub delivery_channel_id: String,
    pub channel_id: String,
}

/// The most recently observed post of a channel, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredPost {
    pub post_id: String,
    pub channel_id: String,
    pub content: String,
    pub content_hash: String,
    pub published_at: DateTime<Utc>,
    pub observed_seq: i64,
    pub first_seen_at: String,
    pub last_seen_at: String,
}

/// A post to be upserted.
#[derive(Debug, Clone)]
pub struct NewChannelPost {
    pub channel_id: String,
    pub post_id: String,
    pub content: String,
    pub published_at: DateTime<Utc>,
}

/// Result of an upsert keyed by channel and post id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Stored,
    /// The post id was already present. Not an error.
    AlreadyExists { content_changed: bool },
}

impl UpsertOutcome {
    #[must_use]
    pub fn already_existed(self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Result of adding a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddWatchOutcome {
    Added(WatchRecord),
    AlreadyWatching,
}
