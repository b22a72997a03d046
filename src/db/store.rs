use anyhow::Result;
use async_trait::async_trait;

use super::models::{DeliveryTarget, NewChannelPost, StoredPost, UpsertOutcome, WatchRecord};
use super::{queries, Database};

/// Persistence contract used by change detection and the sweep.
///
/// `upsert_post` must be atomic per (channel, post id) and must report a duplicate
/// as [`UpsertOutcome::AlreadyExists`], erroring only on real failures.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn get_latest_post(&self, channel_id: &str) -> Result<Option<StoredPost>>;

    async fn upsert_post(&self, post: &NewChannelPost) -> Result<UpsertOutcome>;

    async fn get_watchers(&self, channel_id: &str) -> Result<Vec<DeliveryTarget>>;

    async fn all_watches(&self) -> Result<Vec<WatchRecord>>;
}

#[async_trait]
impl PostStore for Database {
    async fn get_latest_post(&self, channel_id: &str) -> Result<Option<StoredPost>> {
        queries::get_latest_post(self.pool(), channel_id).await
    }

    async fn upsert_post(&self, post: &NewChannelPost) -> Result<UpsertOutcome> {
        queries::upsert_post(self.pool(), post).await
    }

    async fn get_watchers(&self, channel_id: &str) -> Result<Vec<DeliveryTarget>> {
        queries::get_watchers(self.pool(), channel_id).await
    }

    async fn all_watches(&self) -> Result<Vec<WatchRecord>> {
        queries::get_all_watches(self.pool()).await
    }
}
