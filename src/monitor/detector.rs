//! New-post decision for one channel.

use tracing::{debug, info};

use super::ChannelError;
use crate::community::{ExtractionResult, Post};
use crate::config::BaselinePolicy;
use crate::db::{NewChannelPost, PostStore, UpsertOutcome};

/// Decision about a channel's most recent post.
#[derive(Debug, Clone)]
pub struct Detection {
    pub is_new: bool,
    /// No post had been stored for the channel before this one.
    pub first_observation: bool,
    pub post: Post,
    pub upsert: UpsertOutcome,
}

/// Classify the most recent post of `result` and record it in the store.
///
/// Returns `None` when the result has no posts. A post is new when nothing
/// was stored for the channel yet (unless the baseline policy is silent) or
/// when its id differs from the stored one. The post is upserted either way.
///
/// # Errors
///
/// Returns [`ChannelError::Store`] if reading or writing the store fails.
pub async fn detect(
    channel_id: &str,
    result: &ExtractionResult,
    store: &dyn PostStore,
    baseline: BaselinePolicy,
) -> Result<Option<Detection>, ChannelError> {
    let Some(latest) = result.latest() else {
        return Ok(None);
    };

    let stored = store
        .get_latest_post(channel_id)
        .await
        .map_err(|source| ChannelError::Store {
            channel_id: channel_id.to_string(),
            stage: "get_latest_post",
            source,
        })?;

    let first_observation = stored.is_none();
    let is_new = match &stored {
        None => {
            info!(channel_id, post_id = %latest.id, "First observation of channel");
            baseline == BaselinePolicy::Notify
        }
        Some(previous) if previous.post_id != latest.id => {
            info!(
                channel_id,
                post_id = %latest.id,
                previous_post_id = %previous.post_id,
                "New post detected"
            );
            true
        }
        Some(_) => false,
    };

    let upsert = store
        .upsert_post(&NewChannelPost {
            channel_id: channel_id.to_string(),
            post_id: latest.id.clone(),
            content: latest.content.clone(),
            published_at: latest.published_at,
        })
        .await
        .map_err(|source| ChannelError::Store {
            channel_id: channel_id.to_string(),
            stage: "upsert_post",
            source,
        })?;

    match upsert {
        UpsertOutcome::Stored => debug!(channel_id, post_id = %latest.id, "Stored post"),
        UpsertOutcome::AlreadyExists { content_changed } => debug!(
            channel_id,
            post_id = %latest.id,
            content_changed,
            "Post already stored"
        ),
    }

    Ok(Some(Detection {
        is_new,
        first_observation,
        post: latest.clone(),
        upsert,
    }))
}
