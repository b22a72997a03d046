//! Notification boundary.
//!
//! Delivery to the chat platform happens elsewhere; this module only builds
//! the event and hands it to a [`Notifier`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::channels::ChannelTarget;
use crate::community::{Post, PostImage};
use crate::config::Config;
use crate::constants::{DEFAULT_AVATAR_URL, NOTIFICATION_CONTENT_LIMIT};
use crate::db::DeliveryTarget;

const ELLIPSIS: &str = "...";

/// A newly detected post, addressed to every watcher of its channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEvent {
    pub channel_id: String,
    pub channel_display_name: String,
    pub channel_url: String,
    pub channel_avatar_url: String,
    pub post: NotifiedPost,
    pub watchers: Vec<DeliveryTarget>,
}

/// Display-ready view of a post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotifiedPost {
    pub id: String,
    pub url: String,
    pub author: Option<String>,
    /// Truncated to [`NOTIFICATION_CONTENT_LIMIT`] characters.
    pub content: String,
    pub published_time_text: Option<String>,
    pub published_at: DateTime<Utc>,
    pub primary_image: Option<PostImage>,
}

impl NotificationEvent {
    /// Build an event. The configured avatar wins over the one found on the page.
    #[must_use]
    pub fn new(
        channel: &ChannelTarget,
        page_avatar_url: Option<&str>,
        post: &Post,
        watchers: Vec<DeliveryTarget>,
    ) -> Self {
        let channel_avatar_url = channel
            .avatar_url
            .as_deref()
            .or(page_avatar_url)
            .unwrap_or(DEFAULT_AVATAR_URL)
            .to_string();

        Self {
            channel_id: channel.id.clone(),
            channel_display_name: channel.display_name.clone(),
            channel_url: channel.url.clone(),
            channel_avatar_url,
            post: NotifiedPost {
                id: post.id.clone(),
                url: post.url.clone(),
                author: post.author.clone(),
                content: truncate_content(&post.content, NOTIFICATION_CONTENT_LIMIT),
                published_time_text: post.published_time_text.clone(),
                published_at: post.published_at,
                primary_image: post.images.first().cloned(),
            },
            watchers,
        }
    }
}

/// Cut `content` to at most `limit` characters, ending in "..." when cut.
#[must_use]
pub fn truncate_content(content: &str, limit: usize) -> String {
    if content.chars().count() <= limit {
        return content.to_string();
    }
    let keep = limit.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = content.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// Receives notification events for fan-out.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the event could not be handed off.
    async fn notify(&self, event: &NotificationEvent) -> Result<()>;
}

/// Writes events to the log as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<()> {
        let payload = serde_json::to_string(event).context("Failed to serialize event")?;
        info!(
            channel_id = %event.channel_id,
            post_id = %event.post.id,
            watchers = event.watchers.len(),
            event = %payload,
            "New post notification"
        );
        Ok(())
    }
}

/// POSTs events as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .context("Failed to send webhook")?;

        if !response.status().is_success() {
            bail!("Webhook returned status {}", response.status());
        }

        info!(
            channel_id = %event.channel_id,
            post_id = %event.post.id,
            watchers = event.watchers.len(),
            "Delivered notification to webhook"
        );
        Ok(())
    }
}

/// The webhook notifier if a webhook is configured, else the log notifier.
///
/// # Errors
///
/// Returns an error if the webhook client cannot be constructed.
pub fn notifier_from_config(config: &Config) -> Result<Arc<dyn Notifier>> {
    match &config.notify_webhook_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url.clone(), config.fetch_timeout)?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
