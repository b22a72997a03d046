//! Periodic sweep over every watched channel.
//!
//! Each sweep fetches every distinct watched channel once, decides whether
//! its most recent post is new, and emits one notification per new post
//! addressed to all of the channel's watchers. Channels fail independently.

pub mod detector;
pub mod notifier;

pub use detector::{detect, Detection};
pub use notifier::{
    notifier_from_config, LogNotifier, NotificationEvent, Notifier, NotifiedPost, WebhookNotifier,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::channels::ChannelRegistry;
use crate::community::CommunityScraper;
use crate::config::Config;
use crate::db::{PostStore, WatchRecord};

/// Why one channel could not be checked. Never aborts a sweep.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel {0} is watched but not configured")]
    UnknownChannel(String),
    #[error("fetching posts for channel {channel_id} failed: {message}")]
    Fetch { channel_id: String, message: String },
    #[error("store {stage} failed for channel {channel_id}")]
    Store {
        channel_id: String,
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("notifying watchers of channel {channel_id} failed")]
    Notify {
        channel_id: String,
        #[source]
        source: anyhow::Error,
    },
}

/// What happened to one channel during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOutcome {
    NoPosts,
    Seen,
    /// First post stored silently under the silent baseline policy.
    Baselined,
    Notified,
}

/// Tally of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub channels: usize,
    pub notified: usize,
    pub failures: usize,
}

/// Owns the sweep dependencies. Built once at startup.
pub struct Monitor {
    config: Config,
    channels: ChannelRegistry,
    scraper: CommunityScraper,
    store: Arc<dyn PostStore>,
    notifier: Arc<dyn Notifier>,
    sweep_lock: Mutex<()>,
}

impl Monitor {
    #[must_use]
    pub fn new(
        config: Config,
        channels: ChannelRegistry,
        scraper: CommunityScraper,
        store: Arc<dyn PostStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            channels,
            scraper,
            store,
            notifier,
            sweep_lock: Mutex::new(()),
        }
    }

    /// Sweep on a fixed interval forever. The first sweep starts immediately.
    pub async fn run(&self) {
        info!(
            interval_secs = self.config.check_interval.as_secs(),
            channels = self.channels.len(),
            "Monitoring started"
        );

        let mut ticker = tokio::time::interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }

    /// Run one sweep. Returns `None` if another sweep is still in progress.
    pub async fn sweep(&self) -> Option<SweepSummary> {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            warn!("Previous sweep still in progress, skipping");
            return None;
        };

        info!("Checking for new community posts");

        let watches = match self.store.all_watches().await {
            Ok(watches) => watches,
            Err(e) => {
                error!("Failed to fetch watches: {e:#}");
                return Some(SweepSummary {
                    failures: 1,
                    ..SweepSummary::default()
                });
            }
        };

        if watches.is_empty() {
            info!("No channels being watched");
            return Some(SweepSummary::default());
        }

        let groups = group_watches_by_channel(watches);
        let mut summary = SweepSummary {
            channels: groups.len(),
            ..SweepSummary::default()
        };

        let results: Vec<_> = stream::iter(groups)
            .map(|(channel_id, watches)| async move {
                debug!(channel_id = %channel_id, watches = watches.len(), "Queued channel");
                let outcome = self.check_channel(&channel_id).await;
                (channel_id, outcome)
            })
            .buffer_unordered(self.config.channel_concurrency)
            .collect()
            .await;

        for (channel_id, outcome) in results {
            match outcome {
                Ok(ChannelOutcome::Notified) => summary.notified += 1,
                Ok(outcome) => debug!(channel_id = %channel_id, ?outcome, "Channel checked"),
                Err(e) => {
                    summary.failures += 1;
                    error!(channel_id = %channel_id, "Channel check failed: {:#}", anyhow::Error::from(e));
                }
            }
        }

        info!(
            channels = summary.channels,
            notified = summary.notified,
            failures = summary.failures,
            "Finished checking for new posts"
        );
        Some(summary)
    }

    /// Fetch, detect and notify for one channel.
    ///
    /// Watchers are looked up when a new post is found, so the event reaches
    /// whoever watches the channel at that moment.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] naming the failed stage.
    pub async fn check_channel(&self, channel_id: &str) -> Result<ChannelOutcome, ChannelError> {
        let channel = self
            .channels
            .get(channel_id)
            .ok_or_else(|| ChannelError::UnknownChannel(channel_id.to_string()))?;

        info!(
            channel_id,
            handle = %channel.handle,
            "Checking posts for {}",
            channel.display_name
        );

        let result = self.scraper.fetch_channel_posts(&channel.handle).await;
        if !result.success {
            return Err(ChannelError::Fetch {
                channel_id: channel_id.to_string(),
                message: result
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        if let Some(diagnostic) = &result.diagnostic {
            debug!(channel_id, mode = ?result.mode, diagnostic = %diagnostic, "Extraction diagnostic");
        }

        let Some(detection) =
            detect(channel_id, &result, self.store.as_ref(), self.config.baseline_policy).await?
        else {
            info!(channel_id, tried = ?result.tried_urls, "No posts found");
            return Ok(ChannelOutcome::NoPosts);
        };

        if !detection.is_new {
            return Ok(if detection.first_observation {
                ChannelOutcome::Baselined
            } else {
                ChannelOutcome::Seen
            });
        }

        let watchers = self
            .store
            .get_watchers(channel_id)
            .await
            .map_err(|source| ChannelError::Store {
                channel_id: channel_id.to_string(),
                stage: "get_watchers",
                source,
            })?;
        if watchers.is_empty() {
            debug!(channel_id, "Watches removed during sweep, nothing to notify");
            return Ok(ChannelOutcome::Seen);
        }

        let event = NotificationEvent::new(
            channel,
            result.channel_avatar_url.as_deref(),
            &detection.post,
            watchers,
        );

        self.notifier
            .notify(&event)
            .await
            .map_err(|source| ChannelError::Notify {
                channel_id: channel_id.to_string(),
                source,
            })?;

        Ok(ChannelOutcome::Notified)
    }
}

/// Group watches by monitored channel so each channel is fetched once.
#[must_use]
pub fn group_watches_by_channel(watches: Vec<WatchRecord>) -> BTreeMap<String, Vec<WatchRecord>> {
    let mut groups: BTreeMap<String, Vec<WatchRecord>> = BTreeMap::new();
    for watch in watches {
        groups.entry(watch.channel_id.clone()).or_default().push(watch);
    }
    groups
}
