//! Community page scraping: candidate URLs, fetching, embedded-data location
//! and post extraction.

pub mod candidates;
pub mod extractor;
pub mod fetcher;
pub mod initial_data;
mod models;
pub mod time;

pub use candidates::{candidate_urls, main_page_url};
pub use extractor::{extract, extract_avatar};
pub use fetcher::{FetchError, FetchOutcome, PageFetcher, RawPage};
pub use initial_data::{heuristic_extract, locate};
pub use models::*;

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::Config;

/// Fetches a channel's community page and turns it into posts.
#[derive(Debug, Clone)]
pub struct CommunityScraper {
    fetcher: PageFetcher,
    base_url: String,
    rate_limit_backoff: Duration,
}

impl CommunityScraper {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            fetcher: PageFetcher::new(config)?,
            base_url: config.base_url.clone(),
            rate_limit_backoff: config.rate_limit_backoff,
        })
    }

    /// Fetch and extract the posts of one channel.
    ///
    /// Candidates are tried in priority order. A page with embedded data but
    /// no posts resumes the cascade at the next candidate; a page without
    /// embedded data ends it with a heuristic result. When nothing yields
    /// posts (or the site rate limits us) the channel's main page is fetched
    /// to recover its identity. Never panics or returns an error; failures
    /// are reported in the result.
    pub async fn fetch_channel_posts(&self, handle: &str) -> ExtractionResult {
        let candidates = candidate_urls(&self.base_url, handle);
        let mut tried_urls = Vec::with_capacity(candidates.len());
        let mut last_error: Option<String> = None;
        let mut channel_avatar_url = None;
        let mut rate_limited = false;
        let mut start = 0;

        while start < candidates.len() {
            let outcome = self.fetcher.fetch(&candidates[start..]).await;
            rate_limited = outcome.rate_limited();
            if let Some(e) = &outcome.last_error {
                last_error = Some(e.to_string());
            }
            tried_urls.extend(outcome.tried_urls);

            let (Some(page), Some(index)) = (outcome.page, outcome.accepted_index) else {
                break;
            };
            start += index + 1;

            let Some(data) = locate(&page) else {
                info!(url = %page.url, "No embedded data in page, using markup heuristic");
                return ExtractionResult {
                    tried_urls,
                    ..heuristic_extract(&page)
                };
            };

            let result = extract(&data);
            if !result.posts.is_empty() {
                info!(url = %page.url, posts = result.posts.len(), "Found posts");
                return ExtractionResult {
                    source_url: Some(page.url),
                    tried_urls,
                    ..result
                };
            }

            debug!(url = %page.url, "Embedded data has no posts, trying next candidate");
            channel_avatar_url = channel_avatar_url.or(result.channel_avatar_url);
            last_error = Some(format!("{} yielded no posts", page.url));
        }

        if rate_limited && !self.rate_limit_backoff.is_zero() {
            debug!(backoff = ?self.rate_limit_backoff, "Backing off before fallback");
            tokio::time::sleep(self.rate_limit_backoff).await;
        }

        let mut result = self.degraded_fallback(handle, last_error).await;
        result.tried_urls = tried_urls;
        result.channel_avatar_url = result.channel_avatar_url.or(channel_avatar_url);
        result
    }

    /// Recover channel identity from the main page after the cascade failed.
    async fn degraded_fallback(&self, handle: &str, last_error: Option<String>) -> ExtractionResult {
        let url = main_page_url(&self.base_url, handle);
        info!(handle, url = %url, "All candidates failed, using main page fallback");

        match self.fetcher.fetch_channel_name(&url).await {
            Ok(name) => {
                let mut diagnostic =
                    "fallback used, limited data available: no candidate page yielded posts"
                        .to_string();
                if let Some(e) = last_error {
                    diagnostic.push_str(" (last error: ");
                    diagnostic.push_str(&e);
                    diagnostic.push(')');
                }
                ExtractionResult {
                    channel_name: Some(name),
                    source_url: Some(url),
                    ..ExtractionResult::empty(ExtractionMode::Degraded, diagnostic)
                }
            }
            Err(e) => {
                warn!(handle, error = %e, "Main page fallback failed");
                ExtractionResult {
                    diagnostic: last_error,
                    ..ExtractionResult::failed(ExtractionMode::Degraded, e.to_string())
                }
            }
        }
    }
}
