use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::POST_PERMALINK_PREFIX;

/// An image attached to a community post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostImage {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A community post extracted from a channel page.
///
/// Within a channel the id is the only identity key. The same post can be
/// re-rendered with slightly different content between fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author: Option<String>,
    pub content: String,
    /// Relative label as shown on the page, e.g. "3 days ago".
    pub published_time_text: Option<String>,
    /// Approximation derived from `published_time_text`.
    pub published_at: DateTime<Utc>,
    pub images: Vec<PostImage>,
    pub url: String,
}

/// Canonical permalink for a post id.
#[must_use]
pub fn post_permalink(post_id: &str) -> String {
    format!("{POST_PERMALINK_PREFIX}{post_id}")
}

/// How an extraction result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Parsed from the embedded initial-data blob.
    Structured,
    /// No embedded data; only markup was inspected.
    Heuristic,
    /// Every candidate failed; only the channel main page was consulted.
    Degraded,
}

/// Outcome of extracting posts for one channel.
///
/// `success` with no posts is a valid result and distinct from a failure.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub success: bool,
    pub mode: ExtractionMode,
    /// Most recent first.
    pub posts: Vec<Post>,
    pub diagnostic: Option<String>,
    pub error: Option<String>,
    pub channel_avatar_url: Option<String>,
    /// Channel name recovered from the main page by the degraded path.
    pub channel_name: Option<String>,
    /// The URL whose page produced this result.
    pub source_url: Option<String>,
    pub tried_urls: Vec<String>,
}

impl ExtractionResult {
    #[must_use]
    pub fn empty(mode: ExtractionMode, diagnostic: impl Into<String>) -> Self {
        Self {
            success: true,
            mode,
            posts: Vec::new(),
            diagnostic: Some(diagnostic.into()),
            error: None,
            channel_avatar_url: None,
            channel_name: None,
            source_url: None,
            tried_urls: Vec::new(),
        }
    }

    #[must_use]
    pub fn failed(mode: ExtractionMode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            diagnostic: None,
            ..Self::empty(mode, String::new())
        }
    }

    /// The most recent post, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&Post> {
        self.posts.first()
    }
}
