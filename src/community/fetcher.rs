//! Candidate cascade: fetch and validate channel pages.

use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::StatusCode;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::BROWSER_USER_AGENT;

static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static CHANNEL_NAME_SELECTORS: Lazy<[Selector; 2]> = Lazy::new(|| {
    [
        Selector::parse(r#"meta[property="og:title"]"#).unwrap(),
        Selector::parse(r#"meta[name="title"]"#).unwrap(),
    ]
});

/// Body markers of a page that exists but has no channel behind it.
const UNAVAILABLE_MARKERS: &[&str] = &["This page isn't available", "Channel not found"];

/// Title fragments of an error page.
const MISSING_TITLE_MARKERS: &[&str] = &["404", "Not Found"];

/// Why a single candidate URL was not accepted.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url} is rate limited (HTTP 429)")]
    RateLimited { url: String },
    #[error("{url} rejected: {reason}")]
    Validation { url: String, reason: String },
}

impl FetchError {
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Network { url, .. }
            | Self::Status { url, .. }
            | Self::RateLimited { url }
            | Self::Validation { url, .. } => url,
        }
    }
}

/// A fetched and validated page. Lives for one fetch attempt.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub url: String,
    pub status: u16,
    pub body: String,
    /// Trimmed `<title>` text, empty if absent.
    pub title: String,
}

impl RawPage {
    #[must_use]
    pub fn new(url: impl Into<String>, status: u16, body: String) -> Self {
        let title = page_title(&Html::parse_document(&body));
        Self {
            url: url.into(),
            status,
            body,
            title,
        }
    }

    /// Parse the body into a queryable document.
    #[must_use]
    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }
}

/// Result of walking the candidate list.
#[derive(Debug)]
pub struct FetchOutcome {
    pub page: Option<RawPage>,
    /// Index into the candidate slice of the accepted page.
    pub accepted_index: Option<usize>,
    /// Every URL requested, in order.
    pub tried_urls: Vec<String>,
    pub last_error: Option<FetchError>,
}

impl FetchOutcome {
    #[must_use]
    pub fn success(&self) -> bool {
        self.page.is_some()
    }

    /// The cascade stopped early on a 429.
    #[must_use]
    pub fn rate_limited(&self) -> bool {
        self.last_error
            .as_ref()
            .is_some_and(FetchError::is_rate_limited)
    }
}

/// HTTP client wrapper that knows how to request and validate channel pages.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    fallback_timeout: Duration,
}

impl PageFetcher {
    /// Build a fetcher with browser-like default headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(browser_headers())
            .timeout(config.fetch_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            fallback_timeout: config.fallback_timeout,
        })
    }

    /// Try each candidate in order and return the first page that validates.
    ///
    /// A URL is never requested twice. A 429 stops the cascade immediately.
    pub async fn fetch(&self, candidates: &[String]) -> FetchOutcome {
        let mut tried_urls = Vec::with_capacity(candidates.len());
        let mut last_error = None;

        for (index, url) in candidates.iter().enumerate() {
            tried_urls.push(url.clone());
            debug!(url = %url, "Trying candidate URL");

            match self.fetch_page(url).await {
                Ok(page) => {
                    info!(url = %url, title = %page.title, "Accepted channel page");
                    return FetchOutcome {
                        page: Some(page),
                        accepted_index: Some(index),
                        tried_urls,
                        last_error,
                    };
                }
                Err(e) if e.is_rate_limited() => {
                    warn!(url = %url, "Rate limited, abandoning candidate cascade");
                    last_error = Some(e);
                    break;
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "Candidate rejected");
                    last_error = Some(e);
                }
            }
        }

        FetchOutcome {
            page: None,
            accepted_index: None,
            tried_urls,
            last_error,
        }
    }

    /// Request a single URL and validate the response.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] describing why the page was not accepted.
    pub async fn fetch_page(&self, url: &str) -> Result<RawPage, FetchError> {
        let (status, body) = self.get(url, None).await?;
        let page = RawPage::new(url, status, body);

        validate_page(&page).map_err(|reason| FetchError::Validation {
            url: url.to_string(),
            reason,
        })?;

        Ok(page)
    }

    /// Fetch a channel's main page and recover its display name.
    ///
    /// No title/marker validation is applied; any successful response is used.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if the request fails or returns non-2xx.
    pub async fn fetch_channel_name(&self, url: &str) -> Result<String, FetchError> {
        let (_, body) = self.get(url, Some(self.fallback_timeout)).await?;
        Ok(channel_name(&Html::parse_document(&body)))
    }

    async fn get(&self, url: &str, timeout: Option<Duration>) -> Result<(u16, String), FetchError> {
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| FetchError::Network {
            url: url.to_string(),
            source: e,
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Network {
            url: url.to_string(),
            source: e,
        })?;

        Ok((status.as_u16(), body))
    }
}

/// Check that a page is a real channel page rather than an error page.
///
/// # Errors
///
/// Returns the rejection reason.
pub fn validate_page(page: &RawPage) -> Result<(), String> {
    if page.title.is_empty() {
        return Err("empty page title".to_string());
    }
    if let Some(marker) = MISSING_TITLE_MARKERS
        .iter()
        .find(|m| page.title.contains(*m))
    {
        return Err(format!("title indicates missing page ({marker}): {}", page.title));
    }
    if let Some(marker) = UNAVAILABLE_MARKERS.iter().find(|m| page.body.contains(*m)) {
        return Err(format!("page reports unavailable channel: {marker}"));
    }
    Ok(())
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.5"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers
}

fn page_title(document: &Html) -> String {
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn channel_name(document: &Html) -> String {
    CHANNEL_NAME_SELECTORS
        .iter()
        .filter_map(|selector| document.select(selector).next())
        .filter_map(|meta| meta.value().attr("content"))
        .map(str::trim)
        .find(|name| !name.is_empty())
        .unwrap_or("Unknown Channel")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> RawPage {
        RawPage::new("https://www.youtube.com/@chan/community", 200, body.to_string())
    }

    #[test]
    fn test_accepts_normal_page() {
        let page = page("<html><head><title>Chan - YouTube</title></head><body></body></html>");
        assert_eq!(page.title, "Chan - YouTube");
        assert!(validate_page(&page).is_ok());
    }

    #[test]
    fn test_rejects_missing_title() {
        let page = page("<html><head></head><body>hello</body></html>");
        assert!(validate_page(&page).unwrap_err().contains("empty page title"));
    }

    #[test]
    fn test_rejects_not_found_title() {
        assert!(validate_page(&page("<title>404 Not Found</title>")).is_err());
        assert!(validate_page(&page("<title>Page Not Found</title>")).is_err());
    }

    #[test]
    fn test_rejects_unavailable_markers() {
        let body = "<title>YouTube</title><div>This page isn't available. Sorry about that.</div>";
        assert!(validate_page(&page(body)).unwrap_err().contains("unavailable"));

        let body = "<title>YouTube</title><p>Channel not found</p>";
        assert!(validate_page(&page(body)).is_err());
    }

    #[test]
    fn test_channel_name_prefers_og_title() {
        let doc = Html::parse_document(
            r#"<head><meta name="title" content="Meta Name"><meta property="og:title" content="OG Name"></head>"#,
        );
        assert_eq!(channel_name(&doc), "OG Name");

        let doc = Html::parse_document(r#"<head><meta name="title" content="Meta Name"></head>"#);
        assert_eq!(channel_name(&doc), "Meta Name");

        let doc = Html::parse_document("<head></head>");
        assert_eq!(channel_name(&doc), "Unknown Channel");
    }
}
