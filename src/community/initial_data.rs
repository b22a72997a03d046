//! Locate the embedded render-state blob (`ytInitialData`) in a page.
//!
//! The blob is a JSON object assigned to a global in one of the page's
//! scripts. Several assignment spellings are in the wild; they are tried in
//! order and the first one that parses wins. Parsing consumes exactly one JSON
//! value starting at the opening brace, so whatever follows the assignment in
//! the script is ignored.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, trace};

use super::fetcher::RawPage;
use super::models::{ExtractionMode, ExtractionResult};

static SCRIPT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("script").unwrap());

static ASSIGNMENT_FORMS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"var\s+ytInitialData\s*=\s*\{").unwrap(),
        Regex::new(r#"window\[\s*["']ytInitialData["']\s*\]\s*=\s*\{"#).unwrap(),
        Regex::new(r"ytInitialData\s*=\s*\{").unwrap(),
    ]
});

/// Markup that looks like a rendered post.
const POST_SHAPED_SELECTOR: &str =
    "[data-post-id], [data-content-id], .post-container, .community-post";

/// Find and parse the embedded initial-data object, or `None` if absent.
#[must_use]
pub fn locate(page: &RawPage) -> Option<Value> {
    locate_in_document(&page.document())
}

fn locate_in_document(document: &Html) -> Option<Value> {
    for (index, script) in document.select(&SCRIPT_SELECTOR).enumerate() {
        let content: String = script.text().collect();
        if !content.contains("ytInitialData") {
            continue;
        }
        trace!(script = index, "Script mentions ytInitialData");

        if let Some(data) = parse_assignment(&content) {
            debug!(script = index, "Parsed embedded initial data");
            return Some(data);
        }
    }
    None
}

/// Try each assignment form against one script body.
fn parse_assignment(script: &str) -> Option<Value> {
    for form in ASSIGNMENT_FORMS.iter() {
        for found in form.find_iter(script) {
            // The match ends just past the opening brace.
            let start = found.end() - 1;
            match parse_leading_object(&script[start..]) {
                Ok(value) => return Some(value),
                Err(e) => trace!(form = form.as_str(), error = %e, "Assignment did not parse"),
            }
        }
    }
    None
}

fn parse_leading_object(text: &str) -> Result<Value, serde_json::Error> {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) if value.is_object() => Ok(value),
        Some(Ok(_)) | None => Err(serde::de::Error::custom("not a JSON object")),
        Some(Err(e)) => Err(e),
    }
}

/// Markup-only pass used when a page carries no embedded data.
///
/// Only reports what it sees; rendered markup carries no reliable ids or
/// timestamps, so no posts are produced from it.
#[must_use]
pub fn heuristic_extract(page: &RawPage) -> ExtractionResult {
    let document = page.document();
    let post_shaped = Selector::parse(POST_SHAPED_SELECTOR)
        .map(|selector| document.select(&selector).count())
        .unwrap_or(0);

    let title = page.title.to_lowercase();
    let looks_like_posts_page = title.contains("community") || title.contains("posts");

    debug!(
        url = %page.url,
        post_shaped,
        looks_like_posts_page,
        "No embedded data, inspected markup"
    );

    let mut diagnostic = format!(
        "no embedded data found; markup inspected ({post_shaped} post-shaped elements), no posts extracted"
    );
    if !looks_like_posts_page {
        diagnostic.push_str(&format!(
            "; page title \"{}\" does not look like a community page",
            page.title
        ));
    }

    ExtractionResult {
        source_url: Some(page.url.clone()),
        ..ExtractionResult::empty(ExtractionMode::Heuristic, diagnostic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> RawPage {
        RawPage::new("https://www.youtube.com/@chan/community", 200, body.to_string())
    }

    #[test]
    fn test_locates_var_assignment() {
        let body = r#"<html><head><title>Chan</title></head><body>
            <script>var foo = 1;</script>
            <script>var ytInitialData = {"a": {"b": [1, 2, 3]}, "s": "text with }; inside"};var other = {};</script>
        </body></html>"#;

        let data = locate(&page(body)).unwrap();
        assert_eq!(data["a"]["b"][2], 3);
        assert_eq!(data["s"], "text with }; inside");
    }

    #[test]
    fn test_locates_window_assignment() {
        let body = r#"<title>Chan</title><script>window["ytInitialData"] = {"ok": true};</script>"#;
        assert_eq!(locate(&page(body)).unwrap()["ok"], true);
    }

    #[test]
    fn test_locates_bare_assignment() {
        let body = r#"<title>Chan</title><script>ytInitialData = {"ok": 1};</script>"#;
        assert_eq!(locate(&page(body)).unwrap()["ok"], 1);
    }

    #[test]
    fn test_falls_through_to_later_form() {
        // The first form matches but is truncated; the window form parses.
        let body = r#"<title>Chan</title>
            <script>var ytInitialData = {"broken": </script>
            <script>window['ytInitialData'] = {"ok": "second"};</script>"#;
        assert_eq!(locate(&page(body)).unwrap()["ok"], "second");
    }

    #[test]
    fn test_missing_data_returns_none() {
        let body = "<title>Chan</title><script>var ytcfg = {};</script>";
        assert!(locate(&page(body)).is_none());

        let body = "<title>Chan</title><script>var ytInitialData = null;</script>";
        assert!(locate(&page(body)).is_none());
    }

    #[test]
    fn test_heuristic_is_successful_and_empty() {
        let body = r#"<title>Chan - Community</title><div data-post-id="x">hi</div><div class="community-post"></div>"#;
        let result = heuristic_extract(&page(body));

        assert!(result.success);
        assert!(result.posts.is_empty());
        assert_eq!(result.mode, ExtractionMode::Heuristic);
        let diagnostic = result.diagnostic.unwrap();
        assert!(diagnostic.contains("2 post-shaped elements"));
        assert!(!diagnostic.contains("does not look like"));
    }

    #[test]
    fn test_heuristic_flags_unexpected_title() {
        let result = heuristic_extract(&page("<title>Home</title>"));
        assert!(result.diagnostic.unwrap().contains("does not look like a community page"));
    }
}
