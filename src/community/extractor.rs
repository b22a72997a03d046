//! Post extraction from the embedded initial-data tree.
//!
//! The tree's shape depends on the channel and changes without notice, so the
//! posts container is found by a prioritized table of locators. The first
//! locator that finds a container wins, even if that container is empty.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, trace};

use super::models::{post_permalink, ExtractionMode, ExtractionResult, Post, PostImage};
use super::time;

type ContainerLocator = fn(&Value) -> Option<&Vec<Value>>;

/// Container strategies, highest priority first.
const CONTAINER_STRATEGIES: &[(&str, ContainerLocator)] = &[
    ("community_tab", community_tab),
    ("posts_tab", posts_tab),
    ("main_content", main_content),
    ("rich_grid", rich_grid),
];

/// Paths from an item to its post renderer.
const POST_RENDERER_PATHS: &[&str] = &[
    "/backstagePostThreadRenderer/post/backstagePostRenderer",
    "/backstagePostRenderer",
];

/// Avatar sources, highest priority first.
const AVATAR_PATHS: &[&str] = &[
    "/metadata/channelMetadataRenderer/avatar/thumbnails",
    "/header/c4TabbedHeaderRenderer/avatar/thumbnails",
];

/// Extract posts from an initial-data tree using the current time.
#[must_use]
pub fn extract(data: &Value) -> ExtractionResult {
    extract_at(data, Utc::now())
}

/// Extract posts, resolving relative publish times against `now`.
#[must_use]
pub fn extract_at(data: &Value, now: DateTime<Utc>) -> ExtractionResult {
    let channel_avatar_url = extract_avatar(data);

    if let Some(tabs) = tabs(data) {
        trace!(
            tabs = %tabs.iter().map(|t| tab_title(t).unwrap_or("Unknown")).collect::<Vec<_>>().join(", "),
            "Available tabs"
        );
    }

    let Some((strategy, container)) = CONTAINER_STRATEGIES
        .iter()
        .find_map(|(name, locate)| locate(data).map(|c| (*name, c)))
    else {
        debug!("No posts container found by any strategy");
        return ExtractionResult {
            channel_avatar_url,
            ..ExtractionResult::empty(
                ExtractionMode::Structured,
                "embedded data present but no posts container recognised",
            )
        };
    };

    let posts: Vec<Post> = container
        .iter()
        .flat_map(section_items)
        .filter_map(post_renderer)
        .filter_map(|renderer| parse_post(renderer, now))
        .collect();

    debug!(
        strategy,
        sections = container.len(),
        posts = posts.len(),
        "Extracted posts"
    );

    ExtractionResult {
        success: true,
        mode: ExtractionMode::Structured,
        posts,
        diagnostic: Some(format!("posts container located via {strategy}")),
        error: None,
        channel_avatar_url,
        channel_name: None,
        source_url: None,
        tried_urls: Vec::new(),
    }
}

fn tabs(data: &Value) -> Option<&Vec<Value>> {
    data.pointer("/contents/twoColumnBrowseResultsRenderer/tabs")?
        .as_array()
}

fn tab_title(tab: &Value) -> Option<&str> {
    tab.pointer("/tabRenderer/title")?.as_str()
}

fn find_tab<'a>(data: &'a Value, title: &str) -> Option<&'a Value> {
    tabs(data)?
        .iter()
        .find(|tab| tab_title(tab) == Some(title))
}

fn array_at<'a>(value: &'a Value, path: &str) -> Option<&'a Vec<Value>> {
    value.pointer(path)?.as_array()
}

fn community_tab(data: &Value) -> Option<&Vec<Value>> {
    let tab = find_tab(data, "Community")?;
    array_at(tab, "/tabRenderer/content/sectionListRenderer/contents")
}

fn posts_tab(data: &Value) -> Option<&Vec<Value>> {
    let tab = find_tab(data, "Posts")?;
    array_at(tab, "/tabRenderer/content/sectionListRenderer/contents")
        .or_else(|| array_at(tab, "/tabRenderer/content/richGridRenderer/contents"))
}

fn main_content(data: &Value) -> Option<&Vec<Value>> {
    array_at(tabs(data)?.first()?, "/tabRenderer/content/sectionListRenderer/contents")
}

fn rich_grid(data: &Value) -> Option<&Vec<Value>> {
    array_at(tabs(data)?.first()?, "/tabRenderer/content/richGridRenderer/contents")
}

/// Items held by one container entry, in source order.
///
/// List-shaped containers hold `itemSectionRenderer` sections; grid-shaped
/// containers hold `richItemRenderer` entries directly.
fn section_items(section: &Value) -> Vec<&Value> {
    if let Some(items) = array_at(section, "/itemSectionRenderer/contents") {
        return items.iter().collect();
    }
    section
        .pointer("/richItemRenderer/content")
        .into_iter()
        .collect()
}

fn post_renderer(item: &Value) -> Option<&Value> {
    POST_RENDERER_PATHS
        .iter()
        .find_map(|path| item.pointer(path))
        .filter(|renderer| renderer.is_object())
}

/// Parse one post renderer. Items without a post id are dropped.
fn parse_post(renderer: &Value, now: DateTime<Utc>) -> Option<Post> {
    let Some(id) = renderer
        .get("postId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
    else {
        trace!("Skipping post renderer without postId");
        return None;
    };

    let author = first_run_text(renderer, "/authorText/runs");
    let content = renderer
        .pointer("/contentText/runs")
        .and_then(Value::as_array)
        .map(|runs| {
            runs.iter()
                .filter_map(|run| run.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();
    let published_time_text = first_run_text(renderer, "/publishedTimeText/runs");
    let published_at = time::normalize_at(published_time_text.as_deref(), now);

    let images = largest_thumbnail(renderer.pointer(
        "/backstageAttachment/backstageImageRenderer/image/thumbnails",
    ))
    .into_iter()
    .collect();

    Some(Post {
        id: id.to_string(),
        author,
        content,
        published_time_text,
        published_at,
        images,
        url: post_permalink(id),
    })
}

fn first_run_text(renderer: &Value, path: &str) -> Option<String> {
    renderer
        .pointer(path)?
        .get(0)?
        .get("text")?
        .as_str()
        .map(ToString::to_string)
}

/// The last thumbnail is the highest resolution one.
fn largest_thumbnail(thumbnails: Option<&Value>) -> Option<PostImage> {
    let thumb = thumbnails?.as_array()?.last()?;
    let url = thumb.get("url")?.as_str()?.to_string();
    let dimension = |key: &str| {
        thumb
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    };
    Some(PostImage {
        url,
        width: dimension("width"),
        height: dimension("height"),
    })
}

/// Channel avatar from channel metadata, else the page header.
#[must_use]
pub fn extract_avatar(data: &Value) -> Option<String> {
    AVATAR_PATHS
        .iter()
        .find_map(|path| largest_thumbnail(data.pointer(path)))
        .map(|image| image.url)
}
