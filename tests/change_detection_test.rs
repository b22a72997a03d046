//! Integration tests for new-post detection and the sweep.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use community_post_watcher::channels::{ChannelRegistry, ChannelTarget};
use community_post_watcher::community::{CommunityScraper, ExtractionMode, ExtractionResult, Post};
use community_post_watcher::config::{BaselinePolicy, Config};
use community_post_watcher::db::{
    add_watch, get_latest_post, Database, NewWatch, PostStore, UpsertOutcome,
};
use community_post_watcher::monitor::{detect, Monitor, NotificationEvent, Notifier};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

fn post(id: &str) -> Post {
    Post {
        id: id.to_string(),
        author: Some("Lofi Girl".to_string()),
        content: format!("content of {id}"),
        published_time_text: Some("1 hour ago".to_string()),
        published_at: Utc::now(),
        images: Vec::new(),
        url: format!("https://www.youtube.com/post/{id}"),
    }
}

fn result_with(ids: &[&str]) -> ExtractionResult {
    ExtractionResult {
        posts: ids.iter().map(|id| post(id)).collect(),
        ..ExtractionResult::empty(ExtractionMode::Structured, "test")
    }
}

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

fn channel(id: &str, handle: &str) -> ChannelTarget {
    ChannelTarget {
        id: id.to_string(),
        handle: handle.to_string(),
        display_name: format!("{id} display"),
        url: format!("https://www.youtube.com/{handle}"),
        avatar_url: None,
    }
}

fn community_page(ids: &[&str]) -> String {
    let items: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({"backstagePostThreadRenderer": {"post": {"backstagePostRenderer": {
                "postId": id,
                "contentText": {"runs": [{"text": format!("post {id}")}]},
                "publishedTimeText": {"runs": [{"text": "3 hours ago"}]}
            }}}})
        })
        .collect();
    let data = json!({
        "metadata": {"channelMetadataRenderer": {"avatar": {"thumbnails": [{"url": "https://yt3/page-avatar.jpg"}]}}},
        "contents": {"twoColumnBrowseResultsRenderer": {"tabs": [
            {"tabRenderer": {
                "title": "Community",
                "content": {"sectionListRenderer": {"contents": [
                    {"itemSectionRenderer": {"contents": items}}
                ]}}
            }}
        ]}}
    });
    format!("<html><head><title>Channel</title></head><body><script>var ytInitialData = {data};</script></body></html>")
}

async fn mount_community(server: &MockServer, handle: &str, ids: &[&str]) {
    Mock::given(method("GET"))
        .and(path(format!("/{handle}/community")))
        .respond_with(ResponseTemplate::new(200).set_body_string(community_page(ids)))
        .mount(server)
        .await;
}

async fn watch(db: &Database, guild: &str, target: &str, channel_id: &str) {
    add_watch(
        db.pool(),
        &NewWatch {
            guild_id: guild.to_string(),
            delivery_channel_id: target.to_string(),
            channel_id: channel_id.to_string(),
        },
    )
    .await
    .expect("Failed to add watch");
}

fn build_monitor(
    server: &MockServer,
    channels: Vec<ChannelTarget>,
    db: &Database,
    notifier: Arc<RecordingNotifier>,
) -> Monitor {
    let config = Config {
        base_url: server.uri(),
        ..Config::for_testing()
    };
    let scraper = CommunityScraper::new(&config).unwrap();
    Monitor::new(
        config,
        ChannelRegistry::new(channels).unwrap(),
        scraper,
        Arc::new(db.clone()),
        notifier,
    )
}

#[tokio::test]
async fn test_detect_first_then_seen_then_new() {
    let (db, _temp_dir) = setup_db().await;

    let first = detect("lofi", &result_with(&["A", "old"]), &db, BaselinePolicy::Notify)
        .await
        .unwrap()
        .unwrap();
    assert!(first.is_new);
    assert!(first.first_observation);
    assert_eq!(first.post.id, "A");
    assert_eq!(first.upsert, UpsertOutcome::Stored);

    let second = detect("lofi", &result_with(&["A", "old"]), &db, BaselinePolicy::Notify)
        .await
        .unwrap()
        .unwrap();
    assert!(!second.is_new);
    assert!(second.upsert.already_existed());

    let third = detect("lofi", &result_with(&["B", "A"]), &db, BaselinePolicy::Notify)
        .await
        .unwrap()
        .unwrap();
    assert!(third.is_new);
    assert!(!third.first_observation);

    let latest = get_latest_post(db.pool(), "lofi").await.unwrap().unwrap();
    assert_eq!(latest.post_id, "B");
}

#[tokio::test]
async fn test_detect_silent_baseline() {
    let (db, _temp_dir) = setup_db().await;

    let first = detect("lofi", &result_with(&["A"]), &db, BaselinePolicy::Silent)
        .await
        .unwrap()
        .unwrap();
    assert!(!first.is_new);
    assert!(first.first_observation);
    assert!(get_latest_post(db.pool(), "lofi").await.unwrap().is_some());

    let next = detect("lofi", &result_with(&["B"]), &db, BaselinePolicy::Silent)
        .await
        .unwrap()
        .unwrap();
    assert!(next.is_new);
}

#[tokio::test]
async fn test_detect_without_posts_is_none() {
    let (db, _temp_dir) = setup_db().await;

    let detection = detect("lofi", &result_with(&[]), &db, BaselinePolicy::Notify)
        .await
        .unwrap();

    assert!(detection.is_none());
    assert!(get_latest_post(db.pool(), "lofi").await.unwrap().is_none());
}

struct FailingStore;

#[async_trait]
impl PostStore for FailingStore {
    async fn get_latest_post(
        &self,
        _channel_id: &str,
    ) -> Result<Option<community_post_watcher::db::StoredPost>> {
        anyhow::bail!("database is locked")
    }

    async fn upsert_post(
        &self,
        _post: &community_post_watcher::db::NewChannelPost,
    ) -> Result<UpsertOutcome> {
        anyhow::bail!("database is locked")
    }

    async fn get_watchers(
        &self,
        _channel_id: &str,
    ) -> Result<Vec<community_post_watcher::db::DeliveryTarget>> {
        Ok(Vec::new())
    }

    async fn all_watches(&self) -> Result<Vec<community_post_watcher::db::WatchRecord>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_detect_store_failure_is_an_error() {
    let error = detect("lofi", &result_with(&["A"]), &FailingStore, BaselinePolicy::Notify)
        .await
        .unwrap_err();

    assert!(error.to_string().contains("get_latest_post"));
}

#[tokio::test]
async fn test_sweep_notifies_all_watchers_once() {
    let server = MockServer::start().await;
    mount_community(&server, "@LofiGirl", &["P1", "P0"]).await;
    let (db, _temp_dir) = setup_db().await;
    watch(&db, "guild-1", "chan-1", "lofi").await;
    watch(&db, "guild-2", "chan-7", "lofi").await;

    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = build_monitor(
        &server,
        vec![channel("lofi", "@LofiGirl")],
        &db,
        notifier.clone(),
    );

    let summary = monitor.sweep().await.expect("sweep should run");
    assert_eq!(summary.channels, 1);
    assert_eq!(summary.notified, 1);
    assert_eq!(summary.failures, 0);

    let events = notifier.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.channel_id, "lofi");
    assert_eq!(event.post.id, "P1");
    assert_eq!(event.post.url, "https://www.youtube.com/post/P1");
    assert_eq!(event.channel_avatar_url, "https://yt3/page-avatar.jpg");
    let targets: Vec<_> = event
        .watchers
        .iter()
        .map(|w| w.delivery_channel_id.as_str())
        .collect();
    assert_eq!(targets, vec!["chan-1", "chan-7"]);

    let summary = monitor.sweep().await.expect("sweep should run");
    assert_eq!(summary.notified, 0);
    assert_eq!(notifier.events().len(), 1);
}

#[tokio::test]
async fn test_channels_sharing_a_handle_notify_once_each() {
    let server = MockServer::start().await;
    mount_community(&server, "@Same", &["P1"]).await;
    let (db, _temp_dir) = setup_db().await;
    watch(&db, "guild-1", "chan-1", "a").await;
    watch(&db, "guild-2", "chan-2", "b").await;

    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = build_monitor(
        &server,
        vec![channel("a", "@Same"), channel("b", "@Same")],
        &db,
        notifier.clone(),
    );

    let first = monitor.sweep().await.expect("sweep should run");
    assert_eq!(first.notified, 2);

    for _ in 0..2 {
        let summary = monitor.sweep().await.expect("sweep should run");
        assert_eq!(summary.notified, 0);
        assert_eq!(summary.failures, 0);
    }

    let mut notified: Vec<_> = notifier
        .events()
        .iter()
        .map(|e| (e.channel_id.clone(), e.post.id.clone()))
        .collect();
    notified.sort();
    assert_eq!(
        notified,
        vec![
            ("a".to_string(), "P1".to_string()),
            ("b".to_string(), "P1".to_string()),
        ]
    );
    assert_eq!(
        get_latest_post(db.pool(), "b").await.unwrap().unwrap().post_id,
        "P1"
    );
}

struct RejectingNotifier;

#[async_trait]
impl Notifier for RejectingNotifier {
    async fn notify(&self, _event: &NotificationEvent) -> Result<()> {
        anyhow::bail!("Webhook returned status 502 Bad Gateway")
    }
}

#[tokio::test]
async fn test_failed_delivery_is_not_retried() {
    let server = MockServer::start().await;
    mount_community(&server, "@LofiGirl", &["P1"]).await;
    let (db, _temp_dir) = setup_db().await;
    watch(&db, "guild-1", "chan-1", "lofi").await;

    let config = Config {
        base_url: server.uri(),
        ..Config::for_testing()
    };
    let monitor = Monitor::new(
        config.clone(),
        ChannelRegistry::new(vec![channel("lofi", "@LofiGirl")]).unwrap(),
        CommunityScraper::new(&config).unwrap(),
        Arc::new(db.clone()),
        Arc::new(RejectingNotifier),
    );

    let first = monitor.sweep().await.expect("sweep should run");
    assert_eq!(first.failures, 1);
    assert_eq!(first.notified, 0);

    // The post was stored before delivery, so it is not offered again.
    let second = monitor.sweep().await.expect("sweep should run");
    assert_eq!(second.failures, 0);
    assert_eq!(second.notified, 0);
    assert_eq!(
        get_latest_post(db.pool(), "lofi").await.unwrap().unwrap().post_id,
        "P1"
    );
}

#[tokio::test]
async fn test_failing_channel_does_not_block_others() {
    let server = MockServer::start().await;
    mount_community(&server, "@LofiGirl", &["P1"]).await;
    let (db, _temp_dir) = setup_db().await;
    watch(&db, "guild-1", "chan-1", "lofi").await;
    watch(&db, "guild-1", "chan-1", "ghost").await;

    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = build_monitor(
        &server,
        vec![channel("lofi", "@LofiGirl")],
        &db,
        notifier.clone(),
    );

    let summary = monitor.sweep().await.expect("sweep should run");

    assert_eq!(summary.channels, 2);
    assert_eq!(summary.notified, 1);
    assert_eq!(summary.failures, 1);
    assert_eq!(notifier.events()[0].channel_id, "lofi");
}

#[tokio::test]
async fn test_overlapping_sweep_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/@LofiGirl/community"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(community_page(&["P1"]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    let (db, _temp_dir) = setup_db().await;
    watch(&db, "guild-1", "chan-1", "lofi").await;

    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = build_monitor(
        &server,
        vec![channel("lofi", "@LofiGirl")],
        &db,
        notifier.clone(),
    );

    let (first, second) = tokio::join!(monitor.sweep(), monitor.sweep());

    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(notifier.events().len(), 1);

    // The lock is released once the sweep finishes.
    assert!(monitor.sweep().await.is_some());
}
