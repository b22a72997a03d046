use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use super::models::{
    AddWatchOutcome, DeliveryTarget, NewChannelPost, NewWatch, StoredPost, UpsertOutcome,
    WatchRecord,
};

// ========== Watches ==========

/// Add a watch unless the same (guild, delivery channel, channel) already exists.
pub async fn add_watch(pool: &SqlitePool, watch: &NewWatch) -> Result<AddWatchOutcome> {
    let result = sqlx::query(
        r"
        INSERT INTO watched_channels (guild_id, delivery_channel_id, channel_id)
        VALUES (?, ?, ?)
        ON CONFLICT (guild_id, delivery_channel_id, channel_id) DO NOTHING
        ",
    )
    .bind(&watch.guild_id)
    .bind(&watch.delivery_channel_id)
    .bind(&watch.channel_id)
    .execute(pool)
    .await
    .context("Failed to insert watch")?;

    if result.rows_affected() == 0 {
        return Ok(AddWatchOutcome::AlreadyWatching);
    }

    let record = sqlx::query_as("SELECT * FROM watched_channels WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(pool)
        .await
        .context("Failed to fetch inserted watch")?;

    Ok(AddWatchOutcome::Added(record))
}

/// Remove a watch, returning whether one was deleted.
pub async fn remove_watch(pool: &SqlitePool, watch: &NewWatch) -> Result<bool> {
    let result = sqlx::query(
        r"
        DELETE FROM watched_channels
        WHERE guild_id = ? AND delivery_channel_id = ? AND channel_id = ?
        ",
    )
    .bind(&watch.guild_id)
    .bind(&watch.delivery_channel_id)
    .bind(&watch.channel_id)
    .execute(pool)
    .await
    .context("Failed to delete watch")?;

    Ok(result.rows_affected() > 0)
}

/// All watches in a guild, oldest first.
pub async fn get_watches_for_guild(pool: &SqlitePool, guild_id: &str) -> Result<Vec<WatchRecord>> {
    sqlx::query_as("SELECT * FROM watched_channels WHERE guild_id = ? ORDER BY id")
        .bind(guild_id)
        .fetch_all(pool)
        .await
        .context("Failed to fetch watches for guild")
}

/// Every watch, oldest first.
pub async fn get_all_watches(pool: &SqlitePool) -> Result<Vec<WatchRecord>> {
    sqlx::query_as("SELECT * FROM watched_channels ORDER BY id")
        .fetch_all(pool)
        .await
        .context("Failed to fetch watches")
}

/// Delivery targets currently watching a channel.
pub async fn get_watchers(pool: &SqlitePool, channel_id: &str) -> Result<Vec<DeliveryTarget>> {
    sqlx::query_as(
        r"
        SELECT guild_id, delivery_channel_id
        FROM watched_channels
        WHERE channel_id = ?
        ORDER BY id
        ",
    )
    .bind(channel_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch watchers")
}

pub async fn count_watches(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM watched_channels")
        .fetch_one(pool)
        .await
        .context("Failed to count watches")?;
    Ok(count)
}

// ========== Posts ==========

/// Insert a post keyed by (channel id, post id).
///
/// Post ids are only unique within a channel. An existing pair is not an
/// error: the row is marked as the most recently observed post and its content
/// refreshed, and `AlreadyExists` is returned.
pub async fn upsert_post(pool: &SqlitePool, post: &NewChannelPost) -> Result<UpsertOutcome> {
    let content_hash = compute_hash(&post.content);
    let mut tx = pool.begin().await.context("Failed to begin upsert")?;

    let inserted = sqlx::query(
        r"
        INSERT INTO channel_posts (channel_id, post_id, content, content_hash, published_at, observed_seq)
        VALUES (?, ?, ?, ?, ?, (SELECT COALESCE(MAX(observed_seq), 0) + 1 FROM channel_posts))
        ON CONFLICT (channel_id, post_id) DO NOTHING
        ",
    )
    .bind(&post.channel_id)
    .bind(&post.post_id)
    .bind(&post.content)
    .bind(&content_hash)
    .bind(post.published_at)
    .execute(&mut *tx)
    .await
    .context("Failed to insert post")?;

    if inserted.rows_affected() > 0 {
        tx.commit().await.context("Failed to commit post insert")?;
        return Ok(UpsertOutcome::Stored);
    }

    let previous: (String,) = sqlx::query_as(
        "SELECT content_hash FROM channel_posts WHERE channel_id = ? AND post_id = ?",
    )
    .bind(&post.channel_id)
    .bind(&post.post_id)
    .fetch_one(&mut *tx)
    .await
    .context("Failed to read existing post")?;
    let content_changed = previous.0 != content_hash;

    sqlx::query(
        r"
        UPDATE channel_posts
        SET content = ?, content_hash = ?, last_seen_at = datetime('now'),
            observed_seq = (SELECT MAX(observed_seq) + 1 FROM channel_posts)
        WHERE channel_id = ? AND post_id = ?
        ",
    )
    .bind(&post.content)
    .bind(&content_hash)
    .bind(&post.channel_id)
    .bind(&post.post_id)
    .execute(&mut *tx)
    .await
    .context("Failed to refresh existing post")?;

    tx.commit().await.context("Failed to commit post refresh")?;
    Ok(UpsertOutcome::AlreadyExists { content_changed })
}

/// The most recently observed post of a channel.
pub async fn get_latest_post(pool: &SqlitePool, channel_id: &str) -> Result<Option<StoredPost>> {
    sqlx::query_as(
        r"
        SELECT * FROM channel_posts
        WHERE channel_id = ?
        ORDER BY observed_seq DESC
        LIMIT 1
        ",
    )
    .bind(channel_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch latest post")
}

pub async fn get_post(
    pool: &SqlitePool,
    channel_id: &str,
    post_id: &str,
) -> Result<Option<StoredPost>> {
    sqlx::query_as("SELECT * FROM channel_posts WHERE channel_id = ? AND post_id = ?")
        .bind(channel_id)
        .bind(post_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch post")
}

pub async fn count_posts(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM channel_posts")
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?;
    Ok(count)
}

/// Compute SHA256 hash of content.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash() {
        let hash1 = compute_hash("hello");
        let hash2 = compute_hash("hello");
        let hash3 = compute_hash("world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64);
    }
}
