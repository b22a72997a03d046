use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Schema versions in order. Each version's statements run in one transaction
/// together with the version bump.
const MIGRATIONS: &[(i64, &str, &[&str])] = &[(
    1,
    "watches and observed posts",
    &[
        r"
        CREATE TABLE watched_channels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            guild_id TEXT NOT NULL,
            delivery_channel_id TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (guild_id, delivery_channel_id, channel_id)
        )
        ",
        "CREATE INDEX idx_watched_channels_channel ON watched_channels(channel_id)",
        r"
        CREATE TABLE channel_posts (
            channel_id TEXT NOT NULL,
            post_id TEXT NOT NULL,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            published_at TEXT NOT NULL,
            observed_seq INTEGER NOT NULL,
            first_seen_at TEXT NOT NULL DEFAULT (datetime('now')),
            last_seen_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (channel_id, post_id)
        )
        ",
        "CREATE INDEX idx_channel_posts_latest ON channel_posts(channel_id, observed_seq DESC)",
    ],
)];

/// Apply every migration newer than the stored schema version.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS _schema_version (version INTEGER PRIMARY KEY)")
        .execute(pool)
        .await
        .context("Failed to create schema version table")?;

    let current: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM _schema_version")
        .fetch_one(pool)
        .await
        .context("Failed to read schema version")?;

    for (version, name, statements) in MIGRATIONS.iter().filter(|(v, ..)| *v > current) {
        debug!(version, name, "Applying migration");
        apply(pool, *version, statements)
            .await
            .with_context(|| format!("Migration v{version} ({name}) failed"))?;
        info!(version, name, "Applied migration");
    }

    Ok(())
}

async fn apply(pool: &SqlitePool, version: i64, statements: &[&str]) -> Result<()> {
    let mut tx = pool.begin().await?;

    for statement in statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    sqlx::query("DELETE FROM _schema_version")
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(temp_dir.path().join("m.sqlite"))
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await.unwrap();

        run(&pool).await.unwrap();
        run(&pool).await.unwrap();

        let version: i64 = sqlx::query_scalar("SELECT version FROM _schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().0);
    }
}
