//! SQLite persistence for watches and observed posts.

mod migrations;
mod models;
mod queries;
mod store;

pub use models::*;
pub use queries::*;
pub use store::PostStore;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::{debug, info};

/// Pool size. The sweep writes at most one post per channel at a time, and
/// the CLI only adds a short-lived writer next to it.
const MAX_CONNECTIONS: u32 = 4;

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `path` and bring its schema
    /// up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, migrations fail, or the
    /// database turns out to be read-only.
    pub async fn new(path: &Path) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(connect_options(path))
            .await
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;

        let db = Self { pool };
        migrations::run(&db.pool).await?;
        info!(path = %path.display(), "Database ready");

        db.ensure_writable(path).await?;
        Ok(db)
    }

    /// Fail at startup rather than on the first post upsert when the file or
    /// its directory is read-only.
    async fn ensure_writable(&self, path: &Path) -> Result<()> {
        let mut tx = self.pool.begin().await.with_context(|| {
            format!("Failed to start write probe on {}", path.display())
        })?;

        sqlx::query("UPDATE _schema_version SET version = version")
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!(
                    "SQLite database is not writable: {}. Check file and directory permissions",
                    path.display()
                )
            })?;

        tx.rollback().await.context("Failed to end write probe")?;
        debug!("Write probe succeeded");
        Ok(())
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection, checkpointing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn connect_options(path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        // A sweep upserting posts and the CLI editing watches can overlap;
        // wait for the lock instead of failing with SQLITE_BUSY.
        .busy_timeout(Duration::from_secs(10))
}
