//! Database module for SQLite persistence
//!
//! Handles pages, blocks, and comments storage.

mod blocks;
mod comments;
mod pages;
mod schema;

pub use blocks::*;
pub use comments::*;
pub use pages::*;
pub use schema::*;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;

use crate::error::Result;

/// How long a writer waits for another writer's lock
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a new database connection pool
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run migrations
    initialize_schema(&pool).await?;

    Ok(pool)
}

/// Begin a transaction that holds the write lock from its first statement.
///
/// A deferred transaction that reads first cannot upgrade its snapshot once
/// another writer has committed; SQLite then fails with BUSY without waiting
/// on the busy timeout. Every read-then-write transaction starts here.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    let mut tx = pool.begin().await?;

    // Matches no rows; only takes the lock
    sqlx::query("UPDATE pages SET id = id WHERE 0")
        .execute(&mut *tx)
        .await?;

    Ok(tx)
}

/// Current time as a fixed-width RFC 3339 string.
///
/// Fixed width keeps lexical and chronological order identical, which the
/// `(order, created_at)` block sort relies on.
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Deserialize a field that distinguishes "absent" from "explicit null".
///
/// Use with `#[serde(default, deserialize_with = "double_option")]`.
pub fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    // A single connection keeps every query on the same in-memory database
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    initialize_schema(&pool).await.unwrap();
    pool
}

/// File-backed pool with several connections, for tests that need real
/// writer contention. The `TempDir` must outlive the pool.
#[cfg(test)]
pub(crate) async fn file_pool() -> (SqlitePool, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("quire.db").display());
    let pool = create_pool(&url).await.unwrap();
    (pool, dir)
}
