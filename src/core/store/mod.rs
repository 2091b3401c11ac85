// src/core/store/mod.rs

//! Transactional persistence for hosts, commands and command results.

pub mod migrations;
mod sqlite;

pub use sqlite::{CommandDirection, CommandRecord, CommandStore};

use crate::core::HiveLinkError;
use sqlx::SqlitePool;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Opens (creating if needed) the SQLite database backing the store.
pub async fn create_pool(database_path: &str) -> Result<SqlitePool, HiveLinkError> {
    ensure_database_directory(database_path)?;

    let connect_options = SqliteConnectOptions::from_str(&format!("sqlite:{database_path}"))
        .map_err(|e| HiveLinkError::Persistence(format!("invalid database path: {e}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(3))
        .connect_with(connect_options)
        .await?;

    Ok(pool)
}

/// An in-memory pool for tests.
pub async fn create_test_pool() -> Result<SqlitePool, HiveLinkError> {
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| HiveLinkError::Persistence(format!("invalid database path: {e}")))?
        .foreign_keys(true)
        .shared_cache(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options)
        .await?;

    Ok(pool)
}

fn ensure_database_directory(database_path: &str) -> Result<(), HiveLinkError> {
    if database_path == ":memory:" || database_path.is_empty() {
        return Ok(());
    }
    let path = Path::new(database_path);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| HiveLinkError::Persistence(format!("failed to create directory: {e}")))?;
    }
    Ok(())
}
