// src/core/store/migrations.rs

//! Embedded schema migrations, applied at startup before the store is used.

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to execute migration {version}: {source}")]
    ExecutionError {
        version: i64,
        #[source]
        source: sqlx::Error,
    },
    #[error("Failed to get schema version: {0}")]
    VersionCheckError(#[source] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

/// The full ordered migration set embedded into the binary.
pub fn all_embedded_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema",
        sql: include_str!("../../../migrations/001_initial_schema.sql"),
    }]
}

/// Applies every migration newer than the recorded schema version.
/// Returns the number of migrations applied.
pub async fn run(pool: &SqlitePool) -> Result<usize, MigrationError> {
    ensure_migrations_table(pool).await?;
    let current_version = current_version(pool).await?;
    let pending: Vec<_> = all_embedded_migrations()
        .into_iter()
        .filter(|m| m.version > current_version)
        .collect();

    for migration in &pending {
        apply(pool, migration).await?;
        info!(
            "Applied schema migration {} ({})",
            migration.version, migration.description
        );
    }

    Ok(pending.len())
}

async fn ensure_migrations_table(pool: &SqlitePool) -> Result<(), MigrationError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now')),
            description TEXT
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| MigrationError::ExecutionError {
        version: 0,
        source: e,
    })?;
    Ok(())
}

async fn current_version(pool: &SqlitePool) -> Result<i64, MigrationError> {
    let result: Option<(i64,)> =
        sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_optional(pool)
            .await
            .map_err(MigrationError::VersionCheckError)?;
    Ok(result.map(|(v,)| v).unwrap_or(0))
}

async fn apply(pool: &SqlitePool, migration: &Migration) -> Result<(), MigrationError> {
    sqlx::raw_sql(migration.sql)
        .execute(pool)
        .await
        .map_err(|e| MigrationError::ExecutionError {
            version: migration.version,
            source: e,
        })?;

    sqlx::query("INSERT OR IGNORE INTO schema_migrations (version, description) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.description)
        .execute(pool)
        .await
        .map_err(|e| MigrationError::ExecutionError {
            version: migration.version,
            source: e,
        })?;

    Ok(())
}
