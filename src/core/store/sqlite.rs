// src/core/store/sqlite.rs

//! The SQLite-backed command store.
//!
//! Every write is idempotent on `(command_id, minion_id)` so that the
//! at-least-once stream delivery can replay a result without creating a
//! second row. The stream-driven writes (results and status updates) retry
//! transient failures with a quadratic backoff (attempt² × base delay)
//! before surfacing as `Persistence` errors.

use super::migrations;
use crate::config::StoreConfig;
use crate::core::HiveLinkError;
use crate::core::commands::{CommandResult, CommandStatus};
use crate::core::host::HostInfo;
use crate::core::metrics;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use strum_macros::{Display, EnumString};
use tracing::warn;

/// Which way a persisted command travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CommandDirection {
    /// Nexus to minion — every dispatched command.
    Outbound,
    /// Reserved for minion-originated traffic.
    Inbound,
}

/// One row of the `commands` table, keyed by `(id, host_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRecord {
    pub id: String,
    pub host_id: String,
    pub command: String,
    pub timestamp: i64,
    pub direction: CommandDirection,
    pub status: CommandStatus,
}

#[derive(sqlx::FromRow)]
struct HostRow {
    id: String,
    hostname: String,
    ip: String,
    os: String,
    last_seen: i64,
    tags_json: String,
}

#[derive(sqlx::FromRow)]
struct CommandRow {
    id: String,
    host_id: String,
    command: String,
    timestamp: i64,
    direction: String,
    status: String,
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    command_id: String,
    minion_id: String,
    exit_code: i64,
    stdout: String,
    stderr: String,
    timestamp: i64,
}

/// Transactional persistence for hosts, commands, command statuses and
/// command results.
#[derive(Clone)]
pub struct CommandStore {
    pool: SqlitePool,
    op_timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl CommandStore {
    pub fn new(pool: SqlitePool, config: &StoreConfig) -> Self {
        Self {
            pool,
            op_timeout: config.op_timeout,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
        }
    }

    /// Opens the configured database file and applies pending migrations.
    pub async fn open(config: &StoreConfig) -> Result<Self, HiveLinkError> {
        let pool = super::create_pool(&config.database_path).await?;
        migrations::run(&pool)
            .await
            .map_err(|e| HiveLinkError::Persistence(e.to_string()))?;
        Ok(Self::new(pool, config))
    }

    /// Opens a fresh in-memory store. Used by tests.
    pub async fn open_in_memory() -> Result<Self, HiveLinkError> {
        let pool = super::create_test_pool().await?;
        migrations::run(&pool)
            .await
            .map_err(|e| HiveLinkError::Persistence(e.to_string()))?;
        Ok(Self::new(pool, &StoreConfig::default()))
    }

    /// Inserts or refreshes a host row. `first_seen` is written once and
    /// preserved on later registrations.
    pub async fn upsert_host(&self, info: &HostInfo) -> Result<(), HiveLinkError> {
        let tags_json = serde_json::to_string(&info.tags)?;
        let now = chrono::Utc::now().timestamp();
        tokio::time::timeout(
            self.op_timeout,
            sqlx::query(
                "INSERT INTO hosts (id, hostname, ip, os, first_seen, last_seen, tags_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                     hostname = excluded.hostname,
                     ip = excluded.ip,
                     os = excluded.os,
                     last_seen = excluded.last_seen,
                     tags_json = excluded.tags_json",
            )
            .bind(&info.id)
            .bind(&info.hostname)
            .bind(&info.ip)
            .bind(&info.os)
            .bind(now)
            .bind(&tags_json)
            .execute(&self.pool),
        )
        .await??;
        Ok(())
    }

    pub async fn get_host(&self, id: &str) -> Result<Option<HostInfo>, HiveLinkError> {
        let row: Option<HostRow> = tokio::time::timeout(
            self.op_timeout,
            sqlx::query_as(
                "SELECT id, hostname, ip, os, last_seen, tags_json FROM hosts WHERE id = ?1",
            )
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await??;

        row.map(|r| {
            let tags = serde_json::from_str(&r.tags_json)?;
            Ok(HostInfo {
                id: r.id,
                hostname: r.hostname,
                ip: r.ip,
                os: r.os,
                last_seen: r.last_seen,
                tags,
            })
        })
        .transpose()
    }

    /// Records a freshly dispatched command for one target, status `Pending`.
    /// Replaying the same `(id, host_id)` pair is a no-op.
    pub async fn insert_command(
        &self,
        command_id: &str,
        host_id: &str,
        payload: &str,
        direction: CommandDirection,
    ) -> Result<(), HiveLinkError> {
        let now = chrono::Utc::now().timestamp();
        tokio::time::timeout(
            self.op_timeout,
            sqlx::query(
                "INSERT INTO commands (id, host_id, command, timestamp, direction, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id, host_id) DO NOTHING",
            )
            .bind(command_id)
            .bind(host_id)
            .bind(payload)
            .bind(now)
            .bind(direction.to_string())
            .bind(CommandStatus::Pending.to_string())
            .execute(&self.pool),
        )
        .await??;
        Ok(())
    }

    /// Updates the status of one `(command, minion)` row, retrying transient
    /// failures. Returns `NotFound` when no such command was ever persisted.
    pub async fn update_command_status(
        &self,
        command_id: &str,
        minion_id: &str,
        status: CommandStatus,
    ) -> Result<(), HiveLinkError> {
        let mut attempt: u32 = 0;
        let affected = loop {
            attempt += 1;
            match tokio::time::timeout(
                self.op_timeout,
                self.update_status_once(command_id, minion_id, status),
            )
            .await
            {
                Ok(Ok(affected)) => break affected,
                Ok(Err(e)) => {
                    if attempt <= self.max_retries && is_transient(&e) {
                        self.retry_pause("update command status", attempt, &e).await;
                        continue;
                    }
                    return Err(HiveLinkError::Persistence(format!(
                        "update command status: {e}"
                    )));
                }
                Err(_) => {
                    if attempt <= self.max_retries {
                        self.deadline_pause("update command status", attempt).await;
                        continue;
                    }
                    return Err(HiveLinkError::Timeout(format!(
                        "update command status exceeded {:?}",
                        self.op_timeout
                    )));
                }
            }
        };

        if affected == 0 {
            return Err(HiveLinkError::NotFound(format!(
                "command '{command_id}' for minion '{minion_id}'"
            )));
        }
        Ok(())
    }

    async fn update_status_once(
        &self,
        command_id: &str,
        minion_id: &str,
        status: CommandStatus,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE commands SET status = ?3 WHERE id = ?1 AND host_id = ?2")
            .bind(command_id)
            .bind(minion_id)
            .bind(status.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn get_command(
        &self,
        command_id: &str,
        host_id: &str,
    ) -> Result<Option<CommandRecord>, HiveLinkError> {
        let row: Option<CommandRow> = tokio::time::timeout(
            self.op_timeout,
            sqlx::query_as(
                "SELECT id, host_id, command, timestamp, direction, status
                 FROM commands WHERE id = ?1 AND host_id = ?2",
            )
            .bind(command_id)
            .bind(host_id)
            .fetch_optional(&self.pool),
        )
        .await??;

        row.map(command_record_from_row).transpose()
    }

    /// Persists a result inside one transaction: verify the command row,
    /// insert the result, and mark the command completed. Replays of the
    /// same result commit without effect. Transient failures are retried.
    pub async fn store_result(&self, result: &CommandResult) -> Result<(), HiveLinkError> {
        let timer = metrics::STORE_WRITE_SECONDS.start_timer();
        let mut attempt: u32 = 0;
        let outcome = loop {
            attempt += 1;
            match tokio::time::timeout(self.op_timeout, self.store_result_once(result)).await {
                Ok(Ok(())) => break Ok(()),
                Ok(Err(e)) => {
                    if attempt <= self.max_retries && is_transient(&e) {
                        self.retry_pause("store result", attempt, &e).await;
                        continue;
                    }
                    break Err(HiveLinkError::Persistence(format!("store result: {e}")));
                }
                Err(_) => {
                    if attempt <= self.max_retries {
                        self.deadline_pause("store result", attempt).await;
                        continue;
                    }
                    break Err(HiveLinkError::Timeout(format!(
                        "store result exceeded {:?}",
                        self.op_timeout
                    )));
                }
            }
        };
        timer.observe_duration();
        if outcome.is_ok() {
            metrics::RESULTS_STORED_TOTAL.inc();
        }
        outcome
    }

    async fn store_result_once(&self, result: &CommandResult) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let known: Option<(String,)> =
            sqlx::query_as("SELECT id FROM commands WHERE id = ?1 AND host_id = ?2")
                .bind(&result.command_id)
                .bind(&result.minion_id)
                .fetch_optional(&mut *tx)
                .await?;
        if known.is_none() {
            // The result may precede a rare in-flight insert; keep it anyway.
            warn!(
                "Result for unknown command '{}' from minion '{}'; persisting regardless",
                result.command_id, result.minion_id
            );
        }

        sqlx::query(
            "INSERT INTO command_results (command_id, minion_id, exit_code, stdout, stderr, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(command_id, minion_id) DO NOTHING",
        )
        .bind(&result.command_id)
        .bind(&result.minion_id)
        .bind(i64::from(result.exit_code))
        .bind(&result.stdout)
        .bind(&result.stderr)
        .bind(result.timestamp)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE commands SET status = ?3 WHERE id = ?1 AND host_id = ?2")
            .bind(&result.command_id)
            .bind(&result.minion_id)
            .bind(CommandStatus::Completed.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    /// Returns every persisted result for a command, oldest first. An empty
    /// result set is not an error.
    pub async fn get_results(&self, command_id: &str) -> Result<Vec<CommandResult>, HiveLinkError> {
        let rows: Vec<ResultRow> = tokio::time::timeout(
            self.op_timeout,
            sqlx::query_as(
                "SELECT command_id, minion_id, exit_code, stdout, stderr, timestamp
                 FROM command_results WHERE command_id = ?1 ORDER BY timestamp ASC",
            )
            .bind(command_id)
            .fetch_all(&self.pool),
        )
        .await??;

        Ok(rows
            .into_iter()
            .map(|r| CommandResult {
                command_id: r.command_id,
                minion_id: r.minion_id,
                exit_code: r.exit_code as i32,
                stdout: r.stdout,
                stderr: r.stderr,
                timestamp: r.timestamp,
            })
            .collect())
    }

    async fn retry_pause(&self, what: &str, attempt: u32, error: &sqlx::Error) {
        let delay = self.retry_base_delay * attempt * attempt;
        warn!("Transient failure on {what} (attempt {attempt}): {error}. Retrying in {delay:?}");
        tokio::time::sleep(delay).await;
    }

    async fn deadline_pause(&self, what: &str, attempt: u32) {
        let delay = self.retry_base_delay * attempt * attempt;
        warn!("Deadline exceeded on {what} (attempt {attempt}). Retrying in {delay:?}");
        tokio::time::sleep(delay).await;
    }
}

fn command_record_from_row(row: CommandRow) -> Result<CommandRecord, HiveLinkError> {
    Ok(CommandRecord {
        direction: CommandDirection::from_str(&row.direction).map_err(|_| {
            HiveLinkError::Persistence(format!("bad direction '{}'", row.direction))
        })?,
        status: CommandStatus::from_str(&row.status)
            .map_err(|_| HiveLinkError::Persistence(format!("bad status '{}'", row.status)))?,
        id: row.id,
        host_id: row.host_id,
        command: row.command,
        timestamp: row.timestamp,
    })
}

fn is_transient(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            let message = db.message().to_ascii_lowercase();
            message.contains("locked") || message.contains("busy")
        }
        _ => false,
    }
}
