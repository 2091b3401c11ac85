// src/core/commands/mod.rs

//! The command model and the registry that maps command names to handlers.
//!
//! Payloads come in two shapes. Structured commands start with a
//! `prefix:subcommand` token (`system:info`, `file:get`) and resolve to a
//! registered handler. Anything else is handed to the default shell handler.
//! Execution never fails at the call site: every failure mode is folded into
//! a [`CommandResult`] with a non-zero exit code.

pub mod file;
pub mod shell;
pub mod system;

use crate::core::HiveLinkError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use strum_macros::{Display, EnumString};

/// The two classes of commands carried over the stream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandKind {
    /// A command executed on the worker host (shell or structured handler).
    #[default]
    System,
    /// A fabric-internal command, interpreted by the minion itself.
    Internal,
}

/// Lifecycle states of a dispatched command. `Pending` exists only in the
/// store; the wire carries the remaining four, reported by the minion in
/// the order received → executing → completed/failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandStatus {
    Pending,
    Received,
    Executing,
    Completed,
    Failed,
}

/// The unit of work delivered to a minion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Dispatch-assigned identifier, shared by every target of one request.
    pub id: String,
    pub kind: CommandKind,
    pub payload: String,
}

/// A progress report for one command on one minion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandStatusUpdate {
    pub command_id: String,
    pub minion_id: String,
    pub status: CommandStatus,
    /// Unix seconds; monotonic per command on the issuing minion.
    pub timestamp: i64,
}

/// The terminal output of one command on one minion. At most one result is
/// persisted per `(command_id, minion_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command_id: String,
    pub minion_id: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Unix seconds at the moment the command finished.
    pub timestamp: i64,
}

/// Descriptive metadata for one handler, used by the admin surface to list
/// available commands grouped by category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerMeta {
    pub name: &'static str,
    pub category: &'static str,
    pub summary: &'static str,
}

/// What a handler produces. The registry stamps identity and timestamp onto
/// it to form the final [`CommandResult`].
#[derive(Debug, Clone, Default)]
pub struct HandlerOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl HandlerOutcome {
    pub fn success(stdout: String) -> Self {
        Self {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i32, stderr: String) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr,
        }
    }
}

/// The execution contract for a single command implementation.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn meta(&self) -> HandlerMeta;

    /// Runs the handler with everything after the command token as `args`.
    /// Implementations never error; failures become non-zero exit codes.
    async fn execute(&self, args: &str, timeout: Duration) -> HandlerOutcome;
}

/// Maps structured command names to handlers and owns the default shell
/// fallback for unstructured payloads.
pub struct CommandRegistry {
    handlers: HashMap<&'static str, Arc<dyn CommandHandler>>,
    shell: Arc<shell::ShellHandler>,
}

impl CommandRegistry {
    /// Creates a registry with only the shell fallback.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            shell: Arc::new(shell::ShellHandler),
        }
    }

    /// Creates a registry with the built-in structured handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(system::SystemInfo));
        registry.register(Arc::new(system::SystemOs));
        registry.register(Arc::new(file::FileGet));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(handler.meta().name, handler);
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Validates a payload before dispatch: it must be non-empty, and if its
    /// first token claims a structured prefix, that exact token must name a
    /// registered command.
    pub fn validate_payload(&self, payload: &str) -> Result<(), HiveLinkError> {
        let trimmed = payload.trim();
        if trimmed.is_empty() {
            return Err(HiveLinkError::Validation(
                "empty command payload".to_string(),
            ));
        }
        if let Some(token) = trimmed.split_whitespace().next()
            && (token.starts_with("system:") || token.starts_with("file:"))
            && !self.is_registered(token)
        {
            return Err(HiveLinkError::Validation(format!(
                "unknown command '{token}'"
            )));
        }
        Ok(())
    }

    /// Executes a command spec on behalf of `minion_id`.
    ///
    /// Structured payloads route to their handler; everything else goes to
    /// the shell with the given timeout. This never returns an error: the
    /// outcome carries failures as non-zero exit codes.
    pub async fn execute(
        &self,
        minion_id: &str,
        spec: &CommandSpec,
        shell_timeout: Duration,
    ) -> CommandResult {
        let trimmed = spec.payload.trim();
        let token = trimmed.split_whitespace().next().unwrap_or("");

        let outcome = if let Some(handler) = self.handlers.get(token) {
            let args = trimmed[token.len()..].trim_start();
            handler.execute(args, shell_timeout).await
        } else {
            self.shell.execute(trimmed, shell_timeout).await
        };

        CommandResult {
            command_id: spec.id.clone(),
            minion_id: minion_id.to_string(),
            exit_code: outcome.exit_code,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Groups every handler (including the shell fallback) by category.
    pub fn categorize(&self) -> BTreeMap<&'static str, Vec<HandlerMeta>> {
        let mut categories: BTreeMap<&'static str, Vec<HandlerMeta>> = BTreeMap::new();
        for handler in self.handlers.values() {
            let meta = handler.meta();
            categories.entry(meta.category).or_default().push(meta);
        }
        let shell_meta = self.shell.meta();
        categories.entry(shell_meta.category).or_default().push(shell_meta);
        for metas in categories.values_mut() {
            metas.sort_by_key(|m| m.name);
        }
        categories
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
