// src/core/dispatch.rs

//! The dispatch pipeline: validate, resolve targets, persist, enqueue.

use crate::core::commands::{CommandKind, CommandRegistry, CommandSpec};
use crate::core::registry::{MinionRegistry, TagSelector};
use crate::core::store::{CommandDirection, CommandStore};
use crate::core::{HiveLinkError, ids, metrics};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, warn};

/// An admin request to run one command on a set of targets.
#[derive(Debug, Clone, Default)]
pub struct CommandRequest {
    /// Explicit target ids. When non-empty the selector is ignored.
    pub minion_ids: Vec<String>,
    /// Tag-based target selection; the empty selector means all minions.
    pub selector: TagSelector,
    pub kind: CommandKind,
    pub payload: String,
}

/// The result of a dispatch call.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// False when no target resolved; the command id is empty in that case.
    pub accepted: bool,
    pub command_id: String,
    /// Targets the command was addressed to, in resolution order.
    pub targets: Vec<String>,
    /// Targets whose queue could not take the command within the enqueue
    /// deadline. Their failure does not reject the dispatch.
    pub failed_targets: Vec<String>,
}

impl DispatchOutcome {
    fn rejected() -> Self {
        Self {
            accepted: false,
            command_id: String::new(),
            targets: Vec::new(),
            failed_targets: Vec::new(),
        }
    }
}

/// Validates and fans out commands onto per-minion queues, persisting each
/// target's command row along the way.
pub struct Dispatcher {
    registry: Arc<MinionRegistry>,
    store: Arc<CommandStore>,
    commands: Arc<CommandRegistry>,
    enqueue_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<MinionRegistry>,
        store: Arc<CommandStore>,
        commands: Arc<CommandRegistry>,
        enqueue_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            commands,
            enqueue_timeout,
        }
    }

    /// Dispatches one command request.
    ///
    /// Validation failures surface immediately and persist nothing. An empty
    /// target set is not an error: the outcome simply reports `accepted:
    /// false`. Once at least one target resolved, the request is accepted;
    /// per-target persistence and enqueue failures are logged but do not
    /// veto acceptance.
    pub async fn dispatch(&self, request: CommandRequest) -> Result<DispatchOutcome, HiveLinkError> {
        self.commands.validate_payload(&request.payload)?;

        let targets = self
            .registry
            .find_targets(&request.minion_ids, &request.selector);
        if targets.is_empty() {
            debug!("Dispatch resolved no targets; rejecting without error");
            return Ok(DispatchOutcome::rejected());
        }

        let command_id = ids::generate()?;
        debug!(
            "Dispatching command {} to {} target(s)",
            command_id,
            targets.len()
        );

        for target in &targets {
            if let Err(e) = self
                .store
                .insert_command(
                    &command_id,
                    target,
                    &request.payload,
                    CommandDirection::Outbound,
                )
                .await
            {
                // The command may still stream; operators learn from the log.
                warn!(
                    "Failed to persist command {} for minion {}: {}",
                    command_id, target, e
                );
            }
        }

        let mut failed_targets = Vec::new();
        for target in &targets {
            let Some(sender) = self.registry.command_sender(target) else {
                warn!(
                    "Minion {} disappeared between resolution and enqueue",
                    target
                );
                failed_targets.push(target.clone());
                continue;
            };
            let spec = CommandSpec {
                id: command_id.clone(),
                kind: request.kind,
                payload: request.payload.clone(),
            };
            match sender.send_timeout(spec, self.enqueue_timeout).await {
                Ok(()) => {
                    metrics::COMMANDS_DISPATCHED_TOTAL.inc();
                }
                Err(SendTimeoutError::Timeout(_)) => {
                    metrics::DISPATCH_ENQUEUE_TIMEOUTS_TOTAL.inc();
                    warn!(
                        "Enqueue for minion {} timed out after {:?}; queue is full",
                        target, self.enqueue_timeout
                    );
                    failed_targets.push(target.clone());
                }
                Err(SendTimeoutError::Closed(_)) => {
                    warn!("Command queue for minion {} is closed", target);
                    failed_targets.push(target.clone());
                }
            }
        }

        Ok(DispatchOutcome {
            accepted: true,
            command_id,
            targets,
            failed_targets,
        })
    }
}
