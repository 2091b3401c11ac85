// src/core/minion/processor.rs

//! Consumes commands from the stream, runs them through the command
//! registry, and reports status and results back.
//!
//! For every command the wire order is strict: RECEIVED, EXECUTING, the
//! Result, then COMPLETED or FAILED. The processor is the stream's only
//! writer on the minion side, so sends are serialized by construction.

use super::{MinionIdentity, MinionStream};
use crate::core::commands::{CommandRegistry, CommandSpec, CommandStatus, CommandStatusUpdate};
use crate::core::protocol::Frame;
use crate::core::HiveLinkError;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Why a processing run ended without error. The distinction matters to the
/// orchestrator: a closed stream means reconnect, a shutdown means exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    StreamClosed,
    Shutdown,
}

pub struct CommandProcessor {
    identity: MinionIdentity,
    commands: Arc<CommandRegistry>,
    shell_timeout: Duration,
}

impl CommandProcessor {
    pub fn new(
        identity: MinionIdentity,
        commands: Arc<CommandRegistry>,
        shell_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            commands,
            shell_timeout,
        }
    }

    /// Drives the stream until it errors, reaches EOF, or the shutdown
    /// signal fires. Execution failures never end the loop; they flow back
    /// as non-zero exit codes. Send failures do end it, so the orchestrator
    /// can reconnect.
    pub async fn process(
        &self,
        stream: &mut MinionStream,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<ProcessOutcome, HiveLinkError> {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Command processor stopping on shutdown signal.");
                    return Ok(ProcessOutcome::Shutdown);
                }
                frame = stream.next() => {
                    match frame {
                        Some(Ok(Frame::Command { spec })) => {
                            self.handle_command(stream, spec).await?;
                        }
                        Some(Ok(frame)) => {
                            // The minion consumes commands only.
                            debug!("Ignoring non-command frame: {frame:?}");
                        }
                        Some(Err(e)) => return Err(e),
                        None => {
                            info!("Nexus closed the command stream.");
                            return Ok(ProcessOutcome::StreamClosed);
                        }
                    }
                }
            }
        }
    }

    async fn handle_command(
        &self,
        stream: &mut MinionStream,
        spec: CommandSpec,
    ) -> Result<(), HiveLinkError> {
        let minion_id = self.identity.get();
        info!("Received command {} ({:?})", spec.id, spec.kind);

        self.send_status(stream, &spec.id, &minion_id, CommandStatus::Received)
            .await?;
        self.send_status(stream, &spec.id, &minion_id, CommandStatus::Executing)
            .await?;

        let result = self
            .commands
            .execute(&minion_id, &spec, self.shell_timeout)
            .await;
        let exit_code = result.exit_code;
        debug!("Command {} finished with exit code {}", spec.id, exit_code);

        stream.send(Frame::Result { result }).await?;

        let terminal = if exit_code == 0 {
            CommandStatus::Completed
        } else {
            CommandStatus::Failed
        };
        self.send_status(stream, &spec.id, &minion_id, terminal)
            .await
    }

    async fn send_status(
        &self,
        stream: &mut MinionStream,
        command_id: &str,
        minion_id: &str,
        status: CommandStatus,
    ) -> Result<(), HiveLinkError> {
        stream
            .send(Frame::Status {
                update: CommandStatusUpdate {
                    command_id: command_id.to_string(),
                    minion_id: minion_id.to_string(),
                    status,
                    timestamp: chrono::Utc::now().timestamp(),
                },
            })
            .await
    }
}
