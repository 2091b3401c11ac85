// src/core/commands/shell.rs

//! The default handler: runs an unstructured payload in the OS shell.

use super::{CommandHandler, HandlerMeta, HandlerOutcome};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Exit code reported when the shell child is cut off by the timeout,
/// matching the convention of coreutils' `timeout(1)`.
const TIMEOUT_EXIT_CODE: i32 = 124;

pub struct ShellHandler;

#[async_trait]
impl CommandHandler for ShellHandler {
    fn meta(&self) -> HandlerMeta {
        HandlerMeta {
            name: "shell",
            category: "shell",
            summary: "Run an arbitrary command line in the OS shell",
        }
    }

    async fn execute(&self, args: &str, timeout: Duration) -> HandlerOutcome {
        if args.trim().is_empty() {
            return HandlerOutcome::failure(1, "empty shell command".to_string());
        }

        debug!("Executing shell command with timeout {:?}", timeout);
        let mut command = shell_command(args);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return HandlerOutcome::failure(127, format!("failed to spawn shell: {e}"));
            }
        };

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => HandlerOutcome {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Ok(Err(e)) => HandlerOutcome::failure(-1, format!("failed to collect output: {e}")),
            // The future owning the child is dropped here; kill_on_drop reaps it.
            Err(_) => HandlerOutcome::failure(
                TIMEOUT_EXIT_CODE,
                format!("command timed out after {timeout:?}"),
            ),
        }
    }
}

#[cfg(unix)]
fn shell_command(payload: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(payload);
    command
}

#[cfg(windows)]
fn shell_command(payload: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(payload);
    command
}
