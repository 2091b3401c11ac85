// src/core/commands/file.rs

//! Structured `file:*` handlers.

use super::{CommandHandler, HandlerMeta, HandlerOutcome};
use async_trait::async_trait;
use std::time::Duration;

/// Refuse to inline files beyond this size into a result payload.
const MAX_FILE_SIZE: u64 = 8 * 1024 * 1024;

/// `file:get <path>` — read a file from the worker host into stdout.
pub struct FileGet;

#[async_trait]
impl CommandHandler for FileGet {
    fn meta(&self) -> HandlerMeta {
        HandlerMeta {
            name: "file:get",
            category: "file",
            summary: "Read a file from the host and return its contents",
        }
    }

    async fn execute(&self, args: &str, _timeout: Duration) -> HandlerOutcome {
        let path = args.trim();
        if path.is_empty() {
            return HandlerOutcome::failure(2, "usage: file:get <path>".to_string());
        }

        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() > MAX_FILE_SIZE => HandlerOutcome::failure(
                1,
                format!("file exceeds {MAX_FILE_SIZE} bytes ({} bytes)", meta.len()),
            ),
            Ok(_) => match tokio::fs::read(path).await {
                Ok(bytes) => HandlerOutcome::success(String::from_utf8_lossy(&bytes).into_owned()),
                Err(e) => HandlerOutcome::failure(1, format!("failed to read '{path}': {e}")),
            },
            Err(e) => HandlerOutcome::failure(1, format!("failed to stat '{path}': {e}")),
        }
    }
}
