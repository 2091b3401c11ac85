// src/core/commands/system.rs

//! Structured `system:*` handlers reporting facts about the worker host.

use super::{CommandHandler, HandlerMeta, HandlerOutcome};
use crate::core::host;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::time::Duration;
use sysinfo::System;

/// `system:info` — a multi-line host summary.
pub struct SystemInfo;

#[async_trait]
impl CommandHandler for SystemInfo {
    fn meta(&self) -> HandlerMeta {
        HandlerMeta {
            name: "system:info",
            category: "system",
            summary: "Report hostname, OS, kernel, uptime and memory of the host",
        }
    }

    async fn execute(&self, _args: &str, _timeout: Duration) -> HandlerOutcome {
        let mut sys = System::new();
        sys.refresh_memory();

        let mut out = String::new();
        let _ = writeln!(
            out,
            "hostname: {}",
            System::host_name().unwrap_or_else(|| "unknown".to_string())
        );
        let _ = writeln!(
            out,
            "os: {}",
            System::long_os_version().unwrap_or_else(|| "unknown".to_string())
        );
        let _ = writeln!(
            out,
            "kernel: {}",
            System::kernel_version().unwrap_or_else(|| "unknown".to_string())
        );
        let _ = writeln!(out, "uptime_secs: {}", System::uptime());
        let _ = writeln!(out, "memory_total_bytes: {}", sys.total_memory());
        let _ = writeln!(out, "memory_used_bytes: {}", sys.used_memory());
        let _ = writeln!(out, "outbound_ip: {}", host::outbound_ip());

        HandlerOutcome::success(out)
    }
}

/// `system:os` — just the OS name, one line.
pub struct SystemOs;

#[async_trait]
impl CommandHandler for SystemOs {
    fn meta(&self) -> HandlerMeta {
        HandlerMeta {
            name: "system:os",
            category: "system",
            summary: "Report the operating system of the host",
        }
    }

    async fn execute(&self, _args: &str, _timeout: Duration) -> HandlerOutcome {
        let os = System::long_os_version()
            .or_else(System::name)
            .unwrap_or_else(|| std::env::consts::OS.to_string());
        HandlerOutcome::success(format!("{os}\n"))
    }
}
