// src/core/minion/mod.rs

//! The minion agent: connection lifecycle, registration, and command
//! processing against a nexus.

pub mod connection;
pub mod processor;
pub mod registration;
pub mod worker;

pub use connection::{ConnectionManager, MinionStream, ReconnectOutcome};
pub use processor::{CommandProcessor, ProcessOutcome};
pub use registration::RegistrationClient;
pub use worker::MinionWorker;

use crate::config::MinionConfig;
use anyhow::Result;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// The minion's identifier, shared across the worker, the connection manager
/// and the command processor so a nexus-assigned id propagates everywhere at
/// once.
#[derive(Clone, Debug, Default)]
pub struct MinionIdentity {
    inner: Arc<RwLock<String>>,
}

impl MinionIdentity {
    pub fn new(id: String) -> Self {
        Self {
            inner: Arc::new(RwLock::new(id)),
        }
    }

    pub fn get(&self) -> String {
        self.inner.read().clone()
    }

    pub fn set(&self, id: String) {
        *self.inner.write() = id;
    }
}

/// The minion-mode entry point: load configuration, run the worker until a
/// termination signal arrives.
pub async fn run(config_path: &str) -> Result<()> {
    let config = MinionConfig::from_file(config_path).await?;
    info!(
        "Starting minion against nexus at {} (heartbeat every {:?})",
        config.nexus_addr, config.heartbeat_interval
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down minion.");
            let _ = signal_tx.send(());
        }
    });

    let worker = MinionWorker::new(config);
    worker.run(shutdown_rx).await;
    Ok(())
}
