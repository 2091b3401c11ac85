// src/server/initialization.rs

//! Handles the nexus initialization process, from store setup to binding the
//! listener.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::state::{LogReloadHandle, ServerState};
use crate::core::store::CommandStore;
use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;

/// Initializes all nexus components before starting the main loop.
pub async fn setup(config: Config, log_reload_handle: LogReloadHandle) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let store = CommandStore::open(&config.store).await?;
    info!(
        "Command store ready at '{}'.",
        config.store.database_path
    );

    let state = ServerState::new(config.clone(), store, Some(log_reload_handle))?;
    info!("Nexus state initialized.");

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Nexus listening on {}:{}", config.host, config.port);

    Ok(ServerContext {
        state,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Per-minion command queues hold {} entries; enqueue deadline {:?}.",
        config.channel_capacity, config.enqueue_timeout
    );
    if config.metrics.enabled {
        info!("Metrics exporter enabled on port {}.", config.metrics.port);
    }
}
