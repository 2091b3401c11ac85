// src/server/spawner.rs

//! Spawns the nexus's background tasks.

use super::context::ServerContext;
use super::metrics_server;

/// Spawns every enabled background task into the context's `JoinSet`.
pub async fn spawn_all(ctx: &mut ServerContext) {
    let metrics_enabled = {
        let config = ctx.state.config.lock().await;
        config.metrics.enabled
    };
    if metrics_enabled {
        let state = ctx.state.clone();
        let shutdown_rx = ctx.shutdown_tx.subscribe();
        ctx.background_tasks
            .spawn(metrics_server::run_metrics_server(state, shutdown_rx));
    }
}
