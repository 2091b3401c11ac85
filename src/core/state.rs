// src/core/state.rs

//! The process-wide shared state of a running nexus.

use crate::config::Config;
use crate::core::HiveLinkError;
use crate::core::commands::CommandRegistry;
use crate::core::dispatch::Dispatcher;
use crate::core::registry::MinionRegistry;
use crate::core::store::CommandStore;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::{Registry, reload};

/// Handle for swapping the nexus's log filter while it runs.
pub type LogReloadHandle = Arc<reload::Handle<EnvFilter, Registry>>;

/// Everything a connection handler or admin call needs, instantiated once at
/// startup and injected everywhere by `Arc`.
pub struct ServerState {
    pub config: Mutex<Config>,
    pub registry: Arc<MinionRegistry>,
    pub store: Arc<CommandStore>,
    pub commands: Arc<CommandRegistry>,
    pub dispatcher: Dispatcher,
    log_reload: Option<LogReloadHandle>,
}

impl ServerState {
    /// Builds the shared state from a validated configuration and an opened
    /// store. The reload handle is absent in embedded/test setups that never
    /// install a global subscriber.
    pub fn new(
        config: Config,
        store: CommandStore,
        log_reload: Option<LogReloadHandle>,
    ) -> Result<Arc<Self>, HiveLinkError> {
        let store = Arc::new(store);
        let registry = Arc::new(MinionRegistry::new(
            store.clone(),
            config.channel_capacity,
        ));
        let commands = Arc::new(CommandRegistry::with_defaults());
        let dispatcher = Dispatcher::new(
            registry.clone(),
            store.clone(),
            commands.clone(),
            config.enqueue_timeout,
        );

        Ok(Arc::new(Self {
            config: Mutex::new(config),
            registry,
            store,
            commands,
            dispatcher,
            log_reload,
        }))
    }

    /// Admin operation: applies a new log-filter directive to the running
    /// process and records it in the configuration. Bad directives are a
    /// `Validation` error and leave the active filter untouched.
    pub async fn set_log_level(&self, directives: &str) -> Result<(), HiveLinkError> {
        let filter = EnvFilter::try_new(directives).map_err(|e| {
            HiveLinkError::Validation(format!("invalid log directives '{directives}': {e}"))
        })?;
        let handle = self
            .log_reload
            .as_ref()
            .ok_or_else(|| HiveLinkError::Internal("log reloading is not available".to_string()))?;
        handle
            .reload(filter)
            .map_err(|e| HiveLinkError::Internal(format!("failed to swap log filter: {e}")))?;
        self.config.lock().await.log_level = directives.to_string();
        info!("Log filter set to '{directives}'");
        Ok(())
    }
}
