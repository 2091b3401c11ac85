// src/core/minion/worker.rs

//! The minion orchestrator: initial registration with retry, the processing
//! loop that keeps the command stream alive, and the periodic heartbeat.
//!
//! Two rules keep the register/stream race closed: the worker re-registers
//! before every reconnect attempt, and it treats transport and busy errors
//! as recoverable, backing off instead of exiting.

use super::connection::ReconnectOutcome;
use super::processor::ProcessOutcome;
use super::{CommandProcessor, ConnectionManager, MinionIdentity, RegistrationClient};
use crate::config::MinionConfig;
use crate::core::HiveLinkError;
use crate::core::commands::CommandRegistry;
use crate::core::host::HostInfo;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub struct MinionWorker {
    config: MinionConfig,
    identity: MinionIdentity,
    conn: Arc<ConnectionManager>,
    registration: RegistrationClient,
    processor: CommandProcessor,
}

impl MinionWorker {
    pub fn new(config: MinionConfig) -> Self {
        let identity = MinionIdentity::new(config.id.clone().unwrap_or_default());
        let conn = Arc::new(ConnectionManager::new(
            &config,
            identity.clone(),
            &config.reconnect,
        ));
        let registration =
            RegistrationClient::new(config.nexus_addr.clone(), config.handshake_timeout);
        let processor = CommandProcessor::new(
            identity.clone(),
            Arc::new(CommandRegistry::with_defaults()),
            config.shell_timeout,
        );
        Self {
            config,
            identity,
            conn,
            registration,
            processor,
        }
    }

    /// Runs the worker until the shutdown signal fires, joining the
    /// heartbeat task before returning.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        // Subscribed up front so a signal arriving during registration is
        // seen by the heartbeat task too.
        let heartbeat_rx = shutdown_rx.resubscribe();

        if let Err(e) = self.initial_register(&mut shutdown_rx).await {
            error!("Initial registration failed permanently: {e}");
            return;
        }

        let heartbeat = self.spawn_heartbeat(heartbeat_rx);
        self.processing_loop(&mut shutdown_rx).await;
        self.conn.disconnect().await;

        if let Err(e) = heartbeat.await {
            warn!("Heartbeat task ended abnormally: {e}");
        }
        info!("Minion worker stopped.");
    }

    fn host_info(&self) -> HostInfo {
        HostInfo::collect(self.identity.get(), self.config.tags.clone())
    }

    /// Adopts a nexus-assigned id, propagating it to every sibling component
    /// through the shared identity.
    fn adopt_id(&self, assigned_id: String) {
        if assigned_id != self.identity.get() {
            info!("Adopting nexus-assigned minion id '{assigned_id}'");
            self.identity.set(assigned_id);
        }
    }

    /// Initial registration: a bounded number of attempts with linearly
    /// growing delays (attempt i waits i seconds before attempt i + 1).
    async fn initial_register(
        &self,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<(), HiveLinkError> {
        let attempts = self.config.registration_attempts;
        for attempt in 1..=attempts {
            match self.registration.register(&self.host_info()).await {
                Ok(assigned_id) => {
                    self.adopt_id(assigned_id);
                    info!("Registered with nexus on attempt {attempt}.");
                    return Ok(());
                }
                Err(e) => {
                    warn!("Registration attempt {attempt}/{attempts} failed: {e}");
                    if attempt < attempts {
                        let delay = Duration::from_secs(u64::from(attempt));
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = shutdown_rx.recv() => {
                                return Err(HiveLinkError::Internal(
                                    "shutdown during initial registration".to_string(),
                                ));
                            }
                        }
                    }
                }
            }
        }
        Err(HiveLinkError::Transport(format!(
            "registration failed after {attempts} attempts"
        )))
    }

    /// The main processing loop: keep the stream up, hand it to the command
    /// processor, and back off briefly after every teardown.
    async fn processing_loop(&self, shutdown_rx: &mut broadcast::Receiver<()>) {
        loop {
            if shutdown_requested(shutdown_rx) {
                break;
            }

            if !self.conn.is_connected().await {
                // Re-register first: a restarted nexus has lost the
                // in-memory record the stream handler will look up.
                match self.registration.register(&self.host_info()).await {
                    Ok(assigned_id) => self.adopt_id(assigned_id),
                    Err(e) => warn!("Re-registration before reconnect failed: {e}"),
                }

                match self.conn.connect().await {
                    Ok(()) => {}
                    Err(HiveLinkError::AlreadyBusy) => {
                        debug!("Another connection attempt is in flight; yielding.");
                        if self.pause(shutdown_rx).await {
                            break;
                        }
                        continue;
                    }
                    Err(e) => {
                        warn!("Connect failed: {e}");
                        match self.conn.handle_reconnection(shutdown_rx).await {
                            Ok(ReconnectOutcome::Aborted) => break,
                            Ok(ReconnectOutcome::Connected) => {}
                            Err(e) => debug!("Reconnection attempt failed: {e}"),
                        }
                        continue;
                    }
                }
            }

            let stream = match self.conn.stream().await {
                Ok(stream) => stream,
                Err(_) => continue,
            };
            let result = {
                let mut guard = stream.lock().await;
                self.processor.process(&mut guard, shutdown_rx).await
            };
            self.conn.disconnect().await;

            match result {
                Ok(ProcessOutcome::Shutdown) => break,
                Ok(ProcessOutcome::StreamClosed) => info!("Command stream closed."),
                Err(e) => warn!("Command processing ended with error: {e}"),
            }

            if self.pause(shutdown_rx).await {
                break;
            }
        }
    }

    /// Sleeps the bounded retry interval; returns true when shutdown fired.
    async fn pause(&self, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.config.retry_interval) => false,
            _ = shutdown_rx.recv() => true,
        }
    }

    /// The periodic heartbeat: re-announce host info so `last_seen` stays
    /// fresh on the nexus. Failures are logged, never fatal.
    fn spawn_heartbeat(&self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let registration = self.registration.clone();
        let identity = self.identity.clone();
        let tags = self.config.tags.clone();
        let interval = self.config.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; initial registration
            // already covered it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Heartbeat task shutting down.");
                        return;
                    }
                    _ = ticker.tick() => {
                        let info = HostInfo::collect(identity.get(), tags.clone());
                        match registration.register(&info).await {
                            Ok(assigned_id) => {
                                if assigned_id != identity.get() {
                                    identity.set(assigned_id);
                                }
                                debug!("Heartbeat registration succeeded.");
                            }
                            Err(e) => warn!("Heartbeat registration failed: {e}"),
                        }
                    }
                }
            }
        })
    }
}

fn shutdown_requested(shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
    !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty))
}
