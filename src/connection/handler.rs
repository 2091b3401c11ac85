// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of one
//! minion connection.
//!
//! A connection starts in registration mode, answering `Register` frames.
//! The first `StreamHello` switches it permanently into command-stream mode:
//! one task drains the minion's outbound queue toward the wire while a
//! receive task persists incoming status updates and results.

use crate::core::protocol::{Frame, FrameCodec};
use crate::core::state::ServerState;
use crate::core::{HiveLinkError, metrics};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// How many times the registry lookup is retried for a stream whose minion
/// registered only moments ago, and the base of its quadratic backoff.
const LOOKUP_RETRIES: u32 = 3;
const LOOKUP_BACKOFF_BASE: Duration = Duration::from_millis(10);

/// Manages the full lifecycle of one accepted minion connection.
pub struct ConnectionHandler {
    framed: Framed<TcpStream, FrameCodec>,
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ConnectionHandler {
    pub fn new(
        socket: TcpStream,
        addr: SocketAddr,
        state: Arc<ServerState>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            framed: Framed::new(socket, FrameCodec),
            addr,
            state,
            shutdown_rx,
        }
    }

    /// The main event loop for the connection.
    pub async fn run(mut self) -> Result<(), HiveLinkError> {
        loop {
            tokio::select! {
                // Prioritize shutdown signals over other events.
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Connection handler for {} received shutdown signal.", self.addr);
                    let _ = self.framed.send(Frame::Error {
                        message: "server is shutting down".to_string(),
                    }).await;
                    return Ok(());
                }
                result = self.framed.next() => {
                    match result {
                        Some(Ok(Frame::Register { info })) => {
                            self.handle_register(info).await?;
                        }
                        Some(Ok(Frame::StreamHello { minion_id })) => {
                            // Mode switch: this connection is now a command stream.
                            return self.run_command_stream(minion_id).await;
                        }
                        Some(Ok(frame)) => {
                            warn!(
                                "Connection from {} opened with unexpected frame {:?}",
                                self.addr, frame
                            );
                            let e = HiveLinkError::Unauthenticated(
                                "expected Register or StreamHello".to_string(),
                            );
                            let _ = self.framed.send(Frame::Error { message: e.to_string() }).await;
                            return Err(e);
                        }
                        Some(Err(e)) => {
                            if is_normal_disconnect(&e) {
                                debug!("Connection from {} closed by peer: {}", self.addr, e);
                                return Ok(());
                            }
                            warn!("Connection error for {}: {}", self.addr, e);
                            return Err(e);
                        }
                        None => {
                            debug!("Connection from {} closed by peer.", self.addr);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Answers one `Register` frame. Registration failures are reported to
    /// the minion in the ack rather than tearing down the connection.
    async fn handle_register(&mut self, info: crate::core::host::HostInfo) -> Result<(), HiveLinkError> {
        debug!(
            "Register from {} (id '{}', host '{}')",
            self.addr, info.id, info.hostname
        );
        let ack = match self.state.registry.register(info).await {
            Ok(outcome) => Frame::RegisterAck {
                success: true,
                assigned_id: outcome.assigned_id,
                error: None,
            },
            Err(e) => {
                warn!("Registration from {} failed: {}", self.addr, e);
                Frame::RegisterAck {
                    success: false,
                    assigned_id: String::new(),
                    error: Some(e.to_string()),
                }
            }
        };
        self.framed.send(ack).await
    }

    /// Serves the bidirectional command stream for `minion_id`.
    async fn run_command_stream(mut self, minion_id: String) -> Result<(), HiveLinkError> {
        if minion_id.is_empty() {
            let e = HiveLinkError::Unauthenticated("missing minion id".to_string());
            let _ = self.framed.send(Frame::Error { message: e.to_string() }).await;
            return Err(e);
        }

        // The minion may open the stream immediately after Register; retry
        // the lookup briefly to absorb propagation lag.
        let Some(channel) = self.lookup_with_retry(&minion_id).await else {
            let e = HiveLinkError::NotFound(format!("minion '{minion_id}' is not registered"));
            let _ = self.framed.send(Frame::Error { message: e.to_string() }).await;
            return Err(e);
        };

        // Holding this guard for the stream's lifetime is what makes the
        // queue single-consumer; a second concurrent stream bounces.
        let Ok(mut command_rx) = channel.try_lock_owned() else {
            warn!(
                "Rejecting duplicate command stream for minion {} from {}",
                minion_id, self.addr
            );
            let e = HiveLinkError::AlreadyBusy;
            let _ = self.framed.send(Frame::Error { message: e.to_string() }).await;
            return Err(e);
        };

        self.state.registry.update_last_seen(&minion_id);
        self.framed.send(Frame::StreamReady).await?;
        info!("Command stream open for minion {} ({})", minion_id, self.addr);
        metrics::CONNECTED_MINIONS.inc();

        let (mut sink, mut stream) = self.framed.split();

        // The receive task persists status updates and results; persistence
        // failures are logged without tearing the stream down.
        let store = self.state.store.clone();
        let recv_minion_id = minion_id.clone();
        let mut recv_task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(Frame::Status { update }) => {
                        debug!(
                            "Minion {} reports {} for command {}",
                            update.minion_id, update.status, update.command_id
                        );
                        if let Err(e) = store
                            .update_command_status(
                                &update.command_id,
                                &update.minion_id,
                                update.status,
                            )
                            .await
                        {
                            warn!(
                                "Failed to persist status for command {}: {}",
                                update.command_id, e
                            );
                        }
                    }
                    Ok(Frame::Result { result }) => {
                        debug!(
                            "Minion {} returned result for command {} (exit {})",
                            result.minion_id, result.command_id, result.exit_code
                        );
                        if let Err(e) = store.store_result(&result).await {
                            warn!(
                                "Failed to persist result for command {}: {}",
                                result.command_id, e
                            );
                        }
                    }
                    Ok(frame) => {
                        debug!(
                            "Ignoring unexpected frame from minion {}: {:?}",
                            recv_minion_id, frame
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        });

        let outcome = loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Command stream for minion {} closing on shutdown.", minion_id);
                    break Ok(());
                }
                join = &mut recv_task => {
                    break match join {
                        Ok(Ok(())) => {
                            debug!("Minion {} closed the command stream.", minion_id);
                            Ok(())
                        }
                        Ok(Err(e)) => Err(e),
                        Err(e) => Err(HiveLinkError::Internal(format!(
                            "receive task for minion {minion_id} failed: {e}"
                        ))),
                    };
                }
                command = command_rx.recv() => {
                    match command {
                        Some(spec) => {
                            debug!(
                                "Delivering command {} to minion {}",
                                spec.id, minion_id
                            );
                            if let Err(e) = sink.send(Frame::Command { spec }).await {
                                break Err(e);
                            }
                            self.state.registry.update_last_seen(&minion_id);
                        }
                        // The queue outlives the record; closure means clean teardown.
                        None => break Ok(()),
                    }
                }
            }
        };

        recv_task.abort();
        metrics::CONNECTED_MINIONS.dec();
        info!("Command stream for minion {} ended.", minion_id);
        outcome
    }

    /// Looks up the minion's command channel, retrying with quadratic
    /// backoff (10, 40, 90 ms) to bridge the register/stream race.
    async fn lookup_with_retry(
        &self,
        minion_id: &str,
    ) -> Option<Arc<tokio::sync::Mutex<tokio::sync::mpsc::Receiver<crate::core::commands::CommandSpec>>>>
    {
        if let Some(channel) = self.state.registry.command_channel(minion_id) {
            return Some(channel);
        }
        for attempt in 1..=LOOKUP_RETRIES {
            tokio::time::sleep(LOOKUP_BACKOFF_BASE * attempt * attempt).await;
            if let Some(channel) = self.state.registry.command_channel(minion_id) {
                debug!(
                    "Registry lookup for minion {} succeeded on retry {}",
                    minion_id, attempt
                );
                return Some(channel);
            }
        }
        None
    }
}

/// Helper function to check for non-critical disconnection errors.
fn is_normal_disconnect(e: &HiveLinkError) -> bool {
    matches!(e, HiveLinkError::Io(arc_err) if matches!(
        arc_err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionAborted
    ))
}
