// src/core/minion/connection.rs

//! Manages the minion's command-stream connection to the nexus.
//!
//! The manager owns the stream, a `connecting` guard against duplicate
//! concurrent attempts, and the reconnection policy. A connection counts as
//! established only once the nexus has answered the `StreamHello` with
//! `StreamReady`; that keeps the client blind to the server-side
//! registration race.

use super::MinionIdentity;
use crate::config::{MinionConfig, ReconnectConfig};
use crate::core::backoff::ReconnectionPolicy;
use crate::core::protocol::{Frame, FrameCodec};
use crate::core::HiveLinkError;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// The framed, bidirectional command stream.
pub type MinionStream = Framed<TcpStream, FrameCodec>;

/// How a backoff-aware reconnection attempt ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    Connected,
    /// The shutdown signal fired during the backoff sleep.
    Aborted,
}

#[derive(Default)]
struct ConnState {
    stream: Option<Arc<Mutex<MinionStream>>>,
    connected: bool,
    connecting: bool,
}

pub struct ConnectionManager {
    nexus_addr: String,
    identity: MinionIdentity,
    handshake_timeout: Duration,
    state: Mutex<ConnState>,
    policy: ReconnectionPolicy,
}

impl ConnectionManager {
    pub fn new(
        config: &MinionConfig,
        identity: MinionIdentity,
        reconnect: &ReconnectConfig,
    ) -> Self {
        Self {
            nexus_addr: config.nexus_addr.clone(),
            identity,
            handshake_timeout: config.handshake_timeout,
            state: Mutex::new(ConnState::default()),
            policy: ReconnectionPolicy::new(reconnect),
        }
    }

    /// Establishes the command stream. A second caller while an attempt is
    /// in flight fails fast with `AlreadyBusy`.
    pub async fn connect(&self) -> Result<(), HiveLinkError> {
        {
            let mut state = self.state.lock().await;
            if state.connecting {
                return Err(HiveLinkError::AlreadyBusy);
            }
            state.connecting = true;
        }

        let result = self.open_stream().await;
        self.finish_attempt(result).await
    }

    /// Backoff-aware reconnection: compute the next delay, sleep through it
    /// (abandoning on shutdown), then attempt a fresh stream.
    pub async fn handle_reconnection(
        &self,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<ReconnectOutcome, HiveLinkError> {
        {
            let mut state = self.state.lock().await;
            if state.connecting {
                return Err(HiveLinkError::AlreadyBusy);
            }
            state.connecting = true;
        }

        let delay = self.policy.next_delay();
        info!(
            "Reconnecting to nexus in {:?} (attempt {})",
            delay,
            self.policy.attempt_count()
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.recv() => {
                self.state.lock().await.connecting = false;
                return Ok(ReconnectOutcome::Aborted);
            }
        }

        let result = self.open_stream().await;
        self.finish_attempt(result)
            .await
            .map(|_| ReconnectOutcome::Connected)
    }

    /// Half-closes the send side of the stream, if any, and clears state.
    pub async fn disconnect(&self) {
        let stream = {
            let mut state = self.state.lock().await;
            state.connected = false;
            state.stream.take()
        };
        if let Some(stream) = stream {
            let mut guard = stream.lock().await;
            if let Err(e) = guard.close().await {
                debug!("Error closing stream to nexus: {e}");
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        let state = self.state.lock().await;
        state.connected && state.stream.is_some()
    }

    /// The active stream handle, or an error when not connected.
    pub async fn stream(&self) -> Result<Arc<Mutex<MinionStream>>, HiveLinkError> {
        let state = self.state.lock().await;
        state
            .stream
            .clone()
            .filter(|_| state.connected)
            .ok_or_else(|| HiveLinkError::Transport("not connected to nexus".to_string()))
    }

    async fn finish_attempt(
        &self,
        result: Result<MinionStream, HiveLinkError>,
    ) -> Result<(), HiveLinkError> {
        let mut state = self.state.lock().await;
        state.connecting = false;
        match result {
            Ok(framed) => {
                state.stream = Some(Arc::new(Mutex::new(framed)));
                state.connected = true;
                drop(state);
                self.policy.reset();
                info!("Command stream to nexus established.");
                Ok(())
            }
            Err(e) => {
                state.connected = false;
                state.stream = None;
                warn!("Failed to establish command stream: {e}");
                Err(e)
            }
        }
    }

    /// Dials the nexus and performs the hello/ready handshake.
    async fn open_stream(&self) -> Result<MinionStream, HiveLinkError> {
        let minion_id = self.identity.get();
        debug!(
            "Opening command stream to {} as minion '{}'",
            self.nexus_addr, minion_id
        );
        let tcp = TcpStream::connect(&self.nexus_addr).await.map_err(|e| {
            HiveLinkError::Transport(format!("failed to connect to {}: {e}", self.nexus_addr))
        })?;
        let mut framed = Framed::new(tcp, FrameCodec);
        framed.send(Frame::StreamHello { minion_id }).await?;

        let reply = tokio::time::timeout(self.handshake_timeout, framed.next())
            .await
            .map_err(|_| {
                HiveLinkError::Timeout(format!(
                    "stream handshake exceeded {:?}",
                    self.handshake_timeout
                ))
            })?;
        match reply {
            Some(Ok(Frame::StreamReady)) => Ok(framed),
            Some(Ok(Frame::Error { message })) => {
                Err(HiveLinkError::Transport(format!("nexus refused stream: {message}")))
            }
            Some(Ok(frame)) => Err(HiveLinkError::Protocol(format!(
                "expected StreamReady, got {frame:?}"
            ))),
            Some(Err(e)) => Err(e),
            None => Err(HiveLinkError::Transport(
                "connection closed during handshake".to_string(),
            )),
        }
    }
}
