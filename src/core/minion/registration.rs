// src/core/minion/registration.rs

//! The registration client: announces host info to the nexus and waits for
//! the acknowledgement carrying the authoritative minion id.
//!
//! Each call opens a short-lived connection, which keeps registration
//! independent of the command stream's state — exactly what the
//! re-register-before-reconnect rule needs.

use crate::core::host::HostInfo;
use crate::core::protocol::{Frame, FrameCodec};
use crate::core::HiveLinkError;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

#[derive(Clone)]
pub struct RegistrationClient {
    nexus_addr: String,
    ack_timeout: Duration,
}

impl RegistrationClient {
    pub fn new(nexus_addr: String, ack_timeout: Duration) -> Self {
        Self {
            nexus_addr,
            ack_timeout,
        }
    }

    /// Sends one `Register` round-trip and returns the id the nexus assigned
    /// (which equals the announced id unless that was empty).
    pub async fn register(&self, info: &HostInfo) -> Result<String, HiveLinkError> {
        debug!(
            "Registering with nexus at {} as '{}'",
            self.nexus_addr,
            if info.id.is_empty() { "<new>" } else { &info.id }
        );
        let tcp = TcpStream::connect(&self.nexus_addr).await.map_err(|e| {
            HiveLinkError::Transport(format!("failed to connect to {}: {e}", self.nexus_addr))
        })?;
        let mut framed = Framed::new(tcp, FrameCodec);
        framed
            .send(Frame::Register { info: info.clone() })
            .await?;

        let reply = tokio::time::timeout(self.ack_timeout, framed.next())
            .await
            .map_err(|_| {
                HiveLinkError::Timeout(format!(
                    "registration ack exceeded {:?}",
                    self.ack_timeout
                ))
            })?;
        match reply {
            Some(Ok(Frame::RegisterAck {
                success: true,
                assigned_id,
                ..
            })) => Ok(assigned_id),
            Some(Ok(Frame::RegisterAck {
                success: false,
                error,
                ..
            })) => Err(HiveLinkError::Transport(format!(
                "registration rejected: {}",
                error.unwrap_or_else(|| "unknown reason".to_string())
            ))),
            Some(Ok(frame)) => Err(HiveLinkError::Protocol(format!(
                "expected RegisterAck, got {frame:?}"
            ))),
            Some(Err(e)) => Err(e),
            None => Err(HiveLinkError::Transport(
                "connection closed before registration ack".to_string(),
            )),
        }
    }
}
