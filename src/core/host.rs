// src/core/host.rs

//! Worker identity and host metadata, plus best-effort local introspection
//! used by the minion when it registers.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, ToSocketAddrs, UdpSocket};
use sysinfo::System;

/// Identity and metadata for a worker as exchanged at registration and kept
/// in the nexus registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    /// Unique minion identifier. May be empty on first registration, in
    /// which case the nexus assigns one.
    pub id: String,
    pub hostname: String,
    pub ip: String,
    pub os: String,
    /// Unix seconds of the last contact, as recorded by the registry.
    pub last_seen: i64,
    /// Free-form key/value tags. Always present; empty when unset.
    #[serde(default)]
    pub tags: IndexMap<String, String>,
}

impl HostInfo {
    /// Collects host info for the local machine.
    ///
    /// Hostname and OS come from the system; the IP is the best-effort
    /// outbound interface address (see [`outbound_ip`]).
    pub fn collect(id: String, tags: IndexMap<String, String>) -> Self {
        let hostname = System::host_name().unwrap_or_else(|| "unknown".to_string());
        let os = System::long_os_version()
            .or_else(System::name)
            .unwrap_or_else(|| std::env::consts::OS.to_string());
        Self {
            id,
            hostname,
            ip: outbound_ip(),
            os,
            last_seen: chrono::Utc::now().timestamp(),
            tags,
        }
    }
}

/// Infers the local address of the default outbound interface by "connecting"
/// a UDP socket toward a public address. No packet is sent; the OS simply
/// resolves the route. Without a default route, falls back to the first
/// non-loopback IPv4 the hostname resolves to, then to loopback.
pub fn outbound_ip() -> String {
    let probe = || -> std::io::Result<String> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:80")?;
        Ok(socket.local_addr()?.ip().to_string())
    };
    probe()
        .ok()
        .or_else(first_non_loopback_ipv4)
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

fn first_non_loopback_ipv4() -> Option<String> {
    let hostname = System::host_name()?;
    (hostname.as_str(), 0u16)
        .to_socket_addrs()
        .ok()?
        .find_map(|addr| match addr.ip() {
            IpAddr::V4(v4) if !v4.is_loopback() => Some(v4.to_string()),
            _ => None,
        })
}
