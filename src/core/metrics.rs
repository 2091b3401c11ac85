// src/core/metrics.rs

//! Defines and registers Prometheus metrics for nexus monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, TextEncoder, register_counter, register_gauge, register_histogram,
};

lazy_static! {
    // --- Gauges ---
    /// The number of minions currently holding an open command stream.
    pub static ref CONNECTED_MINIONS: Gauge =
        register_gauge!("hivelink_connected_minions", "Number of minions with an active command stream.").unwrap();

    // --- Counters ---
    /// The total number of TCP connections accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("hivelink_connections_received_total", "Total number of connections received.").unwrap();
    /// The total number of successful Register calls, including heartbeats.
    pub static ref REGISTRATIONS_TOTAL: Counter =
        register_counter!("hivelink_registrations_total", "Total number of successful minion registrations.").unwrap();
    /// The total number of commands placed onto minion queues.
    pub static ref COMMANDS_DISPATCHED_TOTAL: Counter =
        register_counter!("hivelink_commands_dispatched_total", "Total number of commands enqueued toward minions.").unwrap();
    /// The total number of per-target enqueue attempts that hit the timeout.
    pub static ref DISPATCH_ENQUEUE_TIMEOUTS_TOTAL: Counter =
        register_counter!("hivelink_dispatch_enqueue_timeouts_total", "Total number of dispatch enqueue timeouts.").unwrap();
    /// The total number of command results persisted.
    pub static ref RESULTS_STORED_TOTAL: Counter =
        register_counter!("hivelink_results_stored_total", "Total number of command results persisted.").unwrap();

    // --- Histograms ---
    /// A histogram of store write latencies.
    pub static ref STORE_WRITE_SECONDS: Histogram =
        register_histogram!("hivelink_store_write_seconds", "Latency of result-store write operations in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
