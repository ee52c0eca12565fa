//! Prometheus metrics for the gateway's connection, shard, and Kafka ingest
//! surfaces.
//!
//! # Example
//!
//! ```rust,no_run
//! use gateway_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

pub use metrics::{counter, gauge};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build the metrics exporter.
    #[error("failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install the metrics exporter (e.g. already installed).
    #[error("failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder, exposed via `/metrics`.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a metrics server bound to `addr` (informational only — the
    /// gateway serves `/metrics` on the same Axum router as `/ws`, not a
    /// separate listener; `addr` is retained for logging).
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the Prometheus recorder and register every metric
    /// description. Idempotent: if a recorder is already installed (as can
    /// happen across multiple tests in one process), this logs and succeeds
    /// rather than erroring.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] or [`MetricsError::Install`] if the
    /// exporter cannot be constructed or installed for any other reason.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new();

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("already initialized") {
                    tracing::warn!("metrics recorder already initialized, skipping");
                    Ok(())
                } else {
                    Err(MetricsError::Install(msg))
                }
            },
        }
    }

    /// Render current metrics in Prometheus text exposition format.
    ///
    /// Returns `None` if [`MetricsServer::start`] hasn't been called yet.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!("ws_connections_total", "Total WebSocket connections accepted");
    describe_gauge!("ws_connections_current", "Currently open WebSocket connections");
    describe_counter!("ws_connections_failed_total", "Upgrade attempts rejected or failed");

    describe_counter!("ws_messages_sent_total", "Envelopes written to client sockets");
    describe_counter!("ws_messages_received_total", "Control frames read from client sockets");
    describe_counter!("ws_bytes_sent_total", "Bytes written to client sockets");
    describe_counter!("ws_bytes_received_total", "Bytes read from client sockets");

    describe_counter!("ws_slow_clients_disconnected_total", "Clients evicted for send-queue exhaustion");
    describe_counter!("ws_rate_limited_messages_total", "Client frames dropped by the rate limiter");
    describe_counter!("ws_replay_requests_total", "Replay control frames handled");

    describe_counter!("ws_kafka_messages_received_total", "Broker records polled");
    describe_counter!("ws_kafka_messages_dropped_total", "Broker records dropped (shard channel full)");
    describe_counter!("ws_kafka_commit_errors_total", "Offset commit failures");
    describe_gauge!("ws_kafka_connected", "1 if the consumer pool holds a live broker connection, else 0");

    describe_gauge!("ws_cpu_percent", "Rolling CPU sample used by the resource guard");
    describe_gauge!("ws_memory_mb", "Resident memory in megabytes");
    describe_gauge!("ws_goroutines", "Live tokio task count (goroutine analogue)");

    describe_gauge!("ws_shard_clients", "Clients currently assigned to a shard");
    describe_counter!("ws_shard_messages_sent_total", "Envelopes enqueued by a shard");
    describe_counter!("ws_shard_messages_dropped_total", "Envelopes dropped by a shard (send queue full)");
}

/// Connection lifecycle metrics.
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    /// Record a successful upgrade.
    pub fn record_connected() {
        counter!("ws_connections_total").increment(1);
        gauge!("ws_connections_current").increment(1.0);
    }

    /// Record a connection closing, for any reason.
    pub fn record_disconnected() {
        gauge!("ws_connections_current").decrement(1.0);
    }

    /// Record an upgrade rejected at admission (capacity) or failed outright.
    pub fn record_failed() {
        counter!("ws_connections_failed_total").increment(1);
    }

    /// Record a message written to a client socket.
    pub fn record_sent(bytes: usize) {
        counter!("ws_messages_sent_total").increment(1);
        counter!("ws_bytes_sent_total").increment(bytes as u64);
    }

    /// Record a control frame read from a client socket.
    pub fn record_received(bytes: usize) {
        counter!("ws_messages_received_total").increment(1);
        counter!("ws_bytes_received_total").increment(bytes as u64);
    }

    /// Record a slow-client eviction (three consecutive send-queue failures).
    pub fn record_slow_client_disconnected() {
        counter!("ws_slow_clients_disconnected_total").increment(1);
    }

    /// Record a client frame dropped by the rate limiter.
    pub fn record_rate_limited() {
        counter!("ws_rate_limited_messages_total").increment(1);
    }

    /// Record a handled `replay` control frame.
    pub fn record_replay_request() {
        counter!("ws_replay_requests_total").increment(1);
    }
}

/// Kafka consumer pool metrics.
pub struct KafkaMetrics;

impl KafkaMetrics {
    /// Record records polled off the broker in one fetch.
    pub fn record_received(count: u64) {
        counter!("ws_kafka_messages_received_total").increment(count);
    }

    /// Record `count` records dropped because their target shard's channel was full.
    pub fn record_dropped(count: u64) {
        counter!("ws_kafka_messages_dropped_total").increment(count);
    }

    /// Record an offset commit failure.
    pub fn record_commit_error() {
        counter!("ws_kafka_commit_errors_total").increment(1);
    }

    /// Report whether the consumer pool currently holds a live connection.
    pub fn set_connected(connected: bool) {
        gauge!("ws_kafka_connected").set(if connected { 1.0 } else { 0.0 });
    }
}

/// Resource guard gauges, sampled on the guard's periodic tick.
pub struct ResourceMetrics;

impl ResourceMetrics {
    /// Report the current rolling CPU sample.
    pub fn set_cpu_percent(percent: f64) {
        gauge!("ws_cpu_percent").set(percent);
    }

    /// Report resident memory in megabytes.
    pub fn set_memory_mb(mb: f64) {
        gauge!("ws_memory_mb").set(mb);
    }

    /// Report the live tokio task count.
    pub fn set_goroutines(count: f64) {
        gauge!("ws_goroutines").set(count);
    }
}

/// Per-shard metrics, recorded with a `shard` label.
pub struct ShardMetrics;

impl ShardMetrics {
    /// Report the client count currently assigned to `shard_id`.
    pub fn set_clients(shard_id: usize, count: f64) {
        gauge!("ws_shard_clients", "shard" => shard_id.to_string()).set(count);
    }

    /// Record envelopes successfully enqueued by `shard_id`.
    pub fn record_sent(shard_id: usize, count: u64) {
        counter!("ws_shard_messages_sent_total", "shard" => shard_id.to_string()).increment(count);
    }

    /// Record envelopes dropped by `shard_id` (client send queue full).
    pub fn record_dropped(shard_id: usize, count: u64) {
        counter!("ws_shard_messages_dropped_total", "shard" => shard_id.to_string()).increment(count);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn metrics_server_starts_without_error() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        let result = server.start();
        assert!(result.is_ok());
    }

    #[test]
    fn recording_metrics_does_not_panic() {
        ConnectionMetrics::record_connected();
        ConnectionMetrics::record_sent(128);
        KafkaMetrics::record_received(10);
        ShardMetrics::set_clients(0, 42.0);
    }
}
