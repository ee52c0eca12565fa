//! Shared application state handed to every Axum handler.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize};
use std::sync::Arc;

use gateway_resilience::{Bulkhead, Config, SharedResourceGuard};
use gateway_runtime::metrics::MetricsServer;
use gateway_shard::GatewayRouter;
use tokio::sync::broadcast;

/// Everything a handler needs: the router into the shard layer, the two
/// independent admission gates, the loaded configuration, the metrics
/// recorder, and the handful of atomics the `/health` and `/ws` handlers
/// read and update directly rather than routing through a command channel.
#[derive(Clone)]
pub struct AppState {
    /// Routes broker records to shards and exposes per-client shard lookup.
    pub router: Arc<GatewayRouter>,
    /// CPU-threshold admission/consumption gate, sampled by the background sampler.
    pub resource_guard: SharedResourceGuard,
    /// Connection-count admission semaphore; a permit is held for a connection's entire lifetime.
    pub admission: Arc<Bulkhead>,
    /// The loaded, validated configuration.
    pub config: Arc<Config>,
    /// The Prometheus recorder, rendered by both `/metrics` and `/stats`.
    pub metrics: Arc<MetricsServer>,
    /// Whether the consumer pool currently holds a live broker connection.
    pub broker_connected: Arc<AtomicBool>,
    /// Currently open WebSocket connections, mirrored in `ws_connections_current`.
    pub connections_current: Arc<AtomicUsize>,
    /// Monotonic client id allocator.
    next_client_id: Arc<AtomicU64>,
    /// Flipped to `false` as the first step of graceful shutdown; `/ws` and
    /// `/health` both consult it.
    pub accepting: Arc<AtomicBool>,
    /// Broadcast a connection's writer pump subscribes to at connection
    /// start; a send on this forcibly closes every still-open socket with a
    /// server-initiated close frame once the drain grace period has elapsed.
    pub shutdown: broadcast::Sender<()>,
    /// Process start time, for `/health`'s `uptime` field.
    pub started_at: std::time::Instant,
}

impl AppState {
    /// Build application state around an already-running router, guard, and
    /// admission bulkhead.
    #[must_use]
    pub fn new(
        router: Arc<GatewayRouter>,
        resource_guard: SharedResourceGuard,
        admission: Arc<Bulkhead>,
        config: Arc<Config>,
        metrics: Arc<MetricsServer>,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            router,
            resource_guard,
            admission,
            config,
            metrics,
            broker_connected: Arc::new(AtomicBool::new(false)),
            connections_current: Arc::new(AtomicUsize::new(0)),
            next_client_id: Arc::new(AtomicU64::new(1)),
            accepting: Arc::new(AtomicBool::new(true)),
            shutdown,
            started_at: std::time::Instant::now(),
        }
    }

    /// Allocate the next client id. Ids are never reused within a process
    /// lifetime.
    pub fn allocate_client_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gateway_core::{Channel, RouterProjection};
    use gateway_resilience::{BulkheadConfig, ResourceGuard, ResourceGuardConfig};
    use std::net::SocketAddr;

    fn sample_config() -> Config {
        Config {
            environment: gateway_resilience::Environment::Development,
            max_connections: 10,
            shard_count: 1,
            worker_pool_size: 1,
            worker_queue_size: 1,
            max_goroutines: 100,
            cpu_reject_threshold: 75.0,
            cpu_pause_threshold: 80.0,
            max_memory_mb: 4096.0,
            max_kafka_rate: 0,
            max_broadcast_rate: 0,
            kafka_brokers: vec!["localhost:9092".to_string()],
            kafka_group_id: "test".to_string(),
            kafka_topics: [
                "trades".to_string(),
                "liquidity".to_string(),
                "metadata".to_string(),
                "social".to_string(),
                "community".to_string(),
                "creation".to_string(),
                "analytics".to_string(),
                "balances".to_string(),
            ],
            replay_buffer_size: 10,
            send_queue_size: 16,
            shutdown_grace: std::time::Duration::from_secs(1),
            bind_addr: "0.0.0.0:0".to_string(),
        }
    }

    fn state() -> AppState {
        let projection = Arc::new(RouterProjection::<Channel, usize>::new());
        let router = Arc::new(GatewayRouter::new(projection, Vec::new()));
        let guard = Arc::new(ResourceGuard::new(ResourceGuardConfig {
            cpu_reject_threshold: 75.0,
            cpu_pause_threshold: 80.0,
        }));
        let admission = Arc::new(Bulkhead::new(
            "ws_admission".to_string(),
            BulkheadConfig { max_concurrent: 10, acquire_timeout: std::time::Duration::from_secs(1) },
        ));
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let metrics = Arc::new(MetricsServer::new(addr));

        AppState::new(router, guard, admission, Arc::new(sample_config()), metrics)
    }

    #[test]
    fn allocate_client_id_is_monotonic_and_starts_at_one() {
        let state = state();
        assert_eq!(state.allocate_client_id(), 1);
        assert_eq!(state.allocate_client_id(), 2);
    }

    #[test]
    fn starts_accepting_with_no_connections() {
        let state = state();
        assert!(state.accepting.load(std::sync::atomic::Ordering::Relaxed));
        assert_eq!(state.connections_current.load(std::sync::atomic::Ordering::Relaxed), 0);
    }
}
