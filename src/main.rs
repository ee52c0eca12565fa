//! Gateway binary entry point: loads configuration, wires the shard layer
//! and the consumer pool, serves the HTTP/WebSocket router on one listener,
//! and drains connections on shutdown within the configured grace period.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use gateway_core::{Channel, RouterProjection};
use gateway_kafka::{ConsumerPool, ConsumerPoolConfig};
use gateway_resilience::rate_limiter::{RateLimiter, RateLimiterConfig};
use gateway_resilience::{
    sampler, wait_for_signal, Bulkhead, BulkheadConfig, Config, Environment, ResourceGuard,
    ResourceGuardConfig,
};
use gateway_runtime::metrics::MetricsServer;
use gateway_shard::{GatewayRouter, ShardConfig};
use gateway_web::AppState;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    init_tracing(config.environment);
    info!(environment = %config.environment, shard_count = config.shard_count, "starting gateway");

    let config = Arc::new(config);
    let bind_addr: SocketAddr = config.bind_addr.parse()?;

    let mut metrics_server = MetricsServer::new(bind_addr);
    metrics_server.start().map_err(|err| err.to_string())?;
    let metrics_server = Arc::new(metrics_server);

    let resource_guard = Arc::new(ResourceGuard::new(ResourceGuardConfig {
        cpu_reject_threshold: config.cpu_reject_threshold,
        cpu_pause_threshold: config.cpu_pause_threshold,
    }));

    let admission = Arc::new(Bulkhead::new(
        "ws_admission".to_string(),
        BulkheadConfig { max_concurrent: config.max_connections, acquire_timeout: Duration::from_secs(5) },
    ));

    let projection = Arc::new(RouterProjection::<Channel, usize>::new());
    let shards = (0..config.shard_count)
        .map(|shard_id| {
            gateway_shard::spawn(
                ShardConfig { shard_id, replay_buffer_size: config.replay_buffer_size, ..ShardConfig::default() },
                Arc::clone(&projection),
            )
        })
        .collect();
    let router = Arc::new(GatewayRouter::new(projection, shards));

    let state = AppState::new(
        Arc::clone(&router),
        Arc::clone(&resource_guard),
        Arc::clone(&admission),
        Arc::clone(&config),
        Arc::clone(&metrics_server),
    );

    let sampler_handle = sampler::spawn(
        Arc::clone(&resource_guard),
        Arc::clone(&state.connections_current),
        config.shard_count,
        config.worker_pool_size,
        Duration::from_secs(5),
    );

    let projection_sweep_handle = spawn_projection_sweep(Arc::clone(router.projection()));

    let kafka_rate_limiter = Arc::new(RateLimiter::new("kafka_consume".to_string(), rate_limiter_config(config.max_kafka_rate)));

    let consumer_pool = ConsumerPool::spawn(
        ConsumerPoolConfig {
            brokers: config.kafka_brokers.clone(),
            group_id: config.kafka_group_id.clone(),
            topics: config.kafka_topics.clone(),
            worker_count: config.worker_pool_size.max(1),
            ..ConsumerPoolConfig::default()
        },
        router,
        kafka_rate_limiter,
        Arc::clone(&resource_guard),
        Arc::clone(&state.broker_connected),
    )
    .await?;

    let app = gateway_web::router(state.clone());
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "listening for websocket connections");

    let server_handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(error = %err, "http server exited with an error");
        }
    });

    wait_for_signal().await;
    info!("shutdown signal received, draining connections");

    // (i)+(ii) reject new upgrades; the listener itself stays open, but
    // `/ws` now answers 503 (see `handlers::websocket::handle`).
    state.accepting.store(false, Ordering::Relaxed);

    // (iii) stop the consumer pool: finishes any in-flight batch and commits.
    consumer_pool.shutdown().await;

    // (iv) wait up to the grace period for connections to drain on their own.
    let deadline = tokio::time::Instant::now() + config.shutdown_grace;
    while state.connections_current.load(Ordering::Relaxed) > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    // (v) forcibly close whatever is still open with a server-initiated close.
    let remaining = state.connections_current.load(Ordering::Relaxed);
    if remaining > 0 {
        warn!(remaining, "shutdown grace period elapsed, forcibly closing remaining sockets");
        let _ = state.shutdown.send(());
    }

    // (vi) stop accepting entirely and stop the sampler, then (vii) return.
    // Already-accepted connections are independent tasks and are unaffected
    // by this — they've already been told to close in step (v).
    server_handle.abort();
    sampler_handle.abort();
    projection_sweep_handle.abort();

    info!("shutdown complete");
    Ok(())
}

/// Periodically prune the router projection's empty channel entries, per
/// spec §4.3's "~60s" sweep. The write-through paths already remove empty
/// entries eagerly on last-unsubscribe, so this is a backstop rather than
/// the primary cleanup mechanism.
fn spawn_projection_sweep(
    projection: Arc<RouterProjection<Channel, usize>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            projection.prune_empty();
        }
    })
}

/// Map the `max_kafka_rate` config knob (0 = unlimited) onto a token-bucket
/// config with enough burst headroom for the unlimited case to never gate.
fn rate_limiter_config(max_kafka_rate: u32) -> RateLimiterConfig {
    if max_kafka_rate == 0 {
        RateLimiterConfig { capacity: usize::from(u16::MAX), refill_rate: f64::from(u32::MAX) }
    } else {
        RateLimiterConfig { capacity: (max_kafka_rate as usize) * 2, refill_rate: f64::from(max_kafka_rate) }
    }
}

fn init_tracing(environment: Environment) {
    let default_directive = environment.default_log_level();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
