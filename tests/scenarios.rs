//! End-to-end scenario tests against a real HTTP/WebSocket listener.
//!
//! Each test wires the same pieces `main.rs` does (router projection, shard
//! spawn, `GatewayRouter`, `AppState`, the Axum router) onto an ephemeral
//! `127.0.0.1:0` listener, then drives it with a real `tokio-tungstenite`
//! client. Broker records are injected directly through
//! [`gateway_kafka::RecordSink::route`] rather than a running Kafka cluster,
//! consistent with the consumer pool's own unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use gateway_core::{BroadcastRecord, Channel, RouterProjection};
use gateway_kafka::RecordSink;
use gateway_resilience::{Bulkhead, BulkheadConfig, Config, Environment, ResourceGuard, ResourceGuardConfig};
use gateway_runtime::MetricsServer;
use gateway_shard::{GatewayRouter, ShardConfig};
use gateway_web::AppState;
use serde_json::value::RawValue;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

fn test_config(shard_count: usize, max_connections: usize, send_queue_size: usize) -> Config {
    Config {
        environment: Environment::Development,
        max_connections,
        shard_count,
        worker_pool_size: 1,
        worker_queue_size: 1,
        max_goroutines: 1000,
        cpu_reject_threshold: 75.0,
        cpu_pause_threshold: 80.0,
        max_memory_mb: 4096.0,
        max_kafka_rate: 0,
        max_broadcast_rate: 0,
        kafka_brokers: vec!["localhost:9092".to_string()],
        kafka_group_id: "scenario-test".to_string(),
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
        send_queue_size,
        shutdown_grace: Duration::from_secs(1),
        bind_addr: "127.0.0.1:0".to_string(),
    }
}

struct Harness {
    addr: SocketAddr,
    router: Arc<GatewayRouter>,
    state: AppState,
    server: tokio::task::JoinHandle<()>,
}

impl Harness {
    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

async fn start(config: Config) -> Harness {
    let config = Arc::new(config);
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

    let resource_guard = Arc::new(ResourceGuard::new(ResourceGuardConfig {
        cpu_reject_threshold: config.cpu_reject_threshold,
        cpu_pause_threshold: config.cpu_pause_threshold,
    }));
    let admission = Arc::new(Bulkhead::new(
        "ws_admission".to_string(),
        BulkheadConfig { max_concurrent: config.max_connections, acquire_timeout: Duration::from_millis(300) },
    ));
    let metrics_addr: SocketAddr = "127.0.0.1:0".parse().expect("valid metrics addr");
    let metrics_server = Arc::new(MetricsServer::new(metrics_addr));

    let state =
        AppState::new(Arc::clone(&router), resource_guard, admission, Arc::clone(&config), metrics_server);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("listener has a local addr");
    let app = gateway_web::router(state.clone());
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    // Give the accept loop a moment to start listening.
    tokio::time::sleep(Duration::from_millis(20)).await;
    Harness { addr, router, state, server }
}

fn payload(n: i64) -> Box<RawValue> {
    RawValue::from_string(format!(r#"{{"n":{n}}}"#)).expect("valid json")
}

async fn subscribe(socket: &mut (impl SinkExt<WsMessage> + Unpin), channel: &str) {
    let frame = format!(r#"{{"type":"subscribe","data":{{"channels":["{channel}"]}}}}"#);
    let _ = socket.send(WsMessage::Text(frame)).await;
}

async fn next_text(
    socket: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
) -> serde_json::Value {
    let msg = tokio::time::timeout(Duration::from_secs(1), socket.next())
        .await
        .expect("frame arrives before timeout")
        .expect("stream is still open")
        .expect("frame is a valid websocket message");
    let WsMessage::Text(text) = msg else { panic!("expected a text frame, got {msg:?}") };
    serde_json::from_str(&text).expect("frame is valid json")
}

#[tokio::test]
async fn scenario_1_fan_out_correctness() {
    let harness = start(test_config(2, 100, 16)).await;

    let (mut a, _) = tokio_tungstenite::connect_async(harness.ws_url()).await.expect("client a connects");
    let (mut b, _) = tokio_tungstenite::connect_async(harness.ws_url()).await.expect("client b connects");
    subscribe(&mut a, "token.BTC").await;
    subscribe(&mut b, "token.BTC").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let record = BroadcastRecord::new("trade", 1_700_000_000_000, payload(1));
    harness.router.route(&Channel::token("BTC"), record);

    for client in [&mut a, &mut b] {
        let value = next_text(client).await;
        assert_eq!(value["seq"], 1);
        assert_eq!(value["type"], "trade");
        assert_eq!(value["data"]["n"], 1);
    }

    harness.server.abort();
}

#[tokio::test]
async fn scenario_2_replay_after_gap() {
    let harness = start(test_config(1, 100, 16)).await;

    let (mut c, _) = tokio_tungstenite::connect_async(harness.ws_url()).await.expect("client connects");
    subscribe(&mut c, "token.ETH").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    for n in 1..=5 {
        let record = BroadcastRecord::new("trade", 1_700_000_000_000 + n, payload(n));
        harness.router.route(&Channel::token("ETH"), record);
    }

    // Read all five live envelopes; the third is deliberately not inspected,
    // simulating the client having missed it on the wire.
    for expected_seq in 1..=5 {
        let value = next_text(&mut c).await;
        assert_eq!(value["seq"], expected_seq);
    }

    c.send(WsMessage::Text(r#"{"type":"replay","data":{"from":3,"to":3}}"#.to_string())).await.expect("send replay request");

    let replayed = next_text(&mut c).await;
    assert_eq!(replayed["seq"], 3);
    assert_eq!(replayed["data"]["n"], 3);

    harness.server.abort();
}

#[tokio::test]
async fn scenario_4_admission_ceiling_returns_503() {
    let harness = start(test_config(1, 2, 16)).await;

    let (_e, _) = tokio_tungstenite::connect_async(harness.ws_url()).await.expect("first connection admitted");
    let (_f, _) = tokio_tungstenite::connect_async(harness.ws_url()).await.expect("second connection admitted");

    let third = tokio_tungstenite::connect_async(harness.ws_url()).await;
    assert!(third.is_err(), "third connection should be rejected once the bulkhead is exhausted");

    harness.server.abort();
}

#[tokio::test]
async fn scenario_6_shutdown_drain_forces_close_with_1001() {
    let harness = start(test_config(1, 100, 16)).await;

    let (mut client, _) = tokio_tungstenite::connect_async(harness.ws_url()).await.expect("client connects");
    tokio::time::sleep(Duration::from_millis(20)).await;

    harness.state.shutdown.send(()).expect("at least one subscriber is listening");

    let msg = tokio::time::timeout(Duration::from_secs(1), client.next())
        .await
        .expect("close frame arrives before timeout")
        .expect("stream is still open")
        .expect("frame is a valid websocket message");

    match msg {
        WsMessage::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1001),
        other => panic!("expected a server-initiated close frame, got {other:?}"),
    }

    harness.server.abort();
}
