//! The `/ws` upgrade handler and per-connection read/write pumps.
//!
//! Admission is two independent gates, both checked before the upgrade
//! response is sent: [`gateway_resilience::ResourceGuard::should_admit`]
//! (CPU-based, synchronous) and the connection-count
//! [`gateway_resilience::Bulkhead`] (a permit held for the connection's
//! entire lifetime, not just the upgrade). Once admitted, the connection is
//! handed to its assigned shard and split into independent reader and writer
//! halves.

use std::borrow::Cow;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use gateway_core::{Bundle, Channel, Control, ErrorFrame, SubscribeRequest};
use gateway_resilience::{RateLimiter, RateLimiterConfig};
use gateway_runtime::metrics::ConnectionMetrics;
use gateway_shard::{ClientFrame, ShardError, ShardHandle, POLICY_VIOLATION_CLOSE_CODE};
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(27);
const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const PER_CLIENT_RATE_CAPACITY: usize = 100;
const PER_CLIENT_RATE_REFILL: f64 = 10.0;
/// WebSocket close code for a server-initiated close during shutdown drain.
const SERVER_SHUTDOWN_CLOSE_CODE: u16 = 1001;

/// `GET /ws`. Checks admission, allocates a client id, and upgrades.
pub async fn handle(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if !state.accepting.load(Ordering::Relaxed) {
        ConnectionMetrics::record_failed();
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }

    if !state.resource_guard.should_admit() {
        ConnectionMetrics::record_failed();
        return (StatusCode::SERVICE_UNAVAILABLE, "server at capacity").into_response();
    }

    let permit = match state.admission.acquire_permit().await {
        Ok(permit) => permit,
        Err(reason) => {
            warn!(reason, "admission bulkhead rejected connection");
            ConnectionMetrics::record_failed();
            return (StatusCode::SERVICE_UNAVAILABLE, "server at capacity").into_response();
        },
    };

    let client_id = state.allocate_client_id();
    ws.on_upgrade(move |socket| async move {
        handle_socket(socket, state, client_id).await;
        drop(permit);
    })
    .into_response()
}

async fn handle_socket(socket: WebSocket, state: AppState, client_id: u64) {
    ConnectionMetrics::record_connected();
    state.connections_current.fetch_add(1, Ordering::Relaxed);

    let shard = state.router.shard_for_client(client_id).clone();
    let (client_tx, client_rx) = mpsc::channel::<ClientFrame>(state.config.send_queue_size);

    if shard.register(client_id, client_tx).await.is_err() {
        warn!(client_id, "shard unavailable at register time");
        ConnectionMetrics::record_disconnected();
        state.connections_current.fetch_sub(1, Ordering::Relaxed);
        return;
    }

    let (error_tx, error_rx) = mpsc::channel::<ErrorFrame>(16);
    let (ws_sink, ws_stream) = socket.split();
    let close_notify = Arc::new(Notify::new());
    let shutdown_rx = state.shutdown.subscribe();

    let writer = tokio::spawn(run_writer(ws_sink, client_rx, error_rx, Arc::clone(&close_notify), shutdown_rx));

    let rate_limiter = RateLimiter::new(
        format!("ws_client_{client_id}"),
        RateLimiterConfig { capacity: PER_CLIENT_RATE_CAPACITY, refill_rate: PER_CLIENT_RATE_REFILL },
    );

    run_reader(ws_stream, &shard, client_id, &rate_limiter, &error_tx, &close_notify).await;

    let _ = shard.unregister(client_id).await;
    drop(error_tx);
    let _ = writer.await;

    ConnectionMetrics::record_disconnected();
    state.connections_current.fetch_sub(1, Ordering::Relaxed);
    debug!(client_id, "connection closed");
}

async fn run_reader(
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    shard: &ShardHandle,
    client_id: u64,
    rate_limiter: &RateLimiter,
    error_tx: &mpsc::Sender<ErrorFrame>,
    close_notify: &Notify,
) {
    loop {
        tokio::select! {
            () = close_notify.notified() => {
                debug!(client_id, "writer initiated close, stopping reader");
                return;
            }
            next = timeout(READ_IDLE_TIMEOUT, ws_stream.next()) => {
                let Ok(next) = next else {
                    debug!(client_id, "no frame within idle timeout, closing");
                    return;
                };
                let Some(Ok(message)) = next else {
                    return;
                };

                if !handle_message(message, shard, client_id, rate_limiter, error_tx).await {
                    return;
                }
            }
        }
    }
}

/// Returns `false` when the connection should be torn down (client close
/// frame, or the shard's event loop has stopped accepting commands).
async fn handle_message(
    message: Message,
    shard: &ShardHandle,
    client_id: u64,
    rate_limiter: &RateLimiter,
    error_tx: &mpsc::Sender<ErrorFrame>,
) -> bool {
    let text = match message {
        Message::Close(_) => return false,
        Message::Text(text) => text,
        Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => text,
            Err(_) => {
                send_error(error_tx, "binary frame is not valid utf-8".to_string()).await;
                return true;
            },
        },
        Message::Ping(_) | Message::Pong(_) => return true,
    };

    ConnectionMetrics::record_received(text.len());

    if rate_limiter.try_acquire(1).await.is_err() {
        ConnectionMetrics::record_rate_limited();
        send_error(error_tx, "rate limit exceeded".to_string()).await;
        return true;
    }

    let control: Control = match serde_json::from_str(&text) {
        Ok(control) => control,
        Err(err) => {
            warn!(client_id, error = %err, "malformed control frame");
            send_error(error_tx, "malformed control frame".to_string()).await;
            return true;
        },
    };

    match dispatch(control, shard, client_id).await {
        Ok(Some(message)) => {
            send_error(error_tx, message).await;
            true
        },
        Ok(None) => true,
        Err(ShardError::Closed(_)) => false,
    }
}

/// Apply one parsed control frame. `Ok(Some(message))` carries a
/// best-effort error to surface to the client without disconnecting it.
async fn dispatch(control: Control, shard: &ShardHandle, client_id: u64) -> Result<Option<String>, ShardError> {
    match control {
        Control::Subscribe(SubscribeRequest::Channels { channels }) => {
            let (valid, invalid): (Vec<_>, Vec<_>) =
                channels.into_iter().map(|raw| (Channel::parse(&raw), raw)).partition(|(parsed, _)| parsed.is_ok());

            if !valid.is_empty() {
                let channels = valid.into_iter().filter_map(|(c, _)| c.ok()).collect();
                shard.subscribe(client_id, channels).await?;
            }

            if invalid.is_empty() {
                Ok(None)
            } else {
                let names: Vec<String> = invalid.into_iter().map(|(_, raw)| raw).collect();
                Ok(Some(format!("invalid channel name(s): {}", names.join(", "))))
            }
        },
        Control::Subscribe(SubscribeRequest::Bundle { bundle, tokens }) => match Bundle::parse(&bundle) {
            Ok(bundle) => {
                shard.subscribe(client_id, bundle.expand(&tokens)).await?;
                Ok(None)
            },
            Err(_) => Ok(Some(format!("unknown bundle: {bundle}"))),
        },
        Control::Unsubscribe { channels } => {
            let (valid, invalid): (Vec<_>, Vec<_>) =
                channels.into_iter().map(|raw| (Channel::parse(&raw), raw)).partition(|(parsed, _)| parsed.is_ok());

            if !valid.is_empty() {
                let channels = valid.into_iter().filter_map(|(c, _)| c.ok()).collect();
                shard.unsubscribe(client_id, channels).await?;
            }

            if invalid.is_empty() {
                Ok(None)
            } else {
                let names: Vec<String> = invalid.into_iter().map(|(_, raw)| raw).collect();
                Ok(Some(format!("invalid channel name(s): {}", names.join(", "))))
            }
        },
        Control::Replay(request) => {
            ConnectionMetrics::record_replay_request();
            shard.replay(client_id, request).await?;
            Ok(None)
        },
        Control::Heartbeat | Control::Pong => Ok(None),
    }
}

async fn send_error(error_tx: &mpsc::Sender<ErrorFrame>, message: String) {
    let _ = error_tx.try_send(ErrorFrame::new(message));
}

async fn run_writer(
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut client_rx: mpsc::Receiver<ClientFrame>,
    mut error_rx: mpsc::Receiver<ErrorFrame>,
    close_notify: Arc<Notify>,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    let mut error_rx_open = true;
    let mut ping_tick = tokio::time::interval(PING_INTERVAL);
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                let _ = timeout(
                    WRITE_TIMEOUT,
                    ws_sink.send(Message::Close(Some(CloseFrame {
                        code: SERVER_SHUTDOWN_CLOSE_CODE,
                        reason: Cow::Borrowed("server shutting down"),
                    }))),
                )
                .await;
                close_notify.notify_one();
                return;
            }
            frame = client_rx.recv() => {
                match frame {
                    Some(ClientFrame::Envelope(envelope)) => {
                        let Ok(text) = serde_json::to_string(&envelope) else { continue };
                        ConnectionMetrics::record_sent(text.len());
                        if send_text(&mut ws_sink, text).await.is_err() {
                            return;
                        }
                    }
                    None => {
                        // The shard dropped this client's sender — either on
                        // normal unregister, or because it just evicted a
                        // slow client after three consecutive enqueue
                        // failures. Either way the client can no longer be
                        // delivered to, so this is where the mandated
                        // policy-violation close frame actually gets sent.
                        let _ = timeout(
                            WRITE_TIMEOUT,
                            ws_sink.send(Message::Close(Some(CloseFrame {
                                code: POLICY_VIOLATION_CLOSE_CODE,
                                reason: Cow::Borrowed("send queue closed"),
                            }))),
                        )
                        .await;
                        close_notify.notify_one();
                        return;
                    }
                }
            }
            frame = error_rx.recv(), if error_rx_open => {
                match frame {
                    Some(error_frame) => {
                        if let Ok(text) = serde_json::to_string(&error_frame) {
                            ConnectionMetrics::record_sent(text.len());
                            if send_text(&mut ws_sink, text).await.is_err() {
                                return;
                            }
                        }
                    }
                    None => error_rx_open = false,
                }
            }
            _ = ping_tick.tick() => {
                if timeout(WRITE_TIMEOUT, ws_sink.send(Message::Ping(Vec::new()))).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn send_text(sink: &mut futures::stream::SplitSink<WebSocket, Message>, text: String) -> Result<(), ()> {
    timeout(WRITE_TIMEOUT, sink.send(Message::Text(text))).await.map_err(|_| ())?.map_err(|_| ())
}
