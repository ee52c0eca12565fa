//! The shard event loop: one task per shard, selecting over register,
//! unregister, subscribe, unsubscribe, replay, and broadcast commands plus a
//! periodic stats tick. No other task reads or writes a shard's maps.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gateway_core::{Channel, RouterProjection, SubscriptionIndex};
use gateway_runtime::metrics::{ConnectionMetrics, ShardMetrics};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::{Client, ClientFrame};
use crate::command::{BroadcastCommand, RegisterCommand, ReplayCommand, SubscribeCommand, UnregisterCommand, UnsubscribeCommand};
use crate::error::ShardError;

/// WebSocket close code used uniformly for slow-client eviction and
/// read-side protocol violations severe enough to warrant a close.
pub const POLICY_VIOLATION_CLOSE_CODE: u16 = 1008;

const MAX_CONSECUTIVE_SEND_FAILURES: u8 = 3;
const REPLAY_SOFT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Shard construction parameters.
#[derive(Debug, Clone)]
pub struct ShardConfig {
    /// This shard's id; client assignment is `client_id mod shard_count`.
    pub shard_id: usize,
    /// Bound on each of the five control-command channels.
    pub command_channel_size: usize,
    /// Bound on the broadcast channel the router enqueues onto.
    pub broadcast_channel_size: usize,
    /// Per-client replay buffer capacity.
    pub replay_buffer_size: usize,
    /// How often to publish the shard's client-count gauge.
    pub stats_interval: Duration,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            shard_id: 0,
            command_channel_size: 256,
            broadcast_channel_size: 4096,
            replay_buffer_size: 100,
            stats_interval: Duration::from_secs(10),
        }
    }
}

/// A handle to a running shard's command channels. Cheap to clone (all
/// fields are channel senders); the connection handler holds one per
/// assigned client, the router holds one per shard.
#[derive(Clone)]
pub struct ShardHandle {
    shard_id: usize,
    register_tx: mpsc::Sender<RegisterCommand>,
    unregister_tx: mpsc::Sender<UnregisterCommand>,
    subscribe_tx: mpsc::Sender<SubscribeCommand>,
    unsubscribe_tx: mpsc::Sender<UnsubscribeCommand>,
    replay_tx: mpsc::Sender<ReplayCommand>,
    broadcast_tx: mpsc::Sender<BroadcastCommand>,
}

impl ShardHandle {
    /// This shard's id.
    #[must_use]
    pub const fn shard_id(&self) -> usize {
        self.shard_id
    }

    /// Register a newly-upgraded client.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::Closed`] if the shard's event loop has stopped.
    pub async fn register(&self, client_id: u64, sender: mpsc::Sender<ClientFrame>) -> Result<(), ShardError> {
        self.register_tx
            .send(RegisterCommand { client_id, sender })
            .await
            .map_err(|_| ShardError::Closed(self.shard_id))
    }

    /// Remove a client and tear down its subscriptions.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::Closed`] if the shard's event loop has stopped.
    pub async fn unregister(&self, client_id: u64) -> Result<(), ShardError> {
        self.unregister_tx
            .send(UnregisterCommand { client_id })
            .await
            .map_err(|_| ShardError::Closed(self.shard_id))
    }

    /// Subscribe a client to the given channels.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::Closed`] if the shard's event loop has stopped.
    pub async fn subscribe(&self, client_id: u64, channels: Vec<Channel>) -> Result<(), ShardError> {
        self.subscribe_tx
            .send(SubscribeCommand { client_id, channels })
            .await
            .map_err(|_| ShardError::Closed(self.shard_id))
    }

    /// Unsubscribe a client from the given channels.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::Closed`] if the shard's event loop has stopped.
    pub async fn unsubscribe(&self, client_id: u64, channels: Vec<Channel>) -> Result<(), ShardError> {
        self.unsubscribe_tx
            .send(UnsubscribeCommand { client_id, channels })
            .await
            .map_err(|_| ShardError::Closed(self.shard_id))
    }

    /// Request replay of a client's buffer against `request`.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::Closed`] if the shard's event loop has stopped.
    pub async fn replay(&self, client_id: u64, request: gateway_core::ReplayRequest) -> Result<(), ShardError> {
        self.replay_tx
            .send(ReplayCommand { client_id, request })
            .await
            .map_err(|_| ShardError::Closed(self.shard_id))
    }

    /// Non-blocking enqueue of one broadcast record, per the router's
    /// contract: full channels are a drop, never a stall.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::Closed`] if the channel is full or the shard's
    /// event loop has stopped — callers only distinguish "delivered" from
    /// "not delivered", so both map to the same error.
    pub fn try_broadcast(&self, channel: Channel, record: gateway_core::BroadcastRecord) -> Result<(), ShardError> {
        self.broadcast_tx
            .try_send(BroadcastCommand { channel, record })
            .map_err(|_| ShardError::Closed(self.shard_id))
    }
}

/// Start a shard's event loop task and return a handle to its command channels.
#[must_use]
pub fn spawn(config: ShardConfig, router: Arc<RouterProjection<Channel, usize>>) -> ShardHandle {
    let (register_tx, register_rx) = mpsc::channel(config.command_channel_size);
    let (unregister_tx, unregister_rx) = mpsc::channel(config.command_channel_size);
    let (subscribe_tx, subscribe_rx) = mpsc::channel(config.command_channel_size);
    let (unsubscribe_tx, unsubscribe_rx) = mpsc::channel(config.command_channel_size);
    let (replay_tx, replay_rx) = mpsc::channel(config.command_channel_size);
    let (broadcast_tx, broadcast_rx) = mpsc::channel(config.broadcast_channel_size);

    let shard_id = config.shard_id;
    tokio::spawn(run(
        config,
        router,
        register_rx,
        unregister_rx,
        subscribe_rx,
        unsubscribe_rx,
        replay_rx,
        broadcast_rx,
    ));

    ShardHandle { shard_id, register_tx, unregister_tx, subscribe_tx, unsubscribe_tx, replay_tx, broadcast_tx }
}

#[allow(clippy::too_many_arguments, clippy::cognitive_complexity)]
async fn run(
    config: ShardConfig,
    router: Arc<RouterProjection<Channel, usize>>,
    mut register_rx: mpsc::Receiver<RegisterCommand>,
    mut unregister_rx: mpsc::Receiver<UnregisterCommand>,
    mut subscribe_rx: mpsc::Receiver<SubscribeCommand>,
    mut unsubscribe_rx: mpsc::Receiver<UnsubscribeCommand>,
    mut replay_rx: mpsc::Receiver<ReplayCommand>,
    mut broadcast_rx: mpsc::Receiver<BroadcastCommand>,
) {
    let shard_id = config.shard_id;
    let mut clients: HashMap<u64, Client> = HashMap::new();
    let mut index: SubscriptionIndex<Channel, u64> = SubscriptionIndex::new();

    let mut stats_tick = tokio::time::interval(config.stats_interval);
    stats_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(shard_id, "shard loop starting");

    loop {
        tokio::select! {
            Some(cmd) = register_rx.recv() => {
                clients.insert(cmd.client_id, Client::new(cmd.client_id, cmd.sender, config.replay_buffer_size));
                debug!(shard_id, client_id = cmd.client_id, "client registered");
            }
            Some(cmd) = unregister_rx.recv() => {
                remove_client(shard_id, cmd.client_id, &mut clients, &mut index, &router);
            }
            Some(cmd) = subscribe_rx.recv() => {
                if clients.contains_key(&cmd.client_id) {
                    for channel in cmd.channels {
                        if index.subscribe(channel.clone(), cmd.client_id) {
                            router.write_through_subscribe(channel, shard_id);
                        }
                    }
                }
            }
            Some(cmd) = unsubscribe_rx.recv() => {
                if clients.contains_key(&cmd.client_id) {
                    for channel in cmd.channels {
                        if index.unsubscribe(&channel, &cmd.client_id) {
                            router.write_through_unsubscribe(&channel, &shard_id);
                        }
                    }
                }
            }
            Some(cmd) = replay_rx.recv() => {
                if let Some(client) = clients.get(&cmd.client_id) {
                    let (truncated, envelopes) = client.fetch_replay(&cmd.request);
                    tokio::spawn(deliver_replay(client.sender(), envelopes, truncated));
                }
            }
            Some(cmd) = broadcast_rx.recv() => {
                process_broadcast(shard_id, cmd, &mut clients, &mut index, &router);
            }
            _ = stats_tick.tick() => {
                ShardMetrics::set_clients(shard_id, clients.len() as f64);
            }
            else => break,
        }
    }

    info!(shard_id, "shard loop stopped");
}

fn remove_client(
    shard_id: usize,
    client_id: u64,
    clients: &mut HashMap<u64, Client>,
    index: &mut SubscriptionIndex<Channel, u64>,
    router: &RouterProjection<Channel, usize>,
) {
    if clients.remove(&client_id).is_some() {
        for channel in index.remove_client(&client_id) {
            router.write_through_unsubscribe(&channel, &shard_id);
        }
        debug!(shard_id, client_id, "client unregistered");
    }
}

/// Fan out one broadcast command to every current subscriber of its channel.
///
/// Per the router's contract, a channel with no current subscribers is a
/// cheap no-op; a subscriber whose send queue is full on its third
/// consecutive failure is evicted — its sender is dropped via
/// [`remove_client`] rather than a close frame being pushed onto the same
/// full queue. The writer pump on the other end observes the dropped
/// sender and is what actually emits [`POLICY_VIOLATION_CLOSE_CODE`].
fn process_broadcast(
    shard_id: usize,
    cmd: BroadcastCommand,
    clients: &mut HashMap<u64, Client>,
    index: &mut SubscriptionIndex<Channel, u64>,
    router: &RouterProjection<Channel, usize>,
) {
    let subscribers = index.subscribers(&cmd.channel).to_vec();
    if subscribers.is_empty() {
        return;
    }

    let mut sent = 0u64;
    let mut dropped = 0u64;
    let mut evicted = Vec::new();

    for client_id in subscribers {
        let Some(client) = clients.get_mut(&client_id) else { continue };
        if client.deliver(&cmd.record) {
            sent += 1;
        } else {
            dropped += 1;
            if client.consecutive_failures() >= MAX_CONSECUTIVE_SEND_FAILURES {
                client.close();
                evicted.push(client_id);
            }
        }
    }

    ShardMetrics::record_sent(shard_id, sent);
    if dropped > 0 {
        ShardMetrics::record_dropped(shard_id, dropped);
    }

    for client_id in evicted {
        warn!(shard_id, client_id, "evicting slow client after three consecutive send failures");
        ConnectionMetrics::record_slow_client_disconnected();
        remove_client(shard_id, client_id, clients, index, router);
    }
}

async fn deliver_replay(sender: mpsc::Sender<ClientFrame>, envelopes: Vec<gateway_core::Envelope>, truncated: bool) {
    for envelope in envelopes {
        let frame = ClientFrame::Envelope(envelope);
        if tokio::time::timeout(REPLAY_SOFT_TIMEOUT, sender.send(frame)).await.is_err() {
            warn!("replay delivery timed out, dropping remaining envelopes");
            return;
        }
    }
    if truncated {
        debug!("replay response was truncated to the retained window");
    }
}
