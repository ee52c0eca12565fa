//! The five-plus-one commands a shard's event loop selects over: register,
//! unregister, subscribe, unsubscribe, replay, and broadcast.

use gateway_core::{BroadcastRecord, Channel, ReplayRequest};
use tokio::sync::mpsc;

use crate::client::ClientFrame;

/// Admit a newly-upgraded connection onto this shard.
pub struct RegisterCommand {
    /// The client's id.
    pub client_id: u64,
    /// The client's send queue; the shard clones this as needed (e.g. for
    /// background replay delivery).
    pub sender: mpsc::Sender<ClientFrame>,
}

/// Remove a client and tear down its subscriptions, e.g. on disconnect.
pub struct UnregisterCommand {
    /// The client's id.
    pub client_id: u64,
}

/// Add channels to a client's subscription set.
pub struct SubscribeCommand {
    /// The client's id.
    pub client_id: u64,
    /// Channels to subscribe to; duplicates are idempotent.
    pub channels: Vec<Channel>,
}

/// Remove channels from a client's subscription set.
pub struct UnsubscribeCommand {
    /// The client's id.
    pub client_id: u64,
    /// Channels to unsubscribe from; unknown channels are a no-op.
    pub channels: Vec<Channel>,
}

/// Resolve a `replay` control frame against a client's buffer.
pub struct ReplayCommand {
    /// The client's id.
    pub client_id: u64,
    /// The requested range or since-cursor.
    pub request: ReplayRequest,
}

/// One broker record to fan out to every subscriber of `channel` on this shard.
#[derive(Clone)]
pub struct BroadcastCommand {
    /// The destination channel.
    pub channel: Channel,
    /// The record to wrap per subscriber.
    pub record: BroadcastRecord,
}
