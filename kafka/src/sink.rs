//! The boundary between the consumer pool and the shard layer.
//!
//! The consumer pool doesn't know about shards, the subscription index, or
//! per-client sequencing — it only knows how to turn a decoded broker record
//! into a [`BroadcastRecord`] addressed to a [`Channel`] and hand it to
//! whatever implements [`RecordSink`]. `gateway-shard` owns the router
//! projection and the per-shard broadcast channels, and supplies the
//! concrete implementation the binary wires in at startup.

use gateway_core::{BroadcastRecord, Channel};

/// Where a routed record ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// No shard currently has a subscriber on this channel.
    NoSubscribers,
    /// Enqueued onto at least one shard's broadcast channel.
    Delivered {
        /// Number of shards the record was successfully enqueued to.
        shards: usize,
        /// Number of shards whose broadcast channel was full (dropped).
        dropped: usize,
    },
}

/// Implemented by the shard layer; called once per decoded record.
///
/// `route` must be non-blocking: it looks up the channel's subscribed
/// shards and performs a `try_send` onto each one's broadcast channel,
/// never awaiting backpressure. A full channel is a drop, not a stall —
/// per spec, the commit still proceeds either way.
pub trait RecordSink: Send + Sync {
    /// Route one record to every shard subscribed to `channel`.
    fn route(&self, channel: &Channel, record: BroadcastRecord) -> RouteOutcome;
}
