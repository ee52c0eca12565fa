//! The router's channel → {shard ids} projection.
//!
//! Read on every ingested record (hot path); written on first-subscribe and
//! last-unsubscribe for a (channel, shard) pair. Protected by a
//! readers-writer lock rather than the shard's lock-free ownership model,
//! since — unlike a shard's own maps — this structure genuinely has
//! multiple concurrent readers (every consumer pool worker) and occasional
//! writers (every shard, on subscription changes).
//!
//! May lag subscription changes by a bounded time: stale "present" is safe
//! (a broadcast to a shard with no subscribers is a cheap no-op); stale
//! "absent" is prevented by ordering the write-through before the subscribe
//! is acknowledged to the client.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// The router's projection, generic over the channel key and shard id types.
pub struct RouterProjection<ChannelId, ShardId> {
    projection: RwLock<HashMap<ChannelId, HashSet<ShardId>>>,
}

impl<ChannelId, ShardId> RouterProjection<ChannelId, ShardId>
where
    ChannelId: std::hash::Hash + Eq + Clone,
    ShardId: std::hash::Hash + Eq + Clone,
{
    /// Create an empty projection.
    #[must_use]
    pub fn new() -> Self {
        Self { projection: RwLock::new(HashMap::new()) }
    }

    /// Record that `shard` now has at least one subscriber for `channel`.
    /// Called by a shard as a side effect of accepting a first-subscribe.
    pub fn write_through_subscribe(&self, channel: ChannelId, shard: ShardId) {
        let mut projection = self.projection.write().unwrap_or_else(|e| e.into_inner());
        projection.entry(channel).or_default().insert(shard);
    }

    /// Record that `shard` no longer has any subscribers for `channel`.
    /// Called by a shard as a side effect of a last-unsubscribe.
    pub fn write_through_unsubscribe(&self, channel: &ChannelId, shard: &ShardId) {
        let mut projection = self.projection.write().unwrap_or_else(|e| e.into_inner());
        if let Some(shards) = projection.get_mut(channel) {
            shards.remove(shard);
            if shards.is_empty() {
                projection.remove(channel);
            }
        }
    }

    /// Read the shard set for `channel`. Returns an owned snapshot rather
    /// than a guard so the read lock is released immediately — the caller
    /// (consumer pool) then fans out enqueues without holding the lock.
    #[must_use]
    pub fn shards_for(&self, channel: &ChannelId) -> Vec<ShardId> {
        let projection = self.projection.read().unwrap_or_else(|e| e.into_inner());
        projection.get(channel).map(|s| s.iter().cloned().collect()).unwrap_or_default()
    }

    /// Prune every channel entry with zero shards. Intended to be called by
    /// a periodic sweep (every ~60s); the write-through paths above already
    /// remove empty entries eagerly, so this mainly guards against any path
    /// that leaves a stale empty set behind.
    pub fn prune_empty(&self) {
        let mut projection = self.projection.write().unwrap_or_else(|e| e.into_inner());
        projection.retain(|_, shards| !shards.is_empty());
    }

    /// Number of channels currently tracked, for metrics/diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.projection.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the projection currently tracks no channels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<ChannelId, ShardId> Default for RouterProjection<ChannelId, ShardId>
where
    ChannelId: std::hash::Hash + Eq + Clone,
    ShardId: std::hash::Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_set_is_superset_after_subscribe() {
        let router: RouterProjection<&str, u32> = RouterProjection::new();
        router.write_through_subscribe("token.BTC", 0);
        router.write_through_subscribe("token.BTC", 1);
        let mut shards = router.shards_for(&"token.BTC");
        shards.sort_unstable();
        assert_eq!(shards, vec![0, 1]);
    }

    #[test]
    fn unsubscribe_removes_shard_and_prunes_empty_channel() {
        let router: RouterProjection<&str, u32> = RouterProjection::new();
        router.write_through_subscribe("token.BTC", 0);
        router.write_through_unsubscribe(&"token.BTC", &0);
        assert!(router.shards_for(&"token.BTC").is_empty());
        assert!(router.is_empty());
    }

    #[test]
    fn absent_channel_returns_empty_shard_set() {
        let router: RouterProjection<&str, u32> = RouterProjection::new();
        assert!(router.shards_for(&"token.ETH").is_empty());
    }

    #[test]
    fn prune_empty_is_idempotent_on_already_clean_projection() {
        let router: RouterProjection<&str, u32> = RouterProjection::new();
        router.write_through_subscribe("global", 0);
        router.prune_empty();
        assert_eq!(router.len(), 1);
    }
}
