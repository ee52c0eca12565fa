//! Couples the channel→shard-set projection with each shard's broadcast
//! channel, giving the consumer pool a single [`RecordSink`] to route
//! through without any further knowledge of shards.

use std::sync::Arc;

use gateway_core::{BroadcastRecord, Channel, RouterProjection};
use gateway_kafka::{RecordSink, RouteOutcome};
use tracing::debug;

use crate::shard::ShardHandle;

/// The gateway's concrete router: reads the shared projection to find which
/// shards care about a channel, then performs a non-blocking enqueue onto
/// each one's broadcast channel.
pub struct GatewayRouter {
    projection: Arc<RouterProjection<Channel, usize>>,
    shards: Vec<ShardHandle>,
}

impl GatewayRouter {
    /// Build a router over an already-shared projection and the full set of
    /// shard handles, indexed by shard id.
    #[must_use]
    pub const fn new(projection: Arc<RouterProjection<Channel, usize>>, shards: Vec<ShardHandle>) -> Self {
        Self { projection, shards }
    }

    /// The shared projection, e.g. for the periodic `prune_empty` sweep or
    /// the `/stats` handler's channel count.
    #[must_use]
    pub const fn projection(&self) -> &Arc<RouterProjection<Channel, usize>> {
        &self.projection
    }

    /// The shard a client id is pinned to for its lifetime.
    #[must_use]
    pub fn shard_for_client(&self, client_id: u64) -> &ShardHandle {
        let index = (client_id as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Number of shards in this router.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

impl RecordSink for GatewayRouter {
    fn route(&self, channel: &Channel, record: BroadcastRecord) -> RouteOutcome {
        let shard_ids = self.projection.shards_for(channel);
        if shard_ids.is_empty() {
            return RouteOutcome::NoSubscribers;
        }

        let mut shards = 0;
        let mut dropped = 0;
        for shard_id in shard_ids {
            let Some(shard) = self.shards.get(shard_id) else { continue };
            match shard.try_broadcast(channel.clone(), record.clone()) {
                Ok(()) => shards += 1,
                Err(_) => {
                    dropped += 1;
                    debug!(shard_id, channel = %channel, "broadcast channel full, dropping for this shard");
                },
            }
        }
        RouteOutcome::Delivered { shards, dropped }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shard::{ShardConfig, spawn};
    use serde_json::value::RawValue;
    use tokio::sync::mpsc;

    fn record() -> BroadcastRecord {
        BroadcastRecord::new("trade", 1, RawValue::from_string("{}".to_string()).unwrap())
    }

    #[tokio::test]
    async fn route_with_no_subscribers_reports_no_subscribers() {
        let projection = Arc::new(RouterProjection::new());
        let shard = spawn(ShardConfig { shard_id: 0, ..ShardConfig::default() }, Arc::clone(&projection));
        let router = GatewayRouter::new(projection, vec![shard]);

        let outcome = router.route(&Channel::token("BTC"), record());
        assert_eq!(outcome, RouteOutcome::NoSubscribers);
    }

    #[tokio::test]
    async fn route_delivers_to_every_subscribed_shard() {
        let projection = Arc::new(RouterProjection::new());
        let shard0 = spawn(ShardConfig { shard_id: 0, ..ShardConfig::default() }, Arc::clone(&projection));
        let shard1 = spawn(ShardConfig { shard_id: 1, ..ShardConfig::default() }, Arc::clone(&projection));

        let (tx0, _rx0) = mpsc::channel(8);
        let (tx1, _rx1) = mpsc::channel(8);
        shard0.register(1, tx0).await.unwrap();
        shard1.register(2, tx1).await.unwrap();
        shard0.subscribe(1, vec![Channel::token("BTC")]).await.unwrap();
        shard1.subscribe(2, vec![Channel::token("BTC")]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let router = GatewayRouter::new(projection, vec![shard0, shard1]);
        let outcome = router.route(&Channel::token("BTC"), record());
        assert_eq!(outcome, RouteOutcome::Delivered { shards: 2, dropped: 0 });
    }

    #[test]
    fn shard_for_client_is_stable_modulo_shard_count() {
        let projection = Arc::new(RouterProjection::new());
        let router = GatewayRouter::new(projection, Vec::<ShardHandle>::new());
        assert_eq!(router.shard_count(), 0);
    }
}
