//! Per-shard subscription index: channel → subscribers and client → channels.
//!
//! Owned exclusively by one shard's event loop task — never locked, never
//! shared. The shard's loop is the only writer and the only reader.

use std::collections::{HashMap, HashSet};

/// Maps channels to their subscriber client ids and vice versa, for O(subs)
/// teardown on client disconnect.
///
/// `ClientId` is generic here so the index has no dependency on the `shard`
/// crate's concrete client type — it only needs something hashable and
/// copyable to identify a client.
#[derive(Debug, Default)]
pub struct SubscriptionIndex<ChannelId, ClientId> {
    by_channel: HashMap<ChannelId, Vec<ClientId>>,
    by_client: HashMap<ClientId, HashSet<ChannelId>>,
}

impl<ChannelId, ClientId> SubscriptionIndex<ChannelId, ClientId>
where
    ChannelId: std::hash::Hash + Eq + Clone,
    ClientId: std::hash::Hash + Eq + Clone,
{
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self { by_channel: HashMap::new(), by_client: HashMap::new() }
    }

    /// Subscribe `client` to `channel`. Idempotent: subscribing twice leaves
    /// the subscriber list identical to a single subscribe.
    ///
    /// Returns `true` if this is the channel's first subscriber (the shard
    /// uses this to decide whether to write through to the router
    /// projection).
    pub fn subscribe(&mut self, channel: ChannelId, client: ClientId) -> bool {
        let subscribers = self.by_channel.entry(channel.clone()).or_default();
        let first_subscriber = subscribers.is_empty();
        if !subscribers.contains(&client) {
            subscribers.push(client.clone());
        }
        self.by_client.entry(client).or_default().insert(channel);
        first_subscriber
    }

    /// Unsubscribe `client` from `channel`. A no-op if the client wasn't
    /// subscribed.
    ///
    /// Returns `true` if the channel now has zero subscribers (the shard
    /// uses this to decide whether to write through an unsubscribe to the
    /// router projection).
    pub fn unsubscribe(&mut self, channel: &ChannelId, client: &ClientId) -> bool {
        let now_empty = if let Some(subscribers) = self.by_channel.get_mut(channel) {
            subscribers.retain(|c| c != client);
            subscribers.is_empty()
        } else {
            false
        };
        if now_empty {
            self.by_channel.remove(channel);
        }
        if let Some(channels) = self.by_client.get_mut(client) {
            channels.remove(channel);
        }
        now_empty
    }

    /// Remove a client from every channel it was subscribed to, e.g. on
    /// disconnect. Returns the set of channels that became empty as a
    /// result, so the caller can write through the corresponding
    /// unsubscribes to the router projection.
    pub fn remove_client(&mut self, client: &ClientId) -> Vec<ChannelId> {
        let Some(channels) = self.by_client.remove(client) else {
            return Vec::new();
        };
        let mut emptied = Vec::new();
        for channel in channels {
            let now_empty = if let Some(subscribers) = self.by_channel.get_mut(&channel) {
                subscribers.retain(|c| c != client);
                subscribers.is_empty()
            } else {
                false
            };
            if now_empty {
                self.by_channel.remove(&channel);
                emptied.push(channel);
            }
        }
        emptied
    }

    /// The current subscribers of `channel`, in iteration (insertion) order.
    #[must_use]
    pub fn subscribers(&self, channel: &ChannelId) -> &[ClientId] {
        self.by_channel.get(channel).map_or(&[], Vec::as_slice)
    }

    /// Whether `channel` currently has at least one subscriber.
    #[must_use]
    pub fn has_subscribers(&self, channel: &ChannelId) -> bool {
        self.by_channel.get(channel).is_some_and(|s| !s.is_empty())
    }
}
