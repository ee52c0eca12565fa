//! The shard layer: each shard owns a slice of clients and the subscription
//! state for them, serialized through a single event-loop task per shard
//! (see [`shard::spawn`]). [`router::GatewayRouter`] couples the shared
//! channel→shard-set projection with every shard's broadcast channel and
//! implements [`gateway_kafka::RecordSink`], the boundary the consumer pool
//! routes through.

pub mod client;
pub mod command;
pub mod error;
pub mod router;
pub mod shard;

pub use client::{Client, ClientFrame};
pub use command::{BroadcastCommand, RegisterCommand, ReplayCommand, SubscribeCommand, UnregisterCommand, UnsubscribeCommand};
pub use error::ShardError;
pub use router::GatewayRouter;
pub use shard::{spawn, ShardConfig, ShardHandle, POLICY_VIOLATION_CLOSE_CODE};
