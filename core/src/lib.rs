//! Domain model for the token gateway.
//!
//! This crate has no I/O and no async dependency: it is the pure data model
//! shared by the Kafka consumer pool, the shard event loop, and the
//! connection handler — channel names, the eight fixed topics, the
//! server-to-client envelope and client-to-server control frames, named
//! bundle expansion, per-client sequencing, the bounded replay buffer, the
//! per-shard subscription index, and the router's channel→shard-set
//! projection.

pub mod bundle;
pub mod channel;
pub mod envelope;
pub mod error;
pub mod replay;
pub mod router;
pub mod sequence;
pub mod subscription;
pub mod topic;

pub use bundle::Bundle;
pub use channel::Channel;
pub use envelope::{BroadcastRecord, Control, Envelope, ErrorFrame, ReplayRequest, SubscribeRequest};
pub use error::CoreError;
pub use replay::{ReplayBuffer, ReplayResult};
pub use router::RouterProjection;
pub use sequence::SequenceGenerator;
pub use subscription::SubscriptionIndex;
pub use topic::Topic;
