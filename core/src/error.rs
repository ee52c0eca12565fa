//! Domain error types shared across the gateway's subsystems.

use thiserror::Error;

/// Errors produced by the domain model: channel parsing, bundle expansion,
/// and the subscription/router projections.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A channel string did not match `token.<id>`, `user.<id>`, or `global`.
    #[error("invalid channel name: {0}")]
    InvalidChannel(String),

    /// A bundle name did not match one of the six fixed bundles.
    #[error("unknown bundle: {0}")]
    UnknownBundle(String),

    /// A topic name from configuration did not match one of the eight fixed topics.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// `kafka_topics` configuration did not supply exactly eight entries.
    #[error("expected 8 kafka topics, got {0}")]
    TopicCountMismatch(usize),
}
