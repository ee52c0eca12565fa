//! Consumer pool errors.

use thiserror::Error;

/// Errors the consumer pool can report at startup.
///
/// Per-record and per-batch failures after startup are not fatal — they are
/// logged, counted via [`gateway_runtime::metrics::KafkaMetrics`], and the
/// batch continues, per the at-least-once delivery contract.
#[derive(Debug, Error)]
pub enum KafkaError {
    /// The `rdkafka` consumer could not be constructed from configuration.
    #[error("failed to create kafka consumer: {0}")]
    ConsumerCreation(String),
    /// Subscribing the consumer to its topic set failed.
    #[error("failed to subscribe to topics {topics:?}: {reason}")]
    Subscription {
        /// The topics that were being subscribed to.
        topics: Vec<String>,
        /// The underlying `rdkafka` error text.
        reason: String,
    },
}
