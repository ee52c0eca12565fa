//! Ambient runtime utilities shared across the gateway's subsystems:
//! Prometheus metrics and the exponential-backoff retry the Kafka consumer
//! pool uses to reconnect.

pub mod metrics;
pub mod retry;

pub use metrics::{ConnectionMetrics, KafkaMetrics, MetricsServer, ResourceMetrics, ShardMetrics};
pub use retry::{retry_with_backoff, RetryPolicy};
