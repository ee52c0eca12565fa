//! The Kafka consumer pipeline: a shared-group pool of workers that poll the
//! eight fixed topics, batch fetches, apply rate-limit and CPU backpressure,
//! map each record to its destination channel, and hand it to the shard
//! layer through [`RecordSink`].

pub mod error;
pub mod pool;
pub mod sink;

pub use error::KafkaError;
pub use pool::{ConsumerPool, ConsumerPoolConfig};
pub use sink::{RecordSink, RouteOutcome};
