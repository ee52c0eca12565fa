//! The shared-group consumer pool: a small set of workers polling the eight
//! topics, batching fetches, applying rate-limit/CPU backpressure, and
//! committing offsets once per batch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use gateway_core::{BroadcastRecord, Channel, Topic};
use gateway_resilience::rate_limiter::RateLimiter;
use gateway_resilience::resource_guard::SharedResourceGuard;
use gateway_runtime::metrics::KafkaMetrics;
use gateway_runtime::retry::{retry_with_backoff, RetryPolicy};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use serde_json::value::RawValue;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::KafkaError;
use crate::sink::{RecordSink, RouteOutcome};

/// Consecutive stream-poll errors a worker tolerates before it considers the
/// broker connection lost and reports it as such (surfaced in `/health` via
/// the connected flag a caller shares across every worker).
const CONSECUTIVE_ERRORS_UNTIL_CRITICAL: u32 = 5;

/// Consumer pool configuration.
#[derive(Debug, Clone)]
pub struct ConsumerPoolConfig {
    /// Broker bootstrap addresses.
    pub brokers: Vec<String>,
    /// Shared consumer group id.
    pub group_id: String,
    /// The eight physical topic names, in [`Topic::ALL`] order.
    pub topics: [String; 8],
    /// Number of consumer workers sharing the group (≈3 per spec).
    pub worker_count: usize,
    /// Stop collecting a batch after this many records.
    pub batch_max_records: usize,
    /// Stop collecting a batch after this much wall time, whichever comes first.
    pub batch_max_wait: Duration,
}

impl Default for ConsumerPoolConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            group_id: "token-gateway".to_string(),
            topics: Topic::ALL.map(|t| t.type_tag().to_string()),
            worker_count: 3,
            batch_max_records: 1000,
            batch_max_wait: Duration::from_millis(100),
        }
    }
}

/// A running pool of consumer workers. Dropping this does not stop the
/// workers — call [`ConsumerPool::shutdown`] for a coordinated stop.
pub struct ConsumerPool {
    handles: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
}

impl ConsumerPool {
    /// Start the pool: create `worker_count` consumers against the shared
    /// group (retrying transient creation/subscription failures with
    /// exponential backoff, capped at 30s per spec), and spawn their poll
    /// loops.
    ///
    /// `connected` is shared with the rest of the gateway (the `/health`
    /// broker check reads it) and is flipped by whichever worker observes a
    /// state change first — any worker's success sets it `true`, a
    /// sustained run of poll errors on any worker sets it `false`.
    ///
    /// # Errors
    ///
    /// Returns [`KafkaError`] if a worker's consumer still cannot be created
    /// or subscribed after retrying with backoff.
    pub async fn spawn(
        config: ConsumerPoolConfig,
        sink: Arc<dyn RecordSink>,
        rate_limiter: Arc<RateLimiter>,
        resource_guard: SharedResourceGuard,
        connected: Arc<AtomicBool>,
    ) -> Result<Self, KafkaError> {
        let topic_index: HashMap<String, Topic> = config
            .topics
            .iter()
            .cloned()
            .zip(Topic::ALL)
            .collect();

        let stop = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(config.worker_count);

        for worker_id in 0..config.worker_count {
            let consumer = connect_with_retry(&config, worker_id).await?;

            let sink = Arc::clone(&sink);
            let rate_limiter = Arc::clone(&rate_limiter);
            let resource_guard = Arc::clone(&resource_guard);
            let topic_index = topic_index.clone();
            let stop = Arc::clone(&stop);
            let connected = Arc::clone(&connected);
            let batch_max_records = config.batch_max_records;
            let batch_max_wait = config.batch_max_wait;

            let handle = tokio::spawn(async move {
                run_worker(
                    worker_id,
                    consumer,
                    topic_index,
                    sink,
                    rate_limiter,
                    resource_guard,
                    batch_max_records,
                    batch_max_wait,
                    stop,
                    connected,
                )
                .await;
            });
            handles.push(handle);
        }

        connected.store(true, Ordering::Relaxed);

        KafkaMetrics::set_connected(true);
        Ok(Self { handles, stop, connected })
    }

    /// Signal every worker to stop after its current batch and wait for them
    /// to exit.
    pub async fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in self.handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "consumer worker task panicked during shutdown");
            }
        }
        self.connected.store(false, Ordering::Relaxed);
        KafkaMetrics::set_connected(false);
    }
}

fn build_consumer(config: &ConsumerPoolConfig) -> Result<StreamConsumer, KafkaError> {
    ClientConfig::new()
        .set("bootstrap.servers", config.brokers.join(","))
        .set("group.id", &config.group_id)
        .set("enable.auto.commit", "false")
        .set("enable.auto.offset.store", "false")
        .set("auto.offset.reset", "latest")
        .set("session.timeout.ms", "6000")
        .set("enable.partition.eof", "false")
        .create()
        .map_err(|e| KafkaError::ConsumerCreation(e.to_string()))
}

/// Build and subscribe one worker's consumer, retrying transient failures
/// with exponential backoff capped at 30s (`RetryPolicy::default`). A
/// failure here is a startup condition, not a steady-state one — once a
/// worker is running, transient poll errors are handled by `run_worker`
/// itself rather than by tearing down and recreating the consumer.
async fn connect_with_retry(config: &ConsumerPoolConfig, worker_id: usize) -> Result<StreamConsumer, KafkaError> {
    let topics = config.topics.to_vec();
    retry_with_backoff(RetryPolicy::default(), || async {
        let consumer = build_consumer(config)?;
        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topic_refs).map_err(|e| KafkaError::Subscription {
            topics: topics.clone(),
            reason: e.to_string(),
        })?;
        Ok(consumer)
    })
    .await
    .inspect_err(|err| error!(worker_id, error = %err, "consumer worker failed to connect after retrying"))
}

#[allow(clippy::too_many_arguments)]
async fn run_worker(
    worker_id: usize,
    consumer: StreamConsumer,
    topic_index: HashMap<String, Topic>,
    sink: Arc<dyn RecordSink>,
    rate_limiter: Arc<RateLimiter>,
    resource_guard: SharedResourceGuard,
    batch_max_records: usize,
    batch_max_wait: Duration,
    stop: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
) {
    info!(worker_id, "consumer worker starting");
    let consecutive_errors = AtomicU32::new(0);
    let mut stream = consumer.stream();

    while !stop.load(Ordering::Relaxed) {
        if !resource_guard.should_consume() {
            tokio::time::sleep(Duration::from_millis(50)).await;
            continue;
        }

        let batch_deadline = Instant::now() + batch_max_wait;
        let mut routed_any = false;

        for _ in 0..batch_max_records {
            if stop.load(Ordering::Relaxed) || !resource_guard.should_consume() {
                break;
            }

            let remaining = batch_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let next = tokio::time::timeout(remaining, stream.next()).await;
            let Ok(Some(message_result)) = next else {
                break;
            };

            let message = match message_result {
                Ok(message) => message,
                Err(err) => {
                    let errors = consecutive_errors.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(worker_id, error = %err, consecutive_errors = errors, "consumer poll error");
                    if errors == CONSECUTIVE_ERRORS_UNTIL_CRITICAL {
                        error!(worker_id, consecutive_errors = errors, "sustained broker disconnection");
                        connected.store(false, Ordering::Relaxed);
                        KafkaMetrics::set_connected(false);
                    }
                    continue;
                }
            };

            consecutive_errors.store(0, Ordering::Relaxed);
            if !connected.swap(true, Ordering::Relaxed) {
                info!(worker_id, "broker connection recovered");
                KafkaMetrics::set_connected(true);
            }

            if rate_limiter.try_acquire(1).await.is_err() {
                debug!(worker_id, "rate limit gate rejected, stopping batch early");
                break;
            }

            let decoded = decode_record(
                &topic_index,
                message.topic(),
                message.key(),
                message.payload(),
                message.timestamp().to_millis(),
            );

            match decoded {
                Err(reason) => {
                    warn!(worker_id, topic = message.topic(), reason, "dropping unroutable record");
                }
                Ok((channel, record)) => {
                    KafkaMetrics::record_received(1);
                    match sink.route(&channel, record) {
                        RouteOutcome::NoSubscribers => {}
                        RouteOutcome::Delivered { dropped, .. } if dropped > 0 => {
                            KafkaMetrics::record_dropped(dropped);
                        }
                        RouteOutcome::Delivered { .. } => {}
                    }
                }
            }

            store_offset(&consumer, &message, worker_id);
            routed_any = true;
        }

        if routed_any {
            if let Err(err) = consumer.commit_consumer_state(CommitMode::Async) {
                warn!(worker_id, error = %err, "offset commit failed");
                KafkaMetrics::record_commit_error();
            }
        }
    }

    info!(worker_id, "consumer worker stopped");
}

fn store_offset(consumer: &StreamConsumer, message: &rdkafka::message::BorrowedMessage<'_>, worker_id: usize) {
    if let Err(err) = consumer.store_offset_from_message(message) {
        warn!(worker_id, error = %err, "failed to store offset");
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Map a raw broker record to its destination channel and broadcast record.
///
/// Pulled out of the worker loop so the topic/key/payload mapping rules can
/// be exercised without a running broker. Returns the reason a record was
/// unroutable as a `&'static str` for logging.
fn decode_record(
    topic_index: &HashMap<String, Topic>,
    topic_name: &str,
    key: Option<&[u8]>,
    payload: Option<&[u8]>,
    timestamp_millis: Option<i64>,
) -> Result<(Channel, BroadcastRecord), &'static str> {
    let topic = topic_index.get(topic_name).copied().ok_or("unmapped topic")?;
    let key = key.and_then(|k| std::str::from_utf8(k).ok()).ok_or("missing or non-utf8 key")?;
    let payload = payload.ok_or("missing payload")?;
    let payload_str = std::str::from_utf8(payload).map_err(|_| "payload is not valid utf-8")?;
    let data = RawValue::from_string(payload_str.to_string()).map_err(|_| "payload is not valid json")?;

    let channel = Channel::token(key);
    let ts = timestamp_millis.unwrap_or_else(now_millis);
    Ok((channel, BroadcastRecord::new(topic.type_tag(), ts, data)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn index() -> HashMap<String, Topic> {
        ["trades", "liquidity", "metadata", "social", "community", "creation", "analytics", "balances"]
            .into_iter()
            .map(str::to_string)
            .zip(Topic::ALL)
            .collect()
    }

    #[test]
    fn decodes_a_well_formed_trade_record() {
        let (channel, record) =
            decode_record(&index(), "trades", Some(b"BTC"), Some(br#"{"p":1}"#), Some(42)).unwrap();
        assert_eq!(channel.as_str(), "token.BTC");
        assert_eq!(record.type_tag, "trade");
        assert_eq!(record.ts, 42);
        assert_eq!(record.data.get(), r#"{"p":1}"#);
    }

    #[test]
    fn rejects_unmapped_topic() {
        assert!(decode_record(&index(), "unknown-topic", Some(b"BTC"), Some(b"{}"), Some(1)).is_err());
    }

    #[test]
    fn rejects_missing_key() {
        assert!(decode_record(&index(), "trades", None, Some(b"{}"), Some(1)).is_err());
    }

    #[test]
    fn rejects_missing_payload() {
        assert!(decode_record(&index(), "trades", Some(b"BTC"), None, Some(1)).is_err());
    }

    #[test]
    fn rejects_malformed_json_payload() {
        assert!(decode_record(&index(), "trades", Some(b"BTC"), Some(b"not json"), Some(1)).is_err());
    }

    #[test]
    fn falls_back_to_wall_clock_when_broker_timestamp_missing() {
        let (_, record) = decode_record(&index(), "trades", Some(b"BTC"), Some(b"{}"), None).unwrap();
        assert!(record.ts > 0);
    }
}
