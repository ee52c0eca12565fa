//! Periodic CPU/memory sampling that feeds the resource guard and the
//! corresponding Prometheus gauges.
//!
//! Grounded in `sysinfo::System::new_all()` as used for host metrics in
//! `surrealdb-surreal-sync`'s load-test harness — this gateway has no other
//! source of real CPU/memory figures.
//!
//! Tokio task count has no stable introspection API, so `ws_goroutines` is
//! approximated: twice the current connection count plus one task per shard
//! plus one per consumer worker, plus a small fixed overhead for the
//! runtime's own housekeeping tasks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gateway_runtime::metrics::ResourceMetrics;
use sysinfo::System;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::resource_guard::SharedResourceGuard;

const BYTES_PER_MB: f64 = 1_048_576.0;
const BASE_TASK_OVERHEAD: f64 = 8.0;

/// Spawn the periodic sampler. Returns the task handle so callers can abort
/// it during shutdown; the task otherwise runs forever.
#[must_use]
pub fn spawn(
    guard: SharedResourceGuard,
    connections_current: Arc<AtomicUsize>,
    shard_count: usize,
    worker_pool_size: usize,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run(guard, connections_current, shard_count, worker_pool_size, interval).await;
    })
}

async fn run(
    guard: SharedResourceGuard,
    connections_current: Arc<AtomicUsize>,
    shard_count: usize,
    worker_pool_size: usize,
    interval: Duration,
) {
    let mut system = System::new_all();
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tick.tick().await;

        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu_percent = f64::from(system.global_cpu_usage());
        let memory_mb = system.used_memory() as f64 / BYTES_PER_MB;
        let goroutines = 2.0 * connections_current.load(Ordering::Relaxed) as f64
            + shard_count as f64
            + worker_pool_size as f64
            + BASE_TASK_OVERHEAD;

        guard.record_sample(cpu_percent);
        guard.record_memory_sample(memory_mb);
        ResourceMetrics::set_cpu_percent(cpu_percent);
        ResourceMetrics::set_memory_mb(memory_mb);
        ResourceMetrics::set_goroutines(goroutines);

        debug!(cpu_percent, memory_mb, goroutines, "resource sample recorded");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resource_guard::{ResourceGuard, ResourceGuardConfig};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn sampler_records_at_least_one_sample() {
        let guard: SharedResourceGuard = Arc::new(ResourceGuard::new(ResourceGuardConfig {
            cpu_reject_threshold: 75.0,
            cpu_pause_threshold: 80.0,
        }));
        let connections = Arc::new(AtomicUsize::new(10));

        let handle = spawn(Arc::clone(&guard), Arc::clone(&connections), 3, 32, StdDuration::from_millis(10));
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        handle.abort();

        assert!(guard.cpu_percent() >= 0.0);
    }
}
