//! CPU-threshold resource guard: a three-state hysteresis machine that
//! gates connection admission and Kafka consumption under load.
//!
//! Modeled on the atomic-counter state machine in
//! `gateway_runtime::circuit_breaker` — a shared sample is read by both the
//! connection handler (admission check) and the consumer pool (pause check)
//! without locking, and transitions require the new regime to persist for a
//! full sample before taking effect.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;

/// The three admission/consumption regimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// CPU at or below the reject threshold. Admit connections, consume freely.
    Normal,
    /// CPU between the reject and pause thresholds. Reject new connections,
    /// keep delivering to existing ones.
    Degraded,
    /// CPU above the pause threshold. Stop enqueuing new Kafka records.
    Paused,
}

impl ResourceState {
    fn from_sample(cpu_percent: f64, reject_threshold: f64, pause_threshold: f64) -> Self {
        if cpu_percent > pause_threshold {
            Self::Paused
        } else if cpu_percent > reject_threshold {
            Self::Degraded
        } else {
            Self::Normal
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Degraded => 1,
            Self::Paused => 2,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Degraded,
            2 => Self::Paused,
            _ => Self::Normal,
        }
    }
}

/// Configuration for the resource guard.
#[derive(Debug, Clone, Copy)]
pub struct ResourceGuardConfig {
    /// CPU percent above which new connections are rejected.
    pub cpu_reject_threshold: f64,
    /// CPU percent above which the consumer pool pauses.
    pub cpu_pause_threshold: f64,
}

/// Shared, lock-free CPU state machine.
///
/// `record_sample` is called once per sampling tick (spec's 2s rolling CPU
/// sample) by a single periodic task. `state`/`should_admit`/`should_consume`
/// are read from any number of connection-handler and consumer-pool tasks
/// without synchronization.
pub struct ResourceGuard {
    config: ResourceGuardConfig,
    state: AtomicU8,
    pending: AtomicU8,
    cpu_percent_bits: AtomicU64,
    memory_mb_bits: AtomicU64,
}

impl ResourceGuard {
    /// Create a new guard, starting in [`ResourceState::Normal`].
    #[must_use]
    pub fn new(config: ResourceGuardConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(ResourceState::Normal.as_u8()),
            pending: AtomicU8::new(ResourceState::Normal.as_u8()),
            cpu_percent_bits: AtomicU64::new(0.0_f64.to_bits()),
            memory_mb_bits: AtomicU64::new(0.0_f64.to_bits()),
        }
    }

    /// Record a fresh CPU sample.
    ///
    /// A transition only takes effect once the computed regime has been
    /// observed on two consecutive samples — one sample's worth of
    /// hysteresis, per spec.
    pub fn record_sample(&self, cpu_percent: f64) {
        self.cpu_percent_bits.store(cpu_percent.to_bits(), Ordering::Relaxed);

        let computed = ResourceState::from_sample(
            cpu_percent,
            self.config.cpu_reject_threshold,
            self.config.cpu_pause_threshold,
        );
        let pending = ResourceState::from_u8(self.pending.load(Ordering::Relaxed));

        if computed == pending {
            self.state.store(computed.as_u8(), Ordering::Relaxed);
        } else {
            self.pending.store(computed.as_u8(), Ordering::Relaxed);
        }
    }

    /// Current regime.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        ResourceState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Most recent CPU sample.
    #[must_use]
    pub fn cpu_percent(&self) -> f64 {
        f64::from_bits(self.cpu_percent_bits.load(Ordering::Relaxed))
    }

    /// Record a fresh resident memory sample, in megabytes. Unlike CPU this
    /// doesn't drive a state transition, only `/health`'s memory watermarks.
    pub fn record_memory_sample(&self, memory_mb: f64) {
        self.memory_mb_bits.store(memory_mb.to_bits(), Ordering::Relaxed);
    }

    /// Most recent resident memory sample, in megabytes.
    #[must_use]
    pub fn memory_mb(&self) -> f64 {
        f64::from_bits(self.memory_mb_bits.load(Ordering::Relaxed))
    }

    /// Whether a new connection should be admitted.
    #[must_use]
    pub fn should_admit(&self) -> bool {
        self.state() == ResourceState::Normal
    }

    /// Whether the consumer pool should keep enqueuing records.
    #[must_use]
    pub fn should_consume(&self) -> bool {
        self.state() != ResourceState::Paused
    }
}

/// Shared handle, cloned into the admission path, the consumer pool, and the
/// periodic CPU sampler.
pub type SharedResourceGuard = Arc<ResourceGuard>;
