//! Resilience and operability primitives for the gateway: environment-driven
//! configuration, aggregate health checks, the shutdown-signal wait, a
//! token-bucket rate limiter, a concurrency-limiting bulkhead, the
//! CPU-threshold resource guard, and the periodic sampler that feeds it real
//! CPU/memory readings.

#![allow(clippy::missing_const_for_fn)]

pub mod bulkhead;
pub mod config;
pub mod health;
pub mod rate_limiter;
pub mod resource_guard;
pub mod sampler;
pub mod shutdown;

pub use bulkhead::{Bulkhead, BulkheadConfig};
pub use config::{Config, ConfigError, Environment};
pub use health::{ComponentHealth, HealthCheckable, HealthStatus, SystemHealthCheck};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use resource_guard::{ResourceGuard, ResourceGuardConfig, ResourceState, SharedResourceGuard};
pub use shutdown::wait_for_signal;
