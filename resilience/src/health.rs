//! Health check framework: every dependency the gateway's `/health` endpoint
//! cares about (broker connectivity, connection-count ceiling, memory, CPU)
//! implements [`HealthCheckable`], and [`SystemHealthCheck`] aggregates them
//! into one overall status.
//!
//! ## Usage
//!
//! ```ignore
//! use gateway_resilience::health::*;
//!
//! let mut system_health = SystemHealthCheck::new();
//! system_health.add_check(Arc::new(BrokerHealthCheck::new(consumer)));
//! system_health.add_check(Arc::new(CapacityHealthCheck::new(guard)));
//!
//! let overall = system_health.overall_health().await;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

/// Health status for a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,
    /// Component is degraded but functional (e.g., high latency, limited capacity)
    Degraded,
    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy or degraded (can accept traffic)
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }

    /// Check if status is healthy
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Health check result with details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Current health status
    pub status: HealthStatus,
    /// Human-readable message
    pub message: String,
    /// Timestamp of this health check
    pub last_check: SystemTime,
    /// Additional details (latency, error counts, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,
}

impl ComponentHealth {
    /// Create healthy status
    #[must_use]
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: message.into(),
            last_check: SystemTime::now(),
            details: None,
        }
    }

    /// Create degraded status
    #[must_use]
    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            message: message.into(),
            last_check: SystemTime::now(),
            details: None,
        }
    }

    /// Create unhealthy status
    #[must_use]
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: message.into(),
            last_check: SystemTime::now(),
            details: None,
        }
    }

    /// Add detail to health check
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.get_or_insert_with(HashMap::new).insert(key.into(), value.into());
        self
    }
}

/// Trait for health-checkable components
///
/// Implement this trait for any component that needs health monitoring:
/// - Database connections
/// - External APIs (LLM, search, etc.)
/// - Message queues
/// - Caches
#[async_trait]
pub trait HealthCheckable: Send + Sync {
    /// Check component health
    ///
    /// Should complete quickly (<1s) to avoid blocking health checks.
    async fn check_health(&self) -> ComponentHealth;

    /// Component name for reporting
    fn component_name(&self) -> &str;
}

/// Aggregate health checker for multiple components
///
/// Collects health status from all registered components and
/// determines overall system health.
pub struct SystemHealthCheck {
    checks: Vec<Arc<dyn HealthCheckable>>,
}

impl SystemHealthCheck {
    /// Create new system health checker
    #[must_use]
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
        }
    }

    /// Add a health check
    pub fn add_check(&mut self, check: Arc<dyn HealthCheckable>) {
        self.checks.push(check);
    }

    /// Check all components
    ///
    /// Returns a map of component name to health status.
    pub async fn check_all(&self) -> HashMap<String, ComponentHealth> {
        let mut results = HashMap::new();

        // Run all health checks in parallel
        let check_futures: Vec<_> = self
            .checks
            .iter()
            .map(|check| async move {
                let name = check.component_name().to_string();
                let health = check.check_health().await;
                (name, health)
            })
            .collect();

        // Wait for all checks to complete
        let check_results = futures::future::join_all(check_futures).await;

        for (name, health) in check_results {
            results.insert(name, health);
        }

        results
    }

    /// Determine overall system health
    ///
    /// - Unhealthy if ANY component is unhealthy
    /// - Degraded if ANY component is degraded
    /// - Healthy if ALL components are healthy
    pub async fn overall_health(&self) -> HealthStatus {
        let results = self.check_all().await;

        if results.values().any(|h| h.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if results.values().any(|h| h.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Default for SystemHealthCheck {
    fn default() -> Self {
        Self::new()
    }
}
