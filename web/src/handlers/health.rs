//! `GET /health`: an aggregate readiness/liveness check used by load
//! balancers and orchestrators.
//!
//! Four independent [`HealthCheckable`] components are evaluated on every
//! request: the broker connection, the connection-count ceiling, resident
//! memory, and CPU. The worst of the four decides the overall status and the
//! HTTP status code; a component's own message becomes a warning (degraded)
//! or error (unhealthy) line in the response body.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use gateway_resilience::{ComponentHealth, HealthCheckable, HealthStatus, SharedResourceGuard, SystemHealthCheck};
use serde::Serialize;

use crate::state::AppState;

/// Whether the Kafka/Redpanda consumer pool currently holds a live broker
/// connection. Loss of the broker connection is surfaced here rather than
/// recovered locally.
struct BrokerHealthCheck {
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl HealthCheckable for BrokerHealthCheck {
    async fn check_health(&self) -> ComponentHealth {
        if self.connected.load(Ordering::Relaxed) {
            ComponentHealth::healthy("consumer pool connected")
        } else {
            ComponentHealth::unhealthy("consumer pool has no live broker connection")
        }
    }

    fn component_name(&self) -> &str {
        "broker"
    }
}

/// Connection count relative to `max_connections`. Being at the ceiling
/// isn't a failure by itself (the admission gate already rejects new
/// upgrades) but is worth flagging before it happens.
struct CapacityHealthCheck {
    connections_current: Arc<AtomicUsize>,
    max_connections: usize,
}

#[async_trait]
impl HealthCheckable for CapacityHealthCheck {
    async fn check_health(&self) -> ComponentHealth {
        let current = self.connections_current.load(Ordering::Relaxed);
        let ratio = if self.max_connections == 0 { 1.0 } else { current as f64 / self.max_connections as f64 };

        let health = if ratio >= 0.9 {
            ComponentHealth::degraded(format!("{current}/{} connections, approaching capacity", self.max_connections))
        } else {
            ComponentHealth::healthy(format!("{current}/{} connections", self.max_connections))
        };

        health.with_detail("connections_current", current as i64).with_detail("max_connections", self.max_connections as i64)
    }

    fn component_name(&self) -> &str {
        "capacity"
    }
}

/// Resident memory relative to `max_memory_mb`: 80% warn, 90% critical.
struct MemoryHealthCheck {
    guard: SharedResourceGuard,
    max_memory_mb: f64,
}

#[async_trait]
impl HealthCheckable for MemoryHealthCheck {
    async fn check_health(&self) -> ComponentHealth {
        let memory_mb = self.guard.memory_mb();
        let ratio = if self.max_memory_mb <= 0.0 { 1.0 } else { memory_mb / self.max_memory_mb };

        let health = if ratio >= 0.9 {
            ComponentHealth::unhealthy(format!("memory at {:.0}% of {:.0}MB limit", ratio * 100.0, self.max_memory_mb))
        } else if ratio >= 0.8 {
            ComponentHealth::degraded(format!("memory at {:.0}% of {:.0}MB limit", ratio * 100.0, self.max_memory_mb))
        } else {
            ComponentHealth::healthy(format!("memory at {:.0}% of {:.0}MB limit", ratio * 100.0, self.max_memory_mb))
        };

        health.with_detail("memory_mb", memory_mb)
    }

    fn component_name(&self) -> &str {
        "memory"
    }
}

/// CPU resource-guard state. A paused consumer pool degrades `/health`
/// rather than failing it outright: it's visible externally as higher
/// consumer lag and a status-degraded `/health`, not a hard failure.
struct CpuHealthCheck {
    guard: SharedResourceGuard,
}

#[async_trait]
impl HealthCheckable for CpuHealthCheck {
    async fn check_health(&self) -> ComponentHealth {
        let cpu_percent = self.guard.cpu_percent();
        let health = match self.guard.state() {
            gateway_resilience::ResourceState::Normal => ComponentHealth::healthy(format!("cpu at {cpu_percent:.1}%")),
            gateway_resilience::ResourceState::Degraded => {
                ComponentHealth::degraded(format!("cpu at {cpu_percent:.1}%, rejecting new connections"))
            },
            gateway_resilience::ResourceState::Paused => {
                ComponentHealth::degraded(format!("cpu at {cpu_percent:.1}%, consumer pool paused"))
            },
        };

        health.with_detail("cpu_percent", cpu_percent)
    }

    fn component_name(&self) -> &str {
        "cpu"
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    healthy: bool,
    checks: HealthChecks,
    warnings: Vec<String>,
    errors: Vec<String>,
    uptime: u64,
}

#[derive(Serialize)]
struct HealthChecks {
    broker: ComponentHealth,
    capacity: ComponentHealth,
    memory: ComponentHealth,
    cpu: ComponentHealth,
}

fn status_label(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Healthy => "healthy",
        HealthStatus::Degraded => "degraded",
        HealthStatus::Unhealthy => "unhealthy",
    }
}

fn worst_of(results: &HealthChecks) -> HealthStatus {
    let statuses = [results.broker.status, results.capacity.status, results.memory.status, results.cpu.status];

    if statuses.iter().any(|s| *s == HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else if statuses.iter().any(|s| *s == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// `GET /health`. `200` when healthy or degraded, `503` when unhealthy.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut system = SystemHealthCheck::new();
    system.add_check(Arc::new(BrokerHealthCheck { connected: Arc::clone(&state.broker_connected) }));
    system.add_check(Arc::new(CapacityHealthCheck {
        connections_current: Arc::clone(&state.connections_current),
        max_connections: state.config.max_connections,
    }));
    system.add_check(Arc::new(MemoryHealthCheck {
        guard: Arc::clone(&state.resource_guard),
        max_memory_mb: state.config.max_memory_mb,
    }));
    system.add_check(Arc::new(CpuHealthCheck { guard: Arc::clone(&state.resource_guard) }));

    let mut results = system.check_all().await;
    let checks = HealthChecks {
        broker: results.remove("broker").unwrap_or_else(|| ComponentHealth::unhealthy("check did not run")),
        capacity: results.remove("capacity").unwrap_or_else(|| ComponentHealth::unhealthy("check did not run")),
        memory: results.remove("memory").unwrap_or_else(|| ComponentHealth::unhealthy("check did not run")),
        cpu: results.remove("cpu").unwrap_or_else(|| ComponentHealth::unhealthy("check did not run")),
    };

    let overall = worst_of(&checks);
    let status_code = if overall.is_ready() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    let warnings = [&checks.broker, &checks.capacity, &checks.memory, &checks.cpu]
        .iter()
        .filter(|c| c.status == HealthStatus::Degraded)
        .map(|c| c.message.clone())
        .collect();
    let errors = [&checks.broker, &checks.capacity, &checks.memory, &checks.cpu]
        .iter()
        .filter(|c| c.status == HealthStatus::Unhealthy)
        .map(|c| c.message.clone())
        .collect();

    let response = HealthResponse {
        status: status_label(overall),
        healthy: overall == HealthStatus::Healthy,
        checks,
        warnings,
        errors,
        uptime: state.started_at.elapsed().as_secs(),
    };

    (status_code, Json(response))
}

/// `GET /`. Trivial liveness text independent of `/health`'s dependency
/// checks — used only to confirm the process is accepting HTTP at all.
pub async fn root() -> &'static str {
    "ok"
}
