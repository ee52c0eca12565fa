//! The HTTP/WebSocket surface of the gateway.
//!
//! This crate owns the single Axum router the binary serves on one port:
//! the `/ws` upgrade and its per-connection read/write pumps, `/health` (an
//! aggregate readiness check over the broker connection, connection-count
//! ceiling, memory, and CPU), `/stats` (a JSON snapshot of the Prometheus
//! counters), `/metrics` (raw Prometheus exposition), and a trivial `/`
//! liveness route. [`state::AppState`] is the one piece of shared state
//! every handler reads from; [`middleware::correlation_id_layer`] tags every
//! request with a correlation id for tracing.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

pub mod handlers;
pub mod middleware;
pub mod state;

pub use middleware::{correlation_id_layer, CorrelationIdExt, CORRELATION_ID_HEADER};
pub use state::AppState;

/// Build the full Axum router: every route the gateway serves, wrapped in
/// the correlation-id middleware and a request/response trace layer.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/ws", get(handlers::websocket_handle))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/metrics", get(handlers::metrics))
        .layer(correlation_id_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
