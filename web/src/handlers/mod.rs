//! HTTP and WebSocket request handlers.
//!
//! This module contains every handler the router wires up, organized by
//! endpoint.

pub mod health;
pub mod metrics;
pub mod stats;
pub mod websocket;

pub use health::{health, root};
pub use metrics::metrics;
pub use stats::stats;
pub use websocket::handle as websocket_handle;
