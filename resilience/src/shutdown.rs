//! Waits for the OS signal that starts the shutdown sequence (the consumer
//! pool stop, drain, and forced-close steps themselves live in the binary's
//! `main`, since they run in a strict order rather than in parallel).
//!
//! ## Usage
//!
//! ```ignore
//! use gateway_resilience::shutdown::wait_for_signal;
//!
//! wait_for_signal().await;
//! // begin the ordered shutdown sequence
//! ```

use tracing::info;

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
///
/// Use this in `main()` to wait for shutdown:
///
/// ```ignore
/// #[tokio::main]
/// async fn main() {
///     // ... start services
///
///     wait_for_signal().await;
///
///     // ... graceful shutdown
/// }
/// ```
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())
            .expect("Failed to register SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to wait for Ctrl+C");
        info!("Received Ctrl+C");
    }
}
