//! Bulkhead pattern for resource isolation: isolates concurrent usage of a
//! resource so saturation in one area doesn't cascade into others.
//!
//! ## Concept
//!
//! Named after ship bulkheads that prevent water from flooding the entire ship,
//! this pattern isolates resources (threads, connections, etc.) so failures in
//! one area don't affect others.
//!
//! ## Usage
//!
//! ```ignore
//! use gateway_resilience::bulkhead::*;
//!
//! let config = BulkheadConfig {
//!     max_concurrent: 10,
//!     acquire_timeout: Duration::from_secs(5),
//! };
//!
//! let bulkhead = Bulkhead::new("offset_commit".into(), config);
//!
//! // Execute with resource isolation
//! let result = bulkhead.execute(async {
//!     expensive_operation().await
//! }).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

/// Bulkhead configuration for resource isolation
#[derive(Debug, Clone)]
pub struct BulkheadConfig {
    /// Maximum concurrent operations allowed
    pub max_concurrent: usize,
    /// Timeout for acquiring a permit
    pub acquire_timeout: Duration,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Bulkhead for isolating resource usage
///
/// Uses semaphores to limit concurrent operations, preventing
/// resource exhaustion in one area from affecting others.
pub struct Bulkhead {
    name: String,
    semaphore: Arc<Semaphore>,
    config: BulkheadConfig,
}

impl Bulkhead {
    /// Create new bulkhead
    ///
    /// # Arguments
    ///
    /// * `name` - Name for logging (e.g., "`llm_calls`", "`database_queries`")
    /// * `config` - Bulkhead configuration
    #[must_use]
    pub fn new(name: String, config: BulkheadConfig) -> Self {
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
        }
    }

    /// Execute function within bulkhead
    ///
    /// Acquires a permit (waits if necessary), executes function,
    /// then releases permit automatically.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Cannot acquire permit within timeout
    /// - Semaphore is closed
    pub async fn execute<F, T>(&self, f: F) -> Result<T, String>
    where
        F: std::future::Future<Output = T>,
    {
        // Try to acquire permit with timeout
        let permit = tokio::time::timeout(self.config.acquire_timeout, self.semaphore.acquire())
            .await
            .map_err(|_| {
                warn!(
                    "Bulkhead {} acquire timeout after {:?}",
                    self.name, self.config.acquire_timeout
                );
                format!(
                    "Bulkhead {} acquire timeout after {:?}",
                    self.name, self.config.acquire_timeout
                )
            })?
            .map_err(|e| {
                format!("Bulkhead {} acquire failed: {}", self.name, e)
            })?;

        info!("Acquired bulkhead permit for {}", self.name);

        // Execute function
        let result = f.await;

        // Permit is automatically released when dropped
        drop(permit);

        Ok(result)
    }

    /// Acquire a permit the caller holds directly, for resources whose
    /// lifetime isn't a single `Future` the bulkhead can wrap — e.g. a
    /// WebSocket connection, where admission must be decided before the
    /// upgrade response is sent but the permit needs to live as long as the
    /// socket does.
    ///
    /// # Errors
    ///
    /// Returns an error if no permit becomes available within
    /// `acquire_timeout`, or the semaphore has been closed.
    pub async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, String> {
        tokio::time::timeout(self.config.acquire_timeout, Arc::clone(&self.semaphore).acquire_owned())
            .await
            .map_err(|_| {
                warn!("Bulkhead {} acquire timeout after {:?}", self.name, self.config.acquire_timeout);
                format!("Bulkhead {} acquire timeout after {:?}", self.name, self.config.acquire_timeout)
            })?
            .map_err(|e| format!("Bulkhead {} acquire failed: {}", self.name, e))
    }

    /// Get number of available permits
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get bulkhead name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get max concurrent operations
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_bulkhead_allows_concurrent_operations() {
        let config = BulkheadConfig {
            max_concurrent: 3,
            acquire_timeout: Duration::from_secs(5),
        };

        let bulkhead = Arc::new(Bulkhead::new("test".to_string(), config));

        let counter = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];

        for _ in 0..3 {
            let bulkhead = Arc::clone(&bulkhead);
            let counter = Arc::clone(&counter);

            let handle = tokio::spawn(async move {
                bulkhead
                    .execute(async {
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        counter.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            });

            handles.push(handle);
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // All should complete
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bulkhead_limits_concurrent_operations() {
        let config = BulkheadConfig {
            max_concurrent: 2,
            acquire_timeout: Duration::from_secs(5),
        };

        let bulkhead = Arc::new(Bulkhead::new("test".to_string(), config));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];

        for _ in 0..5 {
            let bulkhead = Arc::clone(&bulkhead);
            let max_concurrent = Arc::clone(&max_concurrent);

            let handle = tokio::spawn(async move {
                bulkhead
                    .execute(async {
                        let current = max_concurrent.fetch_add(1, Ordering::SeqCst) + 1;

                        // Sleep to ensure overlap
                        tokio::time::sleep(Duration::from_millis(50)).await;

                        max_concurrent.fetch_sub(1, Ordering::SeqCst);

                        current
                    })
                    .await
                    .unwrap()
            });

            handles.push(handle);
        }

        let mut max_seen = 0;
        for handle in handles {
            let current = handle.await.unwrap();
            max_seen = max_seen.max(current);
        }

        // Should never exceed max_concurrent
        assert!(max_seen <= 2, "Max concurrent was {}, expected <= 2", max_seen);
    }

    #[tokio::test]
    async fn test_bulkhead_timeout() {
        let config = BulkheadConfig {
            max_concurrent: 1,
            acquire_timeout: Duration::from_millis(100),
        };

        let bulkhead = Arc::new(Bulkhead::new("test".to_string(), config));

        // Start a long-running operation
        let bulkhead1 = Arc::clone(&bulkhead);
        let handle1 = tokio::spawn(async move {
            bulkhead1
                .execute(async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                })
                .await
        });

        // Give it time to acquire
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Try to acquire another (should timeout)
        let result = bulkhead.execute(async { "should timeout" }).await;

        assert!(result.is_err());
        assert!(result.unwrap_err().contains("timeout"));

        // Cleanup
        handle1.await.ok();
    }

    #[tokio::test]
    async fn test_bulkhead_available_permits() {
        let config = BulkheadConfig {
            max_concurrent: 5,
            acquire_timeout: Duration::from_secs(5),
        };

        let bulkhead = Arc::new(Bulkhead::new("test".to_string(), config));

        assert_eq!(bulkhead.available_permits(), 5);

        // Acquire one
        let _result = bulkhead.execute(async { 42 }).await.unwrap();

        // Back to 5 (permit released)
        assert_eq!(bulkhead.available_permits(), 5);
    }

    #[tokio::test]
    async fn test_acquire_permit_is_held_until_dropped() {
        let config = BulkheadConfig {
            max_concurrent: 1,
            acquire_timeout: Duration::from_millis(100),
        };
        let bulkhead = Bulkhead::new("ws_admission".to_string(), config);

        let permit = bulkhead.acquire_permit().await.unwrap();
        assert_eq!(bulkhead.available_permits(), 0);

        assert!(bulkhead.acquire_permit().await.is_err());

        drop(permit);
        assert_eq!(bulkhead.available_permits(), 1);
    }

    #[test]
    fn test_bulkhead_getters() {
        let config = BulkheadConfig {
            max_concurrent: 15,
            acquire_timeout: Duration::from_secs(10),
        };

        let bulkhead = Bulkhead::new("test".to_string(), config);

        assert_eq!(bulkhead.name(), "test");
        assert_eq!(bulkhead.max_concurrent(), 15);
    }

}
