use thiserror::Error;

/// Errors from sending a command to a shard whose event loop has stopped.
#[derive(Debug, Error)]
pub enum ShardError {
    /// The shard's command channel was closed (its task exited).
    #[error("shard {0} is no longer accepting commands")]
    Closed(usize),
}
