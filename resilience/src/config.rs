//! Gateway configuration: environment-variable based, validated once at
//! startup, centralizing every tunable in spec's external-interfaces option
//! set rather than scattering `env::var` calls through `main`.
//!
//! # Example
//!
//! ```no_run
//! use gateway_resilience::config::{Config, Environment};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! println!("shard_count: {}", config.shard_count);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration loading/validation errors.
#[derive(Debug)]
pub enum ConfigError {
    /// A required environment variable was not set.
    EnvVarNotSet(String),
    /// `CONFIG_ENV`/`ENVIRONMENT` held an unrecognized value.
    InvalidEnvironment(String),
    /// A loaded value failed a validation rule.
    ValidationError(String),
    /// An environment variable's value could not be parsed as its expected type.
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnvVarNotSet(var) => write!(f, "environment variable not set: {var}"),
            Self::InvalidEnvironment(env) => write!(f, "invalid environment: {env}"),
            Self::ValidationError(msg) => write!(f, "configuration validation failed: {msg}"),
            Self::ParseError(msg) => write!(f, "failed to parse configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Deployment environment, used only to pick logging verbosity defaults —
/// the gateway has no per-environment behavioral branches beyond that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.
    Development,
    /// Pre-production.
    Staging,
    /// Production.
    Production,
}

impl Environment {
    /// Parse from a `CONFIG_ENV`-style string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvironment`] if `s` doesn't match a
    /// recognized spelling.
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Development),
            "staging" | "stage" => Ok(Self::Staging),
            "prod" | "production" => Ok(Self::Production),
            _ => Err(ConfigError::InvalidEnvironment(s.to_string())),
        }
    }

    /// The `tracing` `EnvFilter` directive this environment defaults to
    /// when `RUST_LOG` isn't set.
    #[must_use]
    pub const fn default_log_level(self) -> &'static str {
        match self {
            Self::Development => "debug",
            Self::Staging => "info",
            Self::Production => "warn",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// The gateway's full runtime configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment environment (logging verbosity default only).
    pub environment: Environment,

    /// Admission cap: `ws_connections_current` may never exceed this.
    pub max_connections: usize,
    /// Number of shard tasks; client assignment is `client_id mod shard_count`.
    pub shard_count: usize,
    /// Consumer pool worker count. Default: `max(32, max_connections / 40)`.
    pub worker_pool_size: usize,
    /// Per-worker internal queue depth. Default: `worker_pool_size * 100`.
    pub worker_queue_size: usize,
    /// Soft ceiling on live tokio tasks; crossed only on a leak, never
    /// enforced by killing tasks.
    pub max_goroutines: usize,

    /// CPU percent above which new connections are rejected (DEGRADED).
    pub cpu_reject_threshold: f64,
    /// CPU percent above which the consumer pool pauses (PAUSED).
    pub cpu_pause_threshold: f64,
    /// Resident memory ceiling in megabytes, used only by `/health`'s
    /// 80%-warn/90%-critical memory watermarks — not enforced as a hard cap.
    pub max_memory_mb: f64,

    /// Upstream consume rate cap in msg/sec; 0 disables the cap.
    pub max_kafka_rate: u32,
    /// Per-shard broadcast rate cap in msg/sec; 0 disables the cap.
    pub max_broadcast_rate: u32,

    /// Broker bootstrap addresses.
    pub kafka_brokers: Vec<String>,
    /// Shared consumer group id for the consumer pool.
    pub kafka_group_id: String,
    /// The eight physical topic names, in [`gateway_core::Topic::ALL`] order.
    pub kafka_topics: [String; 8],

    /// Per-client replay window size (K).
    pub replay_buffer_size: usize,
    /// Per-client outbound queue capacity.
    pub send_queue_size: usize,
    /// Graceful shutdown connection-drain budget.
    pub shutdown_grace: Duration,

    /// Address the HTTP/WebSocket listener binds to.
    pub bind_addr: String,
}

impl Config {
    /// Load configuration from the process environment, applying
    /// environment-specific log-level defaults and then validating the
    /// result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `CONFIG_ENV` is set to an unrecognized
    /// value, any numeric environment variable fails to parse, or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_str = std::env::var("CONFIG_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_str)?;

        let max_connections = parse_env("MAX_CONNECTIONS", 10_000)?;
        let shard_count = parse_env("SHARD_COUNT", 3)?;
        let default_workers = (max_connections / 40).max(32);
        let worker_pool_size = parse_env("WORKER_POOL_SIZE", default_workers)?;
        let worker_queue_size = parse_env("WORKER_QUEUE_SIZE", worker_pool_size * 100)?;
        let max_goroutines = parse_env("MAX_GOROUTINES", max_connections * 2 + shard_count + 64)?;

        let cpu_reject_threshold = parse_env("CPU_REJECT_THRESHOLD", 75.0)?;
        let cpu_pause_threshold = parse_env("CPU_PAUSE_THRESHOLD", 80.0)?;
        let max_memory_mb = parse_env("MAX_MEMORY_MB", 4096.0)?;

        let max_kafka_rate = parse_env("MAX_KAFKA_RATE", 0)?;
        let max_broadcast_rate = parse_env("MAX_BROADCAST_RATE", 0)?;

        let kafka_brokers = std::env::var("KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(str::trim)
            .map(str::to_string)
            .collect();
        let kafka_group_id =
            std::env::var("KAFKA_GROUP_ID").unwrap_or_else(|_| "token-gateway".to_string());
        let kafka_topics = parse_topics()?;

        let replay_buffer_size = parse_env("REPLAY_BUFFER_SIZE", 100)?;
        let send_queue_size = parse_env("SEND_QUEUE_SIZE", 256)?;
        let shutdown_grace = Duration::from_secs(parse_env("SHUTDOWN_GRACE_SECS", 30)?);

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let config = Self {
            environment,
            max_connections,
            shard_count,
            worker_pool_size,
            worker_queue_size,
            max_goroutines,
            cpu_reject_threshold,
            cpu_pause_threshold,
            max_memory_mb,
            max_kafka_rate,
            max_broadcast_rate,
            kafka_brokers,
            kafka_group_id,
            kafka_topics,
            replay_buffer_size,
            send_queue_size,
            shutdown_grace,
            bind_addr,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants the individual parses can't catch.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first
    /// violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shard_count == 0 {
            return Err(ConfigError::ValidationError("shard_count must be > 0".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationError("max_connections must be > 0".to_string()));
        }
        if self.cpu_reject_threshold <= 0.0 || self.cpu_reject_threshold > 100.0 {
            return Err(ConfigError::ValidationError(
                "cpu_reject_threshold must be in (0, 100]".to_string(),
            ));
        }
        if self.cpu_pause_threshold < self.cpu_reject_threshold {
            return Err(ConfigError::ValidationError(
                "cpu_pause_threshold must be >= cpu_reject_threshold".to_string(),
            ));
        }
        if self.max_memory_mb <= 0.0 {
            return Err(ConfigError::ValidationError("max_memory_mb must be > 0".to_string()));
        }
        if self.replay_buffer_size == 0 {
            return Err(ConfigError::ValidationError("replay_buffer_size must be > 0".to_string()));
        }
        if self.send_queue_size == 0 {
            return Err(ConfigError::ValidationError("send_queue_size must be > 0".to_string()));
        }
        if self.kafka_brokers.is_empty() {
            return Err(ConfigError::ValidationError("kafka_brokers must not be empty".to_string()));
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::ParseError(format!("{key}={raw}"))),
        Err(_) => Ok(default),
    }
}

fn parse_topics() -> Result<[String; 8], ConfigError> {
    let default = [
        "trades", "liquidity", "metadata", "social", "community", "creation", "analytics",
        "balances",
    ];
    let raw = std::env::var("KAFKA_TOPICS").ok();
    let names: Vec<String> = match raw {
        Some(list) => list.split(',').map(str::trim).map(str::to_string).collect(),
        None => default.iter().map(|s| (*s).to_string()).collect(),
    };
    let array: [String; 8] = names
        .try_into()
        .map_err(|v: Vec<String>| ConfigError::ValidationError(format!("expected 8 kafka_topics, got {}", v.len())))?;
    Ok(array)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn environment_from_str_accepts_aliases() {
        assert_eq!(Environment::from_str("dev").unwrap(), Environment::Development);
        assert_eq!(Environment::from_str("prod").unwrap(), Environment::Production);
        assert!(Environment::from_str("nope").is_err());
    }

    #[test]
    fn validate_rejects_zero_shard_count() {
        let mut config = sample_config();
        config.shard_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_pause_below_reject_threshold() {
        let mut config = sample_config();
        config.cpu_reject_threshold = 80.0;
        config.cpu_pause_threshold = 75.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_memory_ceiling() {
        let mut config = sample_config();
        config.max_memory_mb = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_sample_config() {
        assert!(sample_config().validate().is_ok());
    }

    fn sample_config() -> Config {
        Config {
            environment: Environment::Development,
            max_connections: 10_000,
            shard_count: 3,
            worker_pool_size: 32,
            worker_queue_size: 3200,
            max_goroutines: 20_064,
            cpu_reject_threshold: 75.0,
            cpu_pause_threshold: 80.0,
            max_memory_mb: 4096.0,
            max_kafka_rate: 0,
            max_broadcast_rate: 0,
            kafka_brokers: vec!["localhost:9092".to_string()],
            kafka_group_id: "token-gateway".to_string(),
            kafka_topics: [
                "trades".to_string(),
                "liquidity".to_string(),
                "metadata".to_string(),
                "social".to_string(),
                "community".to_string(),
                "creation".to_string(),
                "analytics".to_string(),
                "balances".to_string(),
            ],
            replay_buffer_size: 100,
            send_queue_size: 256,
            shutdown_grace: Duration::from_secs(30),
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}
