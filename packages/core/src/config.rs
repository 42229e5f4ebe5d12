//! Stream and server configuration.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Prefix for per-stream environment overrides, e.g. `DOCSTREAM_EXAMPLE_WORKERS`.
pub const ENV_PREFIX: &str = "DOCSTREAM_";

/// Configuration for a single stream's queue and worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Number of pipeline workers; fixed for the stream's lifetime.
    pub workers: usize,
    /// Maximum number of jobs waiting in the queue.
    pub queue_capacity: usize,
    /// How long a submission waits on a full queue before retrying.
    pub enqueue_timeout_ms: u64,
    /// Wake interval for idle workers to re-check the queue state.
    pub poll_interval_ms: u64,
    /// Wait slice used by blocking shutdown between progress logs.
    pub shutdown_poll_secs: u64,
    /// Restart behavior for crashed workers.
    pub restart: RestartPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 10_000,
            enqueue_timeout_ms: 1_000,
            poll_interval_ms: 1_000,
            shutdown_poll_secs: 30,
            restart: RestartPolicy::default(),
        }
    }
}

impl StreamConfig {
    /// Set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set how long one enqueue attempt waits for free space.
    pub fn with_enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the idle wake interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the restart policy.
    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_poll(&self) -> Duration {
        Duration::from_secs(self.shutdown_poll_secs)
    }

    /// Reject values the dispatch engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        if self.shutdown_poll_secs == 0 {
            return Err(ConfigError::Invalid("shutdown_poll_secs must be positive".into()));
        }
        Ok(())
    }
}

/// Bounded restart budget for a single worker slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartPolicy {
    /// Consecutive restarts allowed before the slot is given up.
    pub max_restarts: u32,
    /// Delay before the first restart.
    pub initial_backoff_ms: u64,
    /// Upper bound for the doubling backoff.
    pub max_backoff_ms: u64,
    /// An incarnation that ran this long resets the consecutive count.
    pub stable_after_secs: u64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            stable_after_secs: 60,
        }
    }
}

impl RestartPolicy {
    /// Backoff before the given (1-based) consecutive restart.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }

    pub fn stable_after(&self) -> Duration {
        Duration::from_secs(self.stable_after_secs)
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Settings used for streams without an explicit entry.
    pub default_stream: StreamConfig,
    /// Per-stream settings keyed by stream name.
    pub streams: HashMap<String, StreamConfig>,
    /// Buffer size of the dispatch event channel.
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_stream: StreamConfig::default(),
            streams: HashMap::new(),
            event_capacity: 1024,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: ServerConfig = serde_json::from_str(&raw)?;
        config.default_stream.validate()?;
        for (name, stream) in &config.streams {
            stream
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("stream '{}': {}", name, e)))?;
        }
        Ok(config)
    }

    /// Resolve the settings for a stream, applying environment overrides.
    pub fn stream_config(&self, name: &str) -> Result<StreamConfig, ConfigError> {
        self.stream_config_with(name, |key| std::env::var(key).ok())
    }

    /// Like [`ServerConfig::stream_config`] with an explicit variable lookup.
    pub fn stream_config_with(
        &self,
        name: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<StreamConfig, ConfigError> {
        let explicit = self
            .streams
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, config)| config.clone());
        let configured = explicit.is_some();
        let mut config = explicit.unwrap_or_else(|| self.default_stream.clone());

        let key = workers_env_key(name);
        match lookup(&key) {
            Some(raw) => {
                config.workers = raw.trim().parse().map_err(|_| {
                    ConfigError::Invalid(format!("{} must be an integer, got '{}'", key, raw))
                })?;
            }
            None if !configured => {
                tracing::warn!(
                    "Worker count for stream '{}' was not configured; set {} as your CPU allows",
                    name,
                    key
                );
            }
            None => {}
        }

        config.validate()?;
        Ok(config)
    }
}

/// Environment variable overriding the worker count of a stream.
pub fn workers_env_key(stream: &str) -> String {
    let normalized: String = stream
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}_WORKERS", ENV_PREFIX, normalized)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
