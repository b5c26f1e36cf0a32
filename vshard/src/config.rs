use crate::error::{Result, VShardError};
use crate::pool::PoolOptions;
use crate::shard::{HashAlgorithm, KeyNormalization};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Sharded pool configuration
///
/// Fixed once the pool is built: the server list, pool sizing and the key
/// placement strategies cannot change afterwards.
///
/// ```yaml
/// servers:
///   - 127.0.0.1:21210
///   - 127.0.0.1:21211
/// capacity: 10
/// max_capacity: 10
/// idle_timeout_ms: 5000
/// hash_algorithm: fingerprint64
/// key_normalization: identity
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VShardConfig {
    /// Shard addresses, in shard order
    pub servers: Vec<String>,

    /// Idle connections retained per shard
    pub capacity: usize,

    /// Concurrent leases allowed per shard
    pub max_capacity: usize,

    /// Idle connection lifetime (milliseconds)
    pub idle_timeout_ms: u64,

    /// TCP connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Maximum wait for a free connection (milliseconds)
    pub acquire_timeout_ms: u64,

    /// Request round-trip timeout (milliseconds)
    pub io_timeout_ms: u64,

    /// Fingerprint used for shard selection
    pub hash_algorithm: HashAlgorithm,

    /// Rewrite applied to stored keys
    pub key_normalization: KeyNormalization,
}

impl Default for VShardConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            capacity: 5,
            max_capacity: 5,
            idle_timeout_ms: 500,
            connect_timeout_ms: 200,
            acquire_timeout_ms: 5000,
            io_timeout_ms: 1000,
            hash_algorithm: HashAlgorithm::default(),
            key_normalization: KeyNormalization::default(),
        }
    }
}

impl VShardConfig {
    /// Create a configuration for the given shard addresses
    pub fn new<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            servers: servers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: VShardConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Set idle and maximum pool sizes
    pub fn with_capacity(mut self, capacity: usize, max_capacity: usize) -> Self {
        self.capacity = capacity;
        self.max_capacity = max_capacity;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    pub fn with_key_normalization(mut self, normalization: KeyNormalization) -> Self {
        self.key_normalization = normalization;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(VShardError::InvalidConfig(msg));

        if self.servers.is_empty() {
            return invalid("at least one server is required".to_string());
        }
        if let Some(slot) = self.servers.iter().position(|s| s.trim().is_empty()) {
            return invalid(format!("server {} has an empty address", slot));
        }
        if self.max_capacity == 0 {
            return invalid("max_capacity must be greater than 0".to_string());
        }
        if self.max_capacity > tokio::sync::Semaphore::MAX_PERMITS {
            return invalid(format!(
                "max_capacity must not exceed {}",
                tokio::sync::Semaphore::MAX_PERMITS
            ));
        }
        if self.capacity > self.max_capacity {
            return invalid(format!(
                "capacity {} exceeds max_capacity {}",
                self.capacity, self.max_capacity
            ));
        }
        if self.connect_timeout_ms == 0 || self.acquire_timeout_ms == 0 || self.io_timeout_ms == 0
        {
            return invalid("timeouts must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Per-shard pool settings
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            capacity: self.capacity,
            max_capacity: self.max_capacity,
            idle_timeout: self.idle_timeout(),
            connect_timeout: self.connect_timeout(),
            acquire_timeout: self.acquire_timeout(),
        }
    }
}
