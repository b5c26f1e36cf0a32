//! Error types for vshard

use std::time::Duration;
use thiserror::Error;

/// Result type alias for vshard operations
pub type Result<T> = std::result::Result<T, VShardError>;

/// vshard error types
#[derive(Error, Debug)]
pub enum VShardError {
    /// Read targeted a key that is absent from its shard
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// No connection became available on a shard before the acquire timeout
    #[error("Pool exhausted on shard {slot}: no connection available after {timeout:?}")]
    PoolExhausted { slot: usize, timeout: Duration },

    /// Opening a new connection to a shard failed
    #[error("Connect to shard {slot} ({server}) failed: {reason}")]
    ConnectFailed {
        slot: usize,
        server: String,
        reason: String,
    },

    /// A shard could not be reached while the cluster was being built
    #[error("Can't connect to memcached {slot} ({server}): {reason}")]
    ShardUnreachable {
        slot: usize,
        server: String,
        reason: String,
    },

    /// Shard index outside of the shard table
    #[error("Invalid server {index} (of total {num_shards})")]
    InvalidShardIndex { index: usize, num_shards: usize },

    /// Server replied with an error or with something we could not parse
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Transport failure on the underlying socket
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request round-trip exceeded the IO timeout
    #[error("Operation timeout")]
    Timeout,

    /// Key cannot be sent over the memcache text protocol
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VShardError {
    /// Whether the connection that produced this error can no longer be trusted.
    ///
    /// Transport failures and unparseable replies leave the stream in an unknown
    /// position, so the lease is closed instead of going back to the free list.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout | Self::Protocol(_))
    }
}

impl From<tokio::time::error::Elapsed> for VShardError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        VShardError::Timeout
    }
}
