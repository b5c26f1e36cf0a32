//! # vshard
//!
//! Client-side sharding for memcached-compatible cache clusters
//!
//! ## Features
//!
//! - **Deterministic placement**: MD5, FarmHash or xxHash fingerprints placed with jump consistent hash
//! - **Per-shard pools**: bounded leases, idle eviction, acquire timeout and wait statistics
//! - **Full command set**: get / gets / set / add / replace / append / prepend / cas / delete / flush_all
//! - **Bulk reads**: multi-key `gets` fanned out to the owning shards only
//! - **Async/Await**: built on Tokio, share the pool across tasks with `Arc`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use vshard::{HashAlgorithm, ShardedPool, VShardConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = VShardConfig::new(["127.0.0.1:21210", "127.0.0.1:21211"])
//!         .with_capacity(10, 10)
//!         .with_idle_timeout(Duration::from_secs(5))
//!         .with_hash_algorithm(HashAlgorithm::XxHash64);
//!     let pool = ShardedPool::from_config(config).await?;
//!
//!     pool.set("user:1", 0, 0, b"John Doe").await?;
//!     let value = pool.get("user:1").await?;
//!     println!("Value: {:?}", String::from_utf8_lossy(&value));
//!
//!     for shard in pool.status() {
//!         println!("{} {}: {} available", shard.slot, shard.server, shard.stats.available);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod bulk;
mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod memcache;
pub mod pool;
pub mod router;
pub mod shard;

#[cfg(test)]
mod test_support;

pub use config::VShardConfig;
pub use connection::{CacheResult, Connection, Connector};
pub use error::{Result, VShardError};
pub use memcache::{MemcacheConnection, MemcacheConnector};
pub use pool::{PoolOptions, PoolStats, PooledConnection, ResourcePool};
pub use router::{ShardStatus, ShardedPool};
pub use shard::{HashAlgorithm, KeyNormalization, jump_hash};
