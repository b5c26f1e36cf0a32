//! Per-shard connection pooling
//!
//! - Bounded leases (`max_capacity`) with acquire timeout and cancellation by drop
//! - Free list of at most `capacity` idle connections, evicted after `idle_timeout`
//! - Wait statistics for observability
//! - Release through `Drop` of [`PooledConnection`]

mod lease;
mod resource_pool;

pub use lease::PooledConnection;
pub use resource_pool::{PoolOptions, PoolStats, ResourcePool};
