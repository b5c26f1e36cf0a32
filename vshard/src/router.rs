//! Shard pool table and key routing

use crate::config::VShardConfig;
use crate::connection::Connector;
use crate::error::{Result, VShardError};
use crate::memcache::MemcacheConnector;
use crate::pool::{PoolStats, PooledConnection, ResourcePool};
use crate::shard::{HashAlgorithm, KeyNormalization};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Statistics of one shard pool, tagged with its position in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStatus {
    pub slot: usize,
    pub server: String,
    #[serde(flatten)]
    pub stats: PoolStats,
}

/// Client-side sharded connection pool
///
/// Owns one [`ResourcePool`] per server, index-aligned with the configured
/// server list. The table is built once and never resized, so routing reads it
/// without locking. Share across tasks with `Arc<ShardedPool>`.
pub struct ShardedPool<C: Connector = MemcacheConnector> {
    config: VShardConfig,
    pools: Vec<ResourcePool<C>>,
}

impl ShardedPool<MemcacheConnector> {
    /// Connect to a memcached cluster with default key placement strategies
    ///
    /// # Example
    /// ```no_run
    /// # use std::time::Duration;
    /// # use vshard::ShardedPool;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let servers = ["127.0.0.1:21210", "127.0.0.1:21211"];
    /// let pool = ShardedPool::new(servers, 10, 10, Duration::from_secs(5)).await?;
    ///
    /// pool.set("user:1", 0, 0, b"John Doe").await?;
    /// let value = pool.get("user:1").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new<I, S>(
        servers: I,
        capacity: usize,
        max_capacity: usize,
        idle_timeout: Duration,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let config = VShardConfig::new(servers)
            .with_capacity(capacity, max_capacity)
            .with_idle_timeout(idle_timeout);

        Self::from_config(config).await
    }

    /// Connect to a memcached cluster described by `config`
    pub async fn from_config(config: VShardConfig) -> Result<Self> {
        let connector = MemcacheConnector::new(config.io_timeout());
        Self::with_connector(config, connector).await
    }
}

impl<C: Connector> ShardedPool<C> {
    /// Build every shard pool and open one warm-up connection per shard
    ///
    /// Fails with [`VShardError::ShardUnreachable`] as soon as one shard cannot
    /// be reached; a cluster is never returned half-connected.
    pub async fn with_connector(config: VShardConfig, connector: C) -> Result<Self> {
        config.validate()?;

        info!(
            "Starting sharded pool: {} servers, capacity={}, max_capacity={}, idle_timeout={:?}, hash={}, keys={}",
            config.servers.len(),
            config.capacity,
            config.max_capacity,
            config.idle_timeout(),
            config.hash_algorithm,
            config.key_normalization
        );

        let connector = Arc::new(connector);
        let options = config.pool_options();
        let pools = config
            .servers
            .iter()
            .enumerate()
            .map(|(slot, server)| {
                ResourcePool::new(slot, server.clone(), connector.clone(), options.clone())
            })
            .collect();

        let sharded = Self { config, pools };

        for pool in &sharded.pools {
            match pool.acquire().await {
                Ok(warm_up) => {
                    debug!("Shard {} ({}) is reachable", pool.slot(), pool.address());
                    drop(warm_up);
                }
                Err(e) => {
                    error!(
                        "Can't connect to memcached {} ({}): {}",
                        pool.slot(),
                        pool.address(),
                        e
                    );
                    return Err(VShardError::ShardUnreachable {
                        slot: pool.slot(),
                        server: pool.address().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!("Sharded pool ready ({} shards)", sharded.pools.len());
        Ok(sharded)
    }

    /// Number of shards
    pub fn num_shards(&self) -> usize {
        self.pools.len()
    }

    /// Shard addresses in shard order
    pub fn servers(&self) -> &[String] {
        &self.config.servers
    }

    pub fn config(&self) -> &VShardConfig {
        &self.config
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.config.hash_algorithm
    }

    pub fn key_normalization(&self) -> KeyNormalization {
        self.config.key_normalization
    }

    /// Shard index a key routes to
    pub fn shard_for(&self, key: &str) -> usize {
        let num_shards = self.pools.len();
        let index = self.config.hash_algorithm.select(key, num_shards);
        assert!(
            index < num_shards,
            "invalid server {} (of total {})",
            index,
            num_shards
        );
        index
    }

    /// Key as it is sent to the store
    pub fn normalize_key<'k>(&self, key: &'k str) -> Cow<'k, str> {
        self.config.key_normalization.normalize(key)
    }

    /// Lease a connection to the shard owning `key`
    ///
    /// Acquire errors carry the shard index.
    pub async fn route(&self, key: &str) -> Result<(PooledConnection<'_, C>, usize)> {
        let shard = self.shard_for(key);
        let connection = self.pools[shard].acquire().await?;
        Ok((connection, shard))
    }

    /// Lease a connection to a specific shard
    pub async fn pool_connection(&self, index: usize) -> Result<PooledConnection<'_, C>> {
        self.pool(index)?.acquire().await
    }

    /// Statistics of one shard pool
    pub fn stats(&self, index: usize) -> Result<PoolStats> {
        Ok(self.pool(index)?.stats())
    }

    /// Statistics of every shard pool, in shard order
    pub fn status(&self) -> Vec<ShardStatus> {
        self.pools
            .iter()
            .map(|pool| ShardStatus {
                slot: pool.slot(),
                server: pool.address().to_string(),
                stats: pool.stats(),
            })
            .collect()
    }

    /// Close idle connections on every shard
    pub async fn close(&self) {
        for pool in &self.pools {
            pool.close().await;
        }
    }

    fn pool(&self, index: usize) -> Result<&ResourcePool<C>> {
        self.pools
            .get(index)
            .ok_or(VShardError::InvalidShardIndex {
                index,
                num_shards: self.pools.len(),
            })
    }
}

/// Disarm a lease once its request completed
///
/// Pair with [`PooledConnection::begin_request`] before the call: a future
/// dropped between the two leaves the lease in flight and the connection is
/// closed instead of recycled. Transport failures close it as well.
pub(crate) fn settle<C: Connector, T>(
    connection: &mut PooledConnection<'_, C>,
    result: Result<T>,
) -> Result<T> {
    connection.finish_request();

    if let Err(e) = &result {
        if e.is_transport() {
            connection.mark_broken();
        }
    }
    result
}
