//! Single-key cache commands
//!
//! Every verb routes the original key, leases one connection from the owning
//! shard, sends the normalized key and hands the lease back before returning.

use crate::connection::{CacheResult, Connection, Connector};
use crate::error::{Result, VShardError};
use crate::memcache::StorageCommand;
use crate::router::{ShardedPool, settle};
use tracing::{debug, warn};

impl<C: Connector> ShardedPool<C> {
    /// Get the value stored under `key`
    ///
    /// Fails with [`VShardError::KeyNotFound`] when the key is absent.
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.retrieve(key, false).await.map(|item| item.value)
    }

    /// Get value, flags and CAS token of `key`
    ///
    /// # Example
    /// ```no_run
    /// # use vshard::ShardedPool;
    /// # async fn demo(pool: ShardedPool) -> vshard::Result<()> {
    /// let item = pool.get_item("counter").await?;
    /// let stored = pool.cas("counter", item.flags, 0, b"2", item.cas).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_item(&self, key: &str) -> Result<CacheResult> {
        self.retrieve(key, true).await
    }

    /// Store unconditionally
    pub async fn set(&self, key: &str, flags: u16, ttl: u64, value: &[u8]) -> Result<bool> {
        self.store(StorageCommand::Set, key, flags, ttl, value, 0).await
    }

    /// Store only if `key` does not exist yet
    pub async fn add(&self, key: &str, flags: u16, ttl: u64, value: &[u8]) -> Result<bool> {
        self.store(StorageCommand::Add, key, flags, ttl, value, 0).await
    }

    /// Store only if `key` already exists
    pub async fn replace(&self, key: &str, flags: u16, ttl: u64, value: &[u8]) -> Result<bool> {
        self.store(StorageCommand::Replace, key, flags, ttl, value, 0).await
    }

    pub async fn append(&self, key: &str, flags: u16, ttl: u64, value: &[u8]) -> Result<bool> {
        self.store(StorageCommand::Append, key, flags, ttl, value, 0).await
    }

    pub async fn prepend(&self, key: &str, flags: u16, ttl: u64, value: &[u8]) -> Result<bool> {
        self.store(StorageCommand::Prepend, key, flags, ttl, value, 0).await
    }

    /// Store only if nobody modified `key` since `cas` was read
    ///
    /// A stale token yields `Ok(false)`.
    pub async fn cas(
        &self,
        key: &str,
        flags: u16,
        ttl: u64,
        value: &[u8],
        cas: u64,
    ) -> Result<bool> {
        self.store(StorageCommand::Cas, key, flags, ttl, value, cas).await
    }

    /// Delete `key`; `false` when it did not exist
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let (mut conn, shard) = self.route(key).await?;
        let stored_key = self.normalize_key(key);
        debug!("delete {} on shard {}", key, shard);

        conn.begin_request();
        let result = conn.delete(&stored_key).await;
        settle(&mut conn, result)
    }

    /// Flush every shard
    ///
    /// Never stops early: one entry per shard in shard order, `None` when the
    /// shard was flushed.
    pub async fn flush_all(&self) -> Vec<Option<VShardError>> {
        let mut outcome = Vec::with_capacity(self.num_shards());

        for shard in 0..self.num_shards() {
            let result = self.flush_shard(shard).await.err();
            if let Some(e) = &result {
                warn!("flush_all failed on shard {}: {}", shard, e);
            }
            outcome.push(result);
        }

        outcome
    }

    async fn flush_shard(&self, shard: usize) -> Result<()> {
        let mut conn = self.pool_connection(shard).await?;
        debug!("flush_all on shard {}", shard);

        conn.begin_request();
        let result = conn.flush_all().await;
        settle(&mut conn, result)
    }

    async fn retrieve(&self, key: &str, with_cas: bool) -> Result<CacheResult> {
        let (mut conn, shard) = self.route(key).await?;
        let keys = [self.normalize_key(key).into_owned()];

        conn.begin_request();
        let result = if with_cas {
            debug!("gets {} on shard {}", key, shard);
            conn.gets(&keys).await
        } else {
            debug!("get {} on shard {}", key, shard);
            conn.get(&keys).await
        };
        let items = settle(&mut conn, result)?;

        match items.into_iter().next() {
            Some(mut item) => {
                item.key = key.to_string();
                Ok(item)
            }
            None => Err(VShardError::KeyNotFound(key.to_string())),
        }
    }

    async fn store(
        &self,
        command: StorageCommand,
        key: &str,
        flags: u16,
        ttl: u64,
        value: &[u8],
        cas: u64,
    ) -> Result<bool> {
        let (mut conn, shard) = self.route(key).await?;
        let stored_key = self.normalize_key(key);
        debug!(
            "{} {} ({} bytes) on shard {}",
            command.as_str(),
            key,
            value.len(),
            shard
        );

        conn.begin_request();
        let result = match command {
            StorageCommand::Set => conn.set(&stored_key, flags, ttl, value).await,
            StorageCommand::Add => conn.add(&stored_key, flags, ttl, value).await,
            StorageCommand::Replace => conn.replace(&stored_key, flags, ttl, value).await,
            StorageCommand::Append => conn.append(&stored_key, flags, ttl, value).await,
            StorageCommand::Prepend => conn.prepend(&stored_key, flags, ttl, value).await,
            StorageCommand::Cas => conn.cas(&stored_key, flags, ttl, value, cas).await,
        };
        settle(&mut conn, result)
    }
}
