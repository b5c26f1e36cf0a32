//! Multi-key reads fanned out across shards

use crate::connection::{CacheResult, Connection, Connector};
use crate::error::Result;
use crate::router::{ShardedPool, settle};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Shard buckets of normalized keys, plus the way back to caller keys
struct KeyPlan {
    buckets: BTreeMap<usize, Vec<String>>,
    /// Normalized key -> caller key; empty when keys are stored verbatim
    originals: HashMap<String, String>,
}

impl<C: Connector> ShardedPool<C> {
    /// Group keys by owning shard
    ///
    /// Buckets exist only for shards that receive at least one key and hold
    /// normalized keys in input order. Repeated keys appear once.
    pub fn key_mapping<S: AsRef<str>>(&self, keys: &[S]) -> BTreeMap<usize, Vec<String>> {
        self.plan(keys).buckets
    }

    /// Get values and CAS tokens for many keys
    ///
    /// Issues one `gets` per contributing shard, in ascending shard order.
    /// Missing keys are omitted. The first failing shard aborts the call.
    ///
    /// # Example
    /// ```no_run
    /// # use vshard::ShardedPool;
    /// # async fn demo(pool: ShardedPool) -> vshard::Result<()> {
    /// for item in pool.gets(&["user:1", "user:2", "user:3"]).await? {
    ///     println!("{} = {:?} (cas {})", item.key, item.value, item.cas);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn gets<S: AsRef<str>>(&self, keys: &[S]) -> Result<Vec<CacheResult>> {
        self.fetch(keys, true).await
    }

    /// Get values for many keys without CAS tokens
    pub async fn get_many<S: AsRef<str>>(&self, keys: &[S]) -> Result<Vec<CacheResult>> {
        self.fetch(keys, false).await
    }

    async fn fetch<S: AsRef<str>>(&self, keys: &[S], with_cas: bool) -> Result<Vec<CacheResult>> {
        let KeyPlan { buckets, originals } = self.plan(keys);
        let verb = if with_cas { "gets" } else { "get" };
        let mut results = Vec::with_capacity(keys.len());

        for (shard, shard_keys) in buckets {
            let mut conn = self.pool_connection(shard).await?;
            debug!("{} {} keys on shard {}", verb, shard_keys.len(), shard);

            conn.begin_request();
            let result = if with_cas {
                conn.gets(&shard_keys).await
            } else {
                conn.get(&shard_keys).await
            };
            let items = settle(&mut conn, result)?;
            drop(conn);

            results.extend(items.into_iter().map(|mut item| {
                if let Some(original) = originals.get(&item.key) {
                    item.key = original.clone();
                }
                item
            }));
        }

        Ok(results)
    }

    fn plan<S: AsRef<str>>(&self, keys: &[S]) -> KeyPlan {
        let mut buckets: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        let mut originals = HashMap::new();
        let mut seen = HashSet::with_capacity(keys.len());

        for key in keys {
            let key = key.as_ref();
            if !seen.insert(key) {
                continue;
            }

            let stored = self.normalize_key(key).into_owned();
            if stored != key {
                originals.insert(stored.clone(), key.to_string());
            }
            buckets.entry(self.shard_for(key)).or_default().push(stored);
        }

        KeyPlan { buckets, originals }
    }
}
