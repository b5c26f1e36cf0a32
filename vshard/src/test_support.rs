//! In-memory cluster used by unit tests

use crate::connection::{CacheResult, Connection, Connector};
use crate::error::{Result, VShardError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct Shard {
    items: HashMap<String, (Vec<u8>, u16, u64)>,
    next_cas: u64,
}

impl Shard {
    fn put(&mut self, key: &str, flags: u16, value: Vec<u8>) {
        self.next_cas += 1;
        self.items
            .insert(key.to_string(), (value, flags, self.next_cas));
    }
}

/// Shared state of every fake server, keyed by address
#[derive(Clone, Default)]
pub struct MemoryCluster {
    shards: Arc<Mutex<HashMap<String, Shard>>>,
    unreachable: Arc<Mutex<HashSet<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    connects: Arc<AtomicUsize>,
    requests: Arc<Mutex<HashMap<String, usize>>>,
}

impl MemoryCluster {
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            cluster: self.clone(),
        }
    }

    /// Refuse new connections to `address`
    pub fn set_unreachable(&self, address: &str, unreachable: bool) {
        let mut set = self.unreachable.lock();
        if unreachable {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }

    /// Fail every request sent to `address` with an IO error
    pub fn set_failing(&self, address: &str, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Requests served by `address`
    pub fn requests(&self, address: &str) -> usize {
        self.requests.lock().get(address).copied().unwrap_or(0)
    }

    /// Keys stored on `address`
    pub fn keys_on(&self, address: &str) -> Vec<String> {
        let mut keys: Vec<_> = self
            .shards
            .lock()
            .get(address)
            .map(|s| s.items.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

pub struct MemoryConnector {
    cluster: MemoryCluster,
}

#[async_trait]
impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self, address: &str, _timeout: Duration) -> Result<MemoryConnection> {
        if self.cluster.unreachable.lock().contains(address) {
            return Err(VShardError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("{} refused the connection", address),
            )));
        }

        self.cluster.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            address: address.to_string(),
            cluster: self.cluster.clone(),
        })
    }
}

pub struct MemoryConnection {
    address: String,
    cluster: MemoryCluster,
}

impl MemoryConnection {
    fn with_shard<T>(&self, f: impl FnOnce(&mut Shard) -> T) -> Result<T> {
        *self
            .cluster
            .requests
            .lock()
            .entry(self.address.clone())
            .or_default() += 1;

        if self.cluster.failing.lock().contains(&self.address) {
            return Err(VShardError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("{} dropped the request", self.address),
            )));
        }

        let mut shards = self.cluster.shards.lock();
        Ok(f(shards.entry(self.address.clone()).or_default()))
    }

    fn retrieve(&self, keys: &[String], with_cas: bool) -> Result<Vec<CacheResult>> {
        self.with_shard(|shard| {
            keys.iter()
                .filter_map(|key| {
                    shard.items.get(key).map(|(value, flags, cas)| CacheResult {
                        key: key.clone(),
                        value: value.clone(),
                        flags: *flags,
                        cas: if with_cas { *cas } else { 0 },
                    })
                })
                .collect()
        })
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn get(&mut self, keys: &[String]) -> Result<Vec<CacheResult>> {
        self.retrieve(keys, false)
    }

    async fn gets(&mut self, keys: &[String]) -> Result<Vec<CacheResult>> {
        self.retrieve(keys, true)
    }

    async fn set(&mut self, key: &str, flags: u16, _ttl: u64, value: &[u8]) -> Result<bool> {
        self.with_shard(|shard| {
            shard.put(key, flags, value.to_vec());
            true
        })
    }

    async fn add(&mut self, key: &str, flags: u16, _ttl: u64, value: &[u8]) -> Result<bool> {
        self.with_shard(|shard| {
            if shard.items.contains_key(key) {
                return false;
            }
            shard.put(key, flags, value.to_vec());
            true
        })
    }

    async fn replace(&mut self, key: &str, flags: u16, _ttl: u64, value: &[u8]) -> Result<bool> {
        self.with_shard(|shard| {
            if !shard.items.contains_key(key) {
                return false;
            }
            shard.put(key, flags, value.to_vec());
            true
        })
    }

    async fn append(&mut self, key: &str, _flags: u16, _ttl: u64, value: &[u8]) -> Result<bool> {
        self.with_shard(|shard| match shard.items.get(key).cloned() {
            Some((mut current, flags, _)) => {
                current.extend_from_slice(value);
                shard.put(key, flags, current);
                true
            }
            None => false,
        })
    }

    async fn prepend(&mut self, key: &str, _flags: u16, _ttl: u64, value: &[u8]) -> Result<bool> {
        self.with_shard(|shard| match shard.items.get(key).cloned() {
            Some((current, flags, _)) => {
                let mut joined = value.to_vec();
                joined.extend_from_slice(&current);
                shard.put(key, flags, joined);
                true
            }
            None => false,
        })
    }

    async fn cas(
        &mut self,
        key: &str,
        flags: u16,
        _ttl: u64,
        value: &[u8],
        cas: u64,
    ) -> Result<bool> {
        self.with_shard(|shard| {
            let current = shard.items.get(key).is_some_and(|(_, _, token)| *token == cas);
            if current {
                shard.put(key, flags, value.to_vec());
            }
            current
        })
    }

    async fn delete(&mut self, key: &str) -> Result<bool> {
        self.with_shard(|shard| shard.items.remove(key).is_some())
    }

    async fn flush_all(&mut self) -> Result<()> {
        self.with_shard(|shard| shard.items.clear())
    }

    async fn close(&mut self) {}
}

/// Fake shard addresses
pub fn servers(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("10.0.0.{}:11211", i + 1)).collect()
}
