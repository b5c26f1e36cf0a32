use super::lease::PooledConnection;
use crate::connection::{Connection, Connector};
use crate::error::{Result, VShardError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, TryAcquireError};
use tracing::{debug, warn};

/// Sizing and timing of a single shard pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Idle connections kept around for reuse
    pub capacity: usize,
    /// Connections that may be leased at the same time
    pub max_capacity: usize,
    /// Idle connections older than this are closed instead of reused
    pub idle_timeout: Duration,
    /// Bound on opening a new connection
    pub connect_timeout: Duration,
    /// Bound on waiting for a free slot
    pub acquire_timeout: Duration,
}

/// Point-in-time snapshot of a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub capacity: usize,
    /// Leases that can be granted right now without waiting
    pub available: usize,
    pub max_capacity: usize,
    /// Idle connections currently parked in the free list
    pub idle: usize,
    /// Acquires that had to wait for a slot
    pub wait_count: u64,
    /// Total time spent waiting for a slot
    pub wait_time: Duration,
    pub idle_timeout: Duration,
}

struct IdleConnection<T> {
    connection: T,
    returned_at: Instant,
}

/// Bounded connection pool for one shard
///
/// A semaphore with `max_capacity` permits bounds concurrent leases; the free
/// list retains at most `capacity` idle connections. Pools of different
/// shards share nothing.
pub struct ResourcePool<C: Connector> {
    slot: usize,
    address: String,
    connector: Arc<C>,
    idle: Mutex<VecDeque<IdleConnection<C::Connection>>>,
    permits: Semaphore,
    options: PoolOptions,
    wait_count: AtomicU64,
    wait_time_nanos: AtomicU64,
}

impl<C: Connector> ResourcePool<C> {
    /// Create an empty pool; connections are opened on demand
    pub fn new(
        slot: usize,
        address: impl Into<String>,
        connector: Arc<C>,
        options: PoolOptions,
    ) -> Self {
        Self {
            slot,
            address: address.into(),
            connector,
            idle: Mutex::new(VecDeque::with_capacity(options.capacity)),
            permits: Semaphore::new(options.max_capacity),
            options,
            wait_count: AtomicU64::new(0),
            wait_time_nanos: AtomicU64::new(0),
        }
    }

    /// Shard slot this pool serves
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Server address this pool connects to
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Lease a connection
    ///
    /// Waits at most `acquire_timeout` for a free slot. Dropping the returned
    /// future cancels the wait without consuming a slot.
    pub async fn acquire(&self) -> Result<PooledConnection<'_, C>> {
        let permit = match self.permits.try_acquire() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                self.wait_count.fetch_add(1, Ordering::Relaxed);
                let started = Instant::now();
                let waited =
                    tokio::time::timeout(self.options.acquire_timeout, self.permits.acquire())
                        .await;
                self.wait_time_nanos
                    .fetch_add(started.elapsed().as_nanos() as u64, Ordering::Relaxed);

                match waited {
                    Ok(Ok(permit)) => permit,
                    _ => {
                        warn!(
                            "Pool exhausted on shard {} ({}) after {:?}",
                            self.slot, self.address, self.options.acquire_timeout
                        );
                        return Err(VShardError::PoolExhausted {
                            slot: self.slot,
                            timeout: self.options.acquire_timeout,
                        });
                    }
                }
            }
            Err(TryAcquireError::Closed) => {
                return Err(VShardError::PoolExhausted {
                    slot: self.slot,
                    timeout: Duration::ZERO,
                });
            }
        };

        let connection = match self.take_idle().await {
            Some(connection) => connection,
            None => self.open().await?,
        };

        Ok(PooledConnection::new(self, connection, permit))
    }

    /// Snapshot of the pool counters; never blocks on a waiting acquire
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.options.capacity,
            available: self.permits.available_permits(),
            max_capacity: self.options.max_capacity,
            idle: self.idle.lock().len(),
            wait_count: self.wait_count.load(Ordering::Relaxed),
            wait_time: Duration::from_nanos(self.wait_time_nanos.load(Ordering::Relaxed)),
            idle_timeout: self.options.idle_timeout,
        }
    }

    /// Close every idle connection; leased connections are unaffected
    pub async fn close(&self) {
        let drained: Vec<_> = self.idle.lock().drain(..).collect();
        debug!(
            "Closing {} idle connections to shard {} ({})",
            drained.len(),
            self.slot,
            self.address
        );

        for mut idle in drained {
            idle.connection.close().await;
        }
    }

    /// Put a connection back on the free list, or drop it when the list is full
    pub(super) fn release(&self, connection: C::Connection) {
        let mut idle = self.idle.lock();
        if idle.len() < self.options.capacity {
            idle.push_back(IdleConnection {
                connection,
                returned_at: Instant::now(),
            });
        }
    }

    /// Most recently returned idle connection, closing the ones past idle timeout
    async fn take_idle(&self) -> Option<C::Connection> {
        let (reusable, expired) = {
            let mut idle = self.idle.lock();
            let mut expired = Vec::new();
            while idle
                .front()
                .is_some_and(|c| c.returned_at.elapsed() > self.options.idle_timeout)
            {
                if let Some(stale) = idle.pop_front() {
                    expired.push(stale);
                }
            }
            (idle.pop_back(), expired)
        };

        if !expired.is_empty() {
            debug!(
                "Evicting {} idle connections from shard {} ({})",
                expired.len(),
                self.slot,
                self.address
            );
            for mut stale in expired {
                stale.connection.close().await;
            }
        }

        reusable.map(|idle| idle.connection)
    }

    async fn open(&self) -> Result<C::Connection> {
        debug!("Opening connection to shard {} ({})", self.slot, self.address);

        self.connector
            .connect(&self.address, self.options.connect_timeout)
            .await
            .map_err(|e| VShardError::ConnectFailed {
                slot: self.slot,
                server: self.address.clone(),
                reason: match e {
                    VShardError::ConnectFailed { reason, .. } => reason,
                    other => other.to_string(),
                },
            })
    }
}
