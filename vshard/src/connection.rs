//! Connection capability consumed by the shard pools
//!
//! The router never speaks a wire protocol itself. It leases something that
//! implements [`Connection`] from a pool that opens them through a
//! [`Connector`]. [`crate::memcache`] provides the TCP implementation.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One item returned by a retrieval command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheResult {
    pub key: String,
    pub value: Vec<u8>,
    pub flags: u16,
    /// CAS token, only populated by `gets`
    pub cas: u64,
}

/// A single connection to one cache server
///
/// Storage commands return `Ok(false)` when the server declined to store
/// (`NOT_STORED`, `EXISTS`, `NOT_FOUND`); only transport and protocol
/// failures are errors.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Retrieve values for the given keys; missing keys are omitted
    async fn get(&mut self, keys: &[String]) -> Result<Vec<CacheResult>>;

    /// Retrieve values and CAS tokens for the given keys
    async fn gets(&mut self, keys: &[String]) -> Result<Vec<CacheResult>>;

    /// Store unconditionally
    async fn set(&mut self, key: &str, flags: u16, ttl: u64, value: &[u8]) -> Result<bool>;

    /// Store only if the key does not exist
    async fn add(&mut self, key: &str, flags: u16, ttl: u64, value: &[u8]) -> Result<bool>;

    /// Store only if the key already exists
    async fn replace(&mut self, key: &str, flags: u16, ttl: u64, value: &[u8]) -> Result<bool>;

    /// Append bytes after the existing value
    async fn append(&mut self, key: &str, flags: u16, ttl: u64, value: &[u8]) -> Result<bool>;

    /// Prepend bytes before the existing value
    async fn prepend(&mut self, key: &str, flags: u16, ttl: u64, value: &[u8]) -> Result<bool>;

    /// Store only if nobody updated the key since `cas` was read
    async fn cas(
        &mut self,
        key: &str,
        flags: u16,
        ttl: u64,
        value: &[u8],
        cas: u64,
    ) -> Result<bool>;

    /// Delete a key; `false` when it did not exist
    async fn delete(&mut self, key: &str) -> Result<bool>;

    /// Invalidate every item on the server
    async fn flush_all(&mut self) -> Result<()>;

    /// Close the connection; errors are swallowed
    async fn close(&mut self);
}

/// Opens connections to a server address
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    async fn connect(&self, address: &str, timeout: Duration) -> Result<Self::Connection>;
}
