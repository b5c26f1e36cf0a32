//! Memcached text protocol client
//!
//! - `protocol`: request encoding and reply parsing, no IO
//! - `connection`: tokio TCP connection implementing [`crate::Connection`]

pub mod connection;
pub mod protocol;

pub use connection::{MemcacheConnection, MemcacheConnector};
pub use protocol::{
    MAX_KEY_LENGTH, MAX_LINE_LENGTH, MAX_VALUE_LENGTH, Reply, StorageCommand, ValueHeader,
};
