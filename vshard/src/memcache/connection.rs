use super::protocol::{self, Reply, StorageCommand};
use crate::connection::{CacheResult, Connection, Connector};
use crate::error::{Result, VShardError};
use async_trait::async_trait;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tracing::{debug, trace};

const CRLF_LEN: usize = protocol::CRLF.len();

/// Memcached connection over TCP using the text protocol
///
/// Every request/response round-trip is bounded by the IO timeout given at
/// connect time. A timed out connection is left mid-reply and must not be
/// reused; the pool discards it.
pub struct MemcacheConnection {
    stream: BufStream<TcpStream>,
    address: String,
    timeout: Duration,
}

impl MemcacheConnection {
    /// Connect to a memcached server
    pub async fn connect(address: &str, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect to {} timed out after {:?}", address, timeout),
                )
            })??;
        stream.set_nodelay(true)?;

        debug!("Connected to memcached at {}", address);

        Ok(Self {
            stream: BufStream::new(stream),
            address: address.to_string(),
            timeout,
        })
    }

    /// Server address this connection talks to
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn send(&mut self, request: &BytesMut) -> Result<()> {
        self.stream.write_all(request).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = (&mut self.stream)
            .take(protocol::MAX_LINE_LENGTH as u64)
            .read_line(&mut line)
            .await?;
        if !line.ends_with('\n') {
            if n == protocol::MAX_LINE_LENGTH {
                return Err(VShardError::Protocol(format!(
                    "reply line from {} exceeds {} bytes",
                    self.address,
                    protocol::MAX_LINE_LENGTH
                )));
            }
            return Err(VShardError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("{} closed the connection", self.address),
            )));
        }

        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(line)
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let line = self.read_line().await?;
        trace!("{} <- {}", self.address, line);
        protocol::parse_reply(&line)
    }

    async fn retrieve_inner(&mut self, command: &str, keys: &[String]) -> Result<Vec<CacheResult>> {
        let request = protocol::encode_retrieval(command, keys)?;
        self.send(&request).await?;

        let mut results = Vec::new();
        loop {
            match self.read_reply().await? {
                Reply::End => break,
                Reply::Value(header) => {
                    let framed = header.bytes.checked_add(CRLF_LEN).ok_or_else(|| {
                        VShardError::Protocol(format!("value length overflow for {}", header.key))
                    })?;
                    let mut data = vec![0u8; framed];
                    self.stream.read_exact(&mut data).await?;
                    if !data.ends_with(protocol::CRLF) {
                        return Err(VShardError::Protocol(format!(
                            "value for {} is not terminated by CRLF",
                            header.key
                        )));
                    }
                    data.truncate(header.bytes);

                    results.push(CacheResult {
                        key: header.key,
                        value: data,
                        flags: header.flags,
                        cas: header.cas.unwrap_or(0),
                    });
                }
                other => {
                    return Err(VShardError::Protocol(format!(
                        "unexpected reply to {}: {:?}",
                        command, other
                    )));
                }
            }
        }

        Ok(results)
    }

    async fn retrieve(&mut self, command: &str, keys: &[String]) -> Result<Vec<CacheResult>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.retrieve_inner(command, keys)).await?
    }

    async fn store_inner(
        &mut self,
        command: StorageCommand,
        key: &str,
        flags: u16,
        ttl: u64,
        value: &[u8],
        cas: Option<u64>,
    ) -> Result<bool> {
        let request = protocol::encode_storage(command, key, flags, ttl, value, cas)?;
        self.send(&request).await?;

        match self.read_reply().await? {
            Reply::Stored => Ok(true),
            Reply::NotStored | Reply::Exists | Reply::NotFound => Ok(false),
            other => Err(VShardError::Protocol(format!(
                "unexpected reply to {}: {:?}",
                command.as_str(),
                other
            ))),
        }
    }

    async fn store(
        &mut self,
        command: StorageCommand,
        key: &str,
        flags: u16,
        ttl: u64,
        value: &[u8],
        cas: Option<u64>,
    ) -> Result<bool> {
        let timeout = self.timeout;
        tokio::time::timeout(
            timeout,
            self.store_inner(command, key, flags, ttl, value, cas),
        )
        .await?
    }

    async fn delete_inner(&mut self, key: &str) -> Result<bool> {
        let request = protocol::encode_delete(key)?;
        self.send(&request).await?;

        match self.read_reply().await? {
            Reply::Deleted => Ok(true),
            Reply::NotFound => Ok(false),
            other => Err(VShardError::Protocol(format!(
                "unexpected reply to delete: {:?}",
                other
            ))),
        }
    }

    async fn flush_all_inner(&mut self) -> Result<()> {
        self.send(&protocol::encode_flush_all()).await?;

        match self.read_reply().await? {
            Reply::Ok => Ok(()),
            other => Err(VShardError::Protocol(format!(
                "unexpected reply to flush_all: {:?}",
                other
            ))),
        }
    }
}

#[async_trait]
impl Connection for MemcacheConnection {
    async fn get(&mut self, keys: &[String]) -> Result<Vec<CacheResult>> {
        self.retrieve("get", keys).await
    }

    async fn gets(&mut self, keys: &[String]) -> Result<Vec<CacheResult>> {
        self.retrieve("gets", keys).await
    }

    async fn set(&mut self, key: &str, flags: u16, ttl: u64, value: &[u8]) -> Result<bool> {
        self.store(StorageCommand::Set, key, flags, ttl, value, None).await
    }

    async fn add(&mut self, key: &str, flags: u16, ttl: u64, value: &[u8]) -> Result<bool> {
        self.store(StorageCommand::Add, key, flags, ttl, value, None).await
    }

    async fn replace(&mut self, key: &str, flags: u16, ttl: u64, value: &[u8]) -> Result<bool> {
        self.store(StorageCommand::Replace, key, flags, ttl, value, None).await
    }

    async fn append(&mut self, key: &str, flags: u16, ttl: u64, value: &[u8]) -> Result<bool> {
        self.store(StorageCommand::Append, key, flags, ttl, value, None).await
    }

    async fn prepend(&mut self, key: &str, flags: u16, ttl: u64, value: &[u8]) -> Result<bool> {
        self.store(StorageCommand::Prepend, key, flags, ttl, value, None).await
    }

    async fn cas(
        &mut self,
        key: &str,
        flags: u16,
        ttl: u64,
        value: &[u8],
        cas: u64,
    ) -> Result<bool> {
        self.store(StorageCommand::Cas, key, flags, ttl, value, Some(cas)).await
    }

    async fn delete(&mut self, key: &str) -> Result<bool> {
        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.delete_inner(key)).await?
    }

    async fn flush_all(&mut self) -> Result<()> {
        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.flush_all_inner()).await?
    }

    async fn close(&mut self) {
        let _ = self.stream.write_all(b"quit\r\n").await;
        let _ = self.stream.flush().await;
        let _ = self.stream.get_mut().shutdown().await;
        debug!("Closed connection to {}", self.address);
    }
}

/// Opens [`MemcacheConnection`]s
///
/// `connect_timeout` bounds the TCP handshake, `io_timeout` every later
/// round-trip on the connection.
#[derive(Debug, Clone)]
pub struct MemcacheConnector {
    io_timeout: Duration,
}

impl MemcacheConnector {
    pub fn new(io_timeout: Duration) -> Self {
        Self { io_timeout }
    }
}

impl Default for MemcacheConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl Connector for MemcacheConnector {
    type Connection = MemcacheConnection;

    async fn connect(&self, address: &str, timeout: Duration) -> Result<MemcacheConnection> {
        let mut connection = MemcacheConnection::connect(address, timeout).await?;
        connection.timeout = self.io_timeout;
        Ok(connection)
    }
}
