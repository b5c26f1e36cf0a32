//! Memcached text protocol - request encoding and reply parsing
//!
//! Requests are built into a single `BytesMut` so each command goes out in
//! one write. Reply lines arrive without their trailing `\r\n`.

use crate::error::{Result, VShardError};
use bytes::{BufMut, BytesMut};

/// Longest key memcached accepts
pub const MAX_KEY_LENGTH: usize = 250;

/// Largest value a reply may announce, memcached's default item size limit
pub const MAX_VALUE_LENGTH: usize = 1024 * 1024;

/// Longest reply line read before the stream is declared corrupt
pub const MAX_LINE_LENGTH: usize = 2048;

/// Line terminator
pub const CRLF: &[u8] = b"\r\n";

/// Storage commands sharing the `<cmd> <key> <flags> <exptime> <bytes>` shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageCommand {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    Cas,
}

impl StorageCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Append => "append",
            Self::Prepend => "prepend",
            Self::Cas => "cas",
        }
    }
}

/// Header of a `VALUE` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueHeader {
    pub key: String,
    pub flags: u16,
    pub bytes: usize,
    pub cas: Option<u64>,
}

/// A parsed reply line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Stored,
    NotStored,
    Exists,
    NotFound,
    Deleted,
    Ok,
    End,
    Value(ValueHeader),
}

/// Reject keys the text protocol cannot carry
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(VShardError::InvalidKey("empty key".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(VShardError::InvalidKey(format!(
            "key exceeds {} bytes ({} bytes)",
            MAX_KEY_LENGTH,
            key.len()
        )));
    }
    if key.bytes().any(|b| b <= b' ' || b == 0x7f) {
        return Err(VShardError::InvalidKey(format!(
            "key contains whitespace or control characters: {:?}",
            key
        )));
    }
    Ok(())
}

/// `get k1 k2 ...` / `gets k1 k2 ...`
pub fn encode_retrieval(command: &str, keys: &[String]) -> Result<BytesMut> {
    let capacity = command.len() + keys.iter().map(|k| k.len() + 1).sum::<usize>() + 2;
    let mut buf = BytesMut::with_capacity(capacity);

    buf.put_slice(command.as_bytes());
    for key in keys {
        validate_key(key)?;
        buf.put_u8(b' ');
        buf.put_slice(key.as_bytes());
    }
    buf.put_slice(CRLF);

    Ok(buf)
}

/// `<cmd> <key> <flags> <exptime> <bytes> [<cas>]\r\n<data>\r\n`
pub fn encode_storage(
    command: StorageCommand,
    key: &str,
    flags: u16,
    ttl: u64,
    value: &[u8],
    cas: Option<u64>,
) -> Result<BytesMut> {
    validate_key(key)?;

    let header = match (command, cas) {
        (StorageCommand::Cas, Some(token)) => format!(
            "cas {} {} {} {} {}\r\n",
            key,
            flags,
            ttl,
            value.len(),
            token
        ),
        (StorageCommand::Cas, None) => {
            return Err(VShardError::Protocol("cas requires a token".to_string()));
        }
        (other, _) => format!(
            "{} {} {} {} {}\r\n",
            other.as_str(),
            key,
            flags,
            ttl,
            value.len()
        ),
    };

    let mut buf = BytesMut::with_capacity(header.len() + value.len() + 2);
    buf.put_slice(header.as_bytes());
    buf.put_slice(value);
    buf.put_slice(CRLF);

    Ok(buf)
}

/// `delete <key>\r\n`
pub fn encode_delete(key: &str) -> Result<BytesMut> {
    validate_key(key)?;

    let mut buf = BytesMut::with_capacity(key.len() + 9);
    buf.put_slice(b"delete ");
    buf.put_slice(key.as_bytes());
    buf.put_slice(CRLF);

    Ok(buf)
}

/// `flush_all\r\n`
pub fn encode_flush_all() -> BytesMut {
    BytesMut::from(&b"flush_all\r\n"[..])
}

/// Parse one reply line (without the line terminator)
pub fn parse_reply(line: &str) -> Result<Reply> {
    match line {
        "STORED" => Ok(Reply::Stored),
        "NOT_STORED" => Ok(Reply::NotStored),
        "EXISTS" => Ok(Reply::Exists),
        "NOT_FOUND" => Ok(Reply::NotFound),
        "DELETED" => Ok(Reply::Deleted),
        "OK" => Ok(Reply::Ok),
        "END" => Ok(Reply::End),
        "ERROR" => Err(VShardError::Protocol("ERROR".to_string())),
        _ if line.starts_with("CLIENT_ERROR") || line.starts_with("SERVER_ERROR") => {
            Err(VShardError::Protocol(line.to_string()))
        }
        _ if line.starts_with("VALUE ") => parse_value_header(line).map(Reply::Value),
        _ => Err(VShardError::Protocol(format!(
            "unexpected reply: {:?}",
            line
        ))),
    }
}

/// `VALUE <key> <flags> <bytes> [<cas>]`
fn parse_value_header(line: &str) -> Result<ValueHeader> {
    let malformed = || VShardError::Protocol(format!("malformed VALUE line: {:?}", line));

    let mut parts = line.split(' ');
    parts.next(); // VALUE

    let key = parts.next().ok_or_else(malformed)?.to_string();
    let flags = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(malformed)?;
    let bytes = parts
        .next()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(malformed)?;
    if bytes > MAX_VALUE_LENGTH {
        return Err(VShardError::Protocol(format!(
            "value for {} announces {} bytes, limit is {}",
            key, bytes, MAX_VALUE_LENGTH
        )));
    }
    let cas = match parts.next() {
        Some(s) => Some(s.parse::<u64>().map_err(|_| malformed())?),
        None => None,
    };

    if parts.next().is_some() {
        return Err(malformed());
    }

    Ok(ValueHeader {
        key,
        flags,
        bytes,
        cas,
    })
}
