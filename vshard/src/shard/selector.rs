//! Shard selection - 64-bit key fingerprint + jump consistent hash

use super::jump::jump_hash;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fingerprint algorithm used to pick a shard for a key
///
/// All variants share the same placement (jump hash) and differ only in how
/// the 64-bit fingerprint is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// Low 64 bits of the MD5 digest
    Md5,
    /// FarmHash Fingerprint64
    #[default]
    Fingerprint64,
    /// xxHash64, seed 0
    XxHash64,
}

impl HashAlgorithm {
    /// Every supported algorithm
    pub const ALL: [HashAlgorithm; 3] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Fingerprint64,
        HashAlgorithm::XxHash64,
    ];

    /// Compute the 64-bit fingerprint of a key
    pub fn fingerprint(&self, key: &str) -> u64 {
        match self {
            Self::Md5 => {
                let digest = Md5::digest(key.as_bytes());
                let mut low = [0u8; 8];
                low.copy_from_slice(&digest[8..16]);
                u64::from_be_bytes(low)
            }
            Self::Fingerprint64 => farmhash::fingerprint64(key.as_bytes()),
            Self::XxHash64 => xxhash_rust::xxh64::xxh64(key.as_bytes(), 0),
        }
    }

    /// Pick a shard index in `[0, num_shards)` for a key
    ///
    /// # Example
    /// ```
    /// use vshard::HashAlgorithm;
    ///
    /// let shard = HashAlgorithm::Fingerprint64.select("user:1001", 10);
    /// assert!(shard < 10);
    /// assert_eq!(shard, HashAlgorithm::Fingerprint64.select("user:1001", 10));
    ///
    /// // Single shard clusters never hash
    /// assert_eq!(HashAlgorithm::Md5.select("user:1001", 1), 0);
    /// ```
    pub fn select(&self, key: &str, num_shards: usize) -> usize {
        if num_shards <= 1 {
            return 0;
        }

        jump_hash(self.fingerprint(key), num_shards)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Fingerprint64 => "fingerprint64",
            Self::XxHash64 => "xxhash64",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "fingerprint64" | "farmhash" => Ok(Self::Fingerprint64),
            "xxhash64" | "xxhash" => Ok(Self::XxHash64),
            other => Err(format!("unknown hash algorithm: {}", other)),
        }
    }
}
