//! Key normalization - rewrite keys before they reach the store

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// How keys are rewritten before being sent to a shard
///
/// Only the stored key is rewritten; shard selection always hashes the key
/// the caller supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyNormalization {
    /// Send keys unchanged
    #[default]
    Identity,
    /// Replace the key with the decimal form of its FarmHash Fingerprint64.
    /// Bounds key length to 20 bytes and keeps the character set protocol-safe.
    Fingerprint,
}

impl KeyNormalization {
    /// Normalize a key for storage
    ///
    /// # Example
    /// ```
    /// use vshard::KeyNormalization;
    ///
    /// assert_eq!(KeyNormalization::Identity.normalize("user:1"), "user:1");
    ///
    /// let stored = KeyNormalization::Fingerprint.normalize("user:1");
    /// assert!(stored.chars().all(|c| c.is_ascii_digit()));
    /// ```
    pub fn normalize<'a>(&self, key: &'a str) -> Cow<'a, str> {
        match self {
            Self::Identity => Cow::Borrowed(key),
            Self::Fingerprint => Cow::Owned(farmhash::fingerprint64(key.as_bytes()).to_string()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Fingerprint => "fingerprint",
        }
    }
}

impl fmt::Display for KeyNormalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyNormalization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "identity" | "none" => Ok(Self::Identity),
            "fingerprint" | "farmhash" => Ok(Self::Fingerprint),
            other => Err(format!("unknown key normalization: {}", other)),
        }
    }
}
