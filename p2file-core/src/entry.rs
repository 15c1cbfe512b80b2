//! Container entries: a bounded key plus an owned payload, quantized to blocks.

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::format::{BLOCK_SIZE, MAX_KEY_LEN};

/// Key of a container entry.
///
/// Fits the fixed 128-byte key field with its terminating NUL: non-empty, at
/// most `MAX_KEY_LEN` bytes of UTF-8 and free of NUL bytes. Over-long keys are
/// rejected, never truncated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntryKey(String);

impl EntryKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::InvalidKey {
                key,
                reason: "key is empty",
            });
        }
        if key.len() > MAX_KEY_LEN {
            let len = key.len();
            return Err(Error::KeyTooLong {
                key,
                len,
                max: MAX_KEY_LEN,
            });
        }
        if key.as_bytes().contains(&0) {
            return Err(Error::InvalidKey {
                key,
                reason: "key contains a NUL byte",
            });
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<&str> for EntryKey {
    type Error = Error;

    fn try_from(key: &str) -> Result<Self> {
        Self::new(key)
    }
}

impl TryFrom<String> for EntryKey {
    type Error = Error;

    fn try_from(key: String) -> Result<Self> {
        Self::new(key)
    }
}

impl AsRef<str> for EntryKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number of blocks needed to hold `byte_size` bytes, or `None` if the count
/// does not fit the 32-bit `size_blocks` field.
pub fn blocks_for(byte_size: u64) -> Option<u32> {
    u32::try_from(byte_size.div_ceil(u64::from(BLOCK_SIZE))).ok()
}

/// One named item of the container.
///
/// `block_count` is the smallest count with `block_count * BLOCK_SIZE >= byte_size`;
/// an empty payload occupies zero blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    key: EntryKey,
    payload: Vec<u8>,
    block_count: u32,
}

impl Entry {
    pub fn new(key: impl Into<String>, payload: Vec<u8>) -> Result<Self> {
        Self::with_key(EntryKey::new(key)?, payload)
    }

    pub fn with_key(key: EntryKey, payload: Vec<u8>) -> Result<Self> {
        let byte_size = payload.len() as u64;
        let block_count = blocks_for(byte_size).ok_or_else(|| {
            Error::OffsetOverflow(format!(
                "entry '{}' needs more than u32::MAX blocks for {} bytes",
                key, byte_size
            ))
        })?;
        Ok(Self {
            key,
            payload,
            block_count,
        })
    }

    /// Entry holding UTF-8 text, typically an encoded JSON document
    pub fn from_text(key: impl Into<String>, text: impl Into<String>) -> Result<Self> {
        Self::new(key, text.into().into_bytes())
    }

    pub fn key(&self) -> &EntryKey {
        &self.key
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Payload size in bytes
    pub fn byte_size(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Size in blocks as recorded in the index
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Bytes occupied on disk, payload plus padding
    pub fn padded_size(&self) -> u64 {
        u64::from(self.block_count) * u64::from(BLOCK_SIZE)
    }

    /// Zero bytes written after the payload to reach the block boundary
    pub fn padding(&self) -> u64 {
        self.padded_size() - self.byte_size()
    }
}
