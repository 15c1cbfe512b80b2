//! Error types for p2file

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to allocate {bytes} bytes")]
    Allocation { bytes: usize },

    #[error("Entry key '{key}' is {len} bytes, the key field holds at most {max}")]
    KeyTooLong { key: String, len: usize, max: usize },

    #[error("Invalid entry key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("Duplicate entry key: {0}")]
    DuplicateKey(String),

    #[error("Malformed sparse matrix: {0}")]
    MalformedMatrix(String),

    #[error("Value does not fit its 32-bit field: {0}")]
    OffsetOverflow(String),

    #[error("Container corruption: {0}")]
    Corruption(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
