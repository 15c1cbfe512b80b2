//! Format constants and the fixed-size file header.
//!
//! A container file has a header-first layout:
//! ```text
//! [file header: 48 bytes]
//! [index table: num_entries * 140 bytes]
//! [data region: each entry padded to a whole number of blocks]
//! ```
//! Every integer is little-endian. Offsets inside the index are counted in
//! blocks from the start of the data region, so a reader that can only do
//! 32-bit-safe arithmetic still addresses files up to `u32::MAX` blocks.

use std::io::{self, Cursor, Write};
use std::mem::size_of;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::error::{Error, Result};

// ── File header ─────────────────────────────────────────────────────────────

/// Identifier stored at the start of the file, NUL-padded to `IDENTIFIER_SIZE`
pub const FILE_IDENTIFIER: &[u8] = b"pagoda2datafile";

/// Width of the identifier field
pub const IDENTIFIER_SIZE: usize = 32;

pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;

/// Header flags value announcing that every optional feature is present
pub const FLAGS_ALL_FEATURES: u16 = 0xFFFF;

/// Quantization unit for entry data (2 MiB).
///
/// `u32::MAX` blocks of this size stay below `2^53`, the largest integer a
/// double-based client can address exactly.
pub const BLOCK_SIZE: u32 = 2 * 1024 * 1024;

/// Header layout: identifier(32) + major(1) + minor(1) + flags(2)
/// + block_size(4) + header_size(4) + index_size(4) = 48 bytes
pub const FILE_HEADER_SIZE: usize = IDENTIFIER_SIZE
    + 2 * size_of::<u8>()
    + size_of::<u16>()
    + 3 * size_of::<u32>();

// ── Index table ─────────────────────────────────────────────────────────────

/// Width of the NUL-padded key field in an index record
pub const KEY_FIELD_SIZE: usize = 128;

/// Longest key that still leaves room for the terminating NUL
pub const MAX_KEY_LEN: usize = KEY_FIELD_SIZE - 1;

/// Index record layout: key(128) + size_blocks(4) + offset(4) + flags(4) = 140 bytes
pub const INDEX_ENTRY_SIZE: usize = KEY_FIELD_SIZE + 3 * size_of::<u32>();

// ── Sparse matrix sub-format ────────────────────────────────────────────────

/// Sub-header: rows, cols and six byte offsets, all u32
pub const SPARSE_HEADER_SIZE: usize = 8 * size_of::<u32>();

/// Write `bytes` into a fixed-width field, filling the rest with NULs.
///
/// Callers guarantee `bytes.len() < width`, so the field is always terminated.
pub(crate) fn write_padded(
    writer: &mut (impl Write + ?Sized),
    bytes: &[u8],
    width: usize,
) -> io::Result<()> {
    debug_assert!(bytes.len() < width);
    writer.write_all(bytes)?;
    writer.write_all(&vec![0u8; width - bytes.len()])
}

/// Contents of a NUL-padded field up to (not including) the first NUL.
pub(crate) fn read_padded(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

/// Fixed 48-byte file header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub flags: u16,
    /// Block size in bytes
    pub block_size: u32,
    /// Header size in bytes; the index starts here
    pub header_size: u32,
    /// Total index table size in bytes
    pub index_size: u32,
}

impl FileHeader {
    /// Header for a file whose index table occupies `index_size` bytes.
    pub fn new(flags: u16, index_size: u32) -> Self {
        Self {
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            flags,
            block_size: BLOCK_SIZE,
            header_size: FILE_HEADER_SIZE as u32,
            index_size,
        }
    }

    /// Number of index records announced by `index_size`
    pub fn num_entries(&self) -> usize {
        self.index_size as usize / INDEX_ENTRY_SIZE
    }

    /// Absolute byte offset where the data region begins
    pub fn data_offset(&self) -> u64 {
        u64::from(self.header_size) + u64::from(self.index_size)
    }

    pub fn write_to(&self, writer: &mut (impl Write + ?Sized)) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// The 48 header bytes, identifier first, integers little-endian.
    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        buf[..FILE_IDENTIFIER.len()].copy_from_slice(FILE_IDENTIFIER);
        buf[32] = self.version_major;
        buf[33] = self.version_minor;
        buf[34..36].copy_from_slice(&self.flags.to_le_bytes());
        buf[36..40].copy_from_slice(&self.block_size.to_le_bytes());
        buf[40..44].copy_from_slice(&self.header_size.to_le_bytes());
        buf[44..48].copy_from_slice(&self.index_size.to_le_bytes());
        buf
    }

    /// Parse and validate a header from the first `FILE_HEADER_SIZE` bytes.
    pub fn read_from(data: &[u8]) -> Result<Self> {
        if data.len() < FILE_HEADER_SIZE {
            return Err(Error::Corruption(format!(
                "file header truncated: {} of {} bytes",
                data.len(),
                FILE_HEADER_SIZE
            )));
        }

        let identifier = &data[..IDENTIFIER_SIZE];
        if read_padded(identifier) != FILE_IDENTIFIER {
            return Err(Error::Corruption("not a pagoda2 data file".into()));
        }

        let mut reader = Cursor::new(&data[IDENTIFIER_SIZE..FILE_HEADER_SIZE]);
        let header = Self {
            version_major: reader.read_u8()?,
            version_minor: reader.read_u8()?,
            flags: reader.read_u16::<LittleEndian>()?,
            block_size: reader.read_u32::<LittleEndian>()?,
            header_size: reader.read_u32::<LittleEndian>()?,
            index_size: reader.read_u32::<LittleEndian>()?,
        };

        if (header.version_major, header.version_minor) != (VERSION_MAJOR, VERSION_MINOR) {
            return Err(Error::Corruption(format!(
                "incompatible file version {}.{}",
                header.version_major, header.version_minor
            )));
        }
        if header.block_size == 0 {
            return Err(Error::Corruption("block size is zero".into()));
        }
        if (header.header_size as usize) < FILE_HEADER_SIZE {
            return Err(Error::Corruption(format!(
                "header size {} is smaller than {}",
                header.header_size, FILE_HEADER_SIZE
            )));
        }
        if header.index_size as usize % INDEX_ENTRY_SIZE != 0 {
            return Err(Error::Corruption(format!(
                "index size {} is not a multiple of {}",
                header.index_size, INDEX_ENTRY_SIZE
            )));
        }

        Ok(header)
    }
}
