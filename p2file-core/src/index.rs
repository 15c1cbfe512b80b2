//! Index table: one fixed-size record per entry, in data order.
//!
//! Offsets are a running prefix sum of block counts, so consecutive entries
//! occupy adjacent block ranges with no gaps or overlaps. The reader locates
//! data purely through `(offset, size_blocks)`, which makes the order of the
//! table the physical order of the data region.

use std::io::{self, Cursor, Write};
use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::entry::{Entry, EntryKey};
use crate::error::{Error, Result};
use crate::format::{BLOCK_SIZE, INDEX_ENTRY_SIZE, KEY_FIELD_SIZE, read_padded, write_padded};

/// Index record for one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub key: EntryKey,
    /// Size in blocks
    pub size_blocks: u32,
    /// Offset in blocks from the start of the data region
    pub offset: u32,
    /// Reserved, always 0
    pub flags: u32,
}

impl IndexEntry {
    /// Blocks occupied by this entry, relative to the data region
    pub fn block_range(&self) -> Range<u64> {
        let start = u64::from(self.offset);
        start..start + u64::from(self.size_blocks)
    }

    /// Bytes occupied by this entry, relative to the data region
    pub fn byte_range(&self) -> Range<u64> {
        let blocks = self.block_range();
        blocks.start * u64::from(BLOCK_SIZE)..blocks.end * u64::from(BLOCK_SIZE)
    }

    pub fn write_to(&self, writer: &mut (impl Write + ?Sized)) -> io::Result<()> {
        write_padded(writer, self.key.as_bytes(), KEY_FIELD_SIZE)?;
        writer.write_u32::<LittleEndian>(self.size_blocks)?;
        writer.write_u32::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.flags)?;
        Ok(())
    }

    /// Parse one 140-byte record.
    pub fn read_from(record: &[u8]) -> Result<Self> {
        if record.len() < INDEX_ENTRY_SIZE {
            return Err(Error::Corruption(format!(
                "index record truncated: {} bytes",
                record.len()
            )));
        }
        let key_field = &record[..KEY_FIELD_SIZE];
        if !key_field.contains(&0) {
            return Err(Error::Corruption("index key is not NUL-terminated".into()));
        }
        let key = std::str::from_utf8(read_padded(key_field))
            .map_err(|e| Error::Corruption(format!("index key is not UTF-8: {e}")))?;
        let key = EntryKey::new(key)
            .map_err(|e| Error::Corruption(format!("invalid index key: {e}")))?;

        let mut reader = Cursor::new(&record[KEY_FIELD_SIZE..INDEX_ENTRY_SIZE]);
        Ok(Self {
            key,
            size_blocks: reader.read_u32::<LittleEndian>()?,
            offset: reader.read_u32::<LittleEndian>()?,
            flags: reader.read_u32::<LittleEndian>()?,
        })
    }
}

/// Ordered index records plus the total block count they cover
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexTable {
    entries: Vec<IndexEntry>,
    total_blocks: u32,
}

impl IndexTable {
    /// Compute block offsets for `entries` in order.
    pub fn build(entries: &[Entry]) -> Result<Self> {
        let mut seen = FxHashSet::default();
        let mut records = Vec::with_capacity(entries.len());
        let mut cur_offset: u32 = 0;

        for entry in entries {
            if !seen.insert(entry.key().as_str()) {
                return Err(Error::DuplicateKey(entry.key().to_string()));
            }

            records.push(IndexEntry {
                key: entry.key().clone(),
                size_blocks: entry.block_count(),
                offset: cur_offset,
                flags: 0,
            });

            cur_offset = cur_offset.checked_add(entry.block_count()).ok_or_else(|| {
                Error::OffsetOverflow(format!(
                    "block offset after entry '{}' exceeds u32::MAX",
                    entry.key()
                ))
            })?;
        }

        Ok(Self {
            entries: records,
            total_blocks: cur_offset,
        })
    }

    /// Parse `num_entries` consecutive records.
    pub fn read_from(data: &[u8], num_entries: usize) -> Result<Self> {
        let needed = num_entries * INDEX_ENTRY_SIZE;
        if data.len() < needed {
            return Err(Error::Corruption(format!(
                "index table truncated: {} of {} bytes",
                data.len(),
                needed
            )));
        }

        let mut entries = Vec::with_capacity(num_entries);
        let mut total_blocks = 0u32;
        for record in data[..needed].chunks_exact(INDEX_ENTRY_SIZE) {
            let entry = IndexEntry::read_from(record)?;
            let end = u32::try_from(entry.block_range().end).map_err(|_| {
                Error::Corruption(format!("entry '{}' extends past u32::MAX blocks", entry.key))
            })?;
            total_blocks = total_blocks.max(end);
            entries.push(entry);
        }

        Ok(Self {
            entries,
            total_blocks,
        })
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.key.as_str() == key)
    }

    /// Blocks covered by the data region
    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    /// Index table size in bytes, as stored in the file header
    pub fn index_size(&self) -> Result<u32> {
        self.entries
            .len()
            .checked_mul(INDEX_ENTRY_SIZE)
            .and_then(|size| u32::try_from(size).ok())
            .ok_or_else(|| {
                Error::OffsetOverflow(format!(
                    "index of {} entries exceeds u32::MAX bytes",
                    self.entries.len()
                ))
            })
    }

    pub fn write_to(&self, writer: &mut (impl Write + ?Sized)) -> io::Result<()> {
        for entry in &self.entries {
            entry.write_to(writer)?;
        }
        Ok(())
    }
}
