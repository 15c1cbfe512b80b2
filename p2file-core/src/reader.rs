//! Minimal container reader.
//!
//! Parses the header and index table and reads entries back by key. This is
//! what a client does to locate data; it is used to verify written files and
//! to inspect them from the command line.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

use crate::error::{Error, Result};
use crate::format::{FILE_HEADER_SIZE, FileHeader};
use crate::index::{IndexEntry, IndexTable};

fn read_exact_or_corrupt(reader: &mut impl Read, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::Corruption(format!("{what} truncated")),
        _ => Error::Io(e),
    })
}

/// Random-access reader over a container
pub struct ContainerReader<R> {
    reader: R,
    header: FileHeader,
    index: IndexTable,
    /// Length of the underlying stream in bytes
    len: u64,
}

impl<R> std::fmt::Debug for ContainerReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerReader")
            .field("header", &self.header)
            .field("num_entries", &self.index.len())
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl ContainerReader<BufReader<File>> {
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::open(BufReader::new(file))
    }
}

impl<R: Read + Seek> ContainerReader<R> {
    /// Read and validate the header and the full index table.
    ///
    /// Sizes read from the file are checked against the stream length before
    /// anything is allocated for them.
    pub fn open(mut reader: R) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let mut header_bytes = [0u8; FILE_HEADER_SIZE];
        read_exact_or_corrupt(&mut reader, &mut header_bytes, "file header")?;
        let header = FileHeader::read_from(&header_bytes)?;

        if header.data_offset() > len {
            return Err(Error::Corruption(format!(
                "index table ends at byte {}, file has {} bytes",
                header.data_offset(),
                len
            )));
        }
        reader.seek(SeekFrom::Start(u64::from(header.header_size)))?;
        let mut index_bytes = vec![0u8; header.index_size as usize];
        read_exact_or_corrupt(&mut reader, &mut index_bytes, "index table")?;
        let index = IndexTable::read_from(&index_bytes, header.num_entries())?;

        Ok(Self {
            reader,
            header,
            index,
            len,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn index(&self) -> &IndexTable {
        &self.index
    }

    pub fn entries(&self) -> &[IndexEntry] {
        self.index.entries()
    }

    pub fn get(&self, key: &str) -> Option<&IndexEntry> {
        self.index.get(key)
    }

    /// Absolute file offset of the data region
    pub fn data_offset(&self) -> u64 {
        self.header.data_offset()
    }

    /// Length of the underlying stream in bytes
    pub fn stream_len(&self) -> u64 {
        self.len
    }

    /// Absolute byte range of an entry, including its padding.
    ///
    /// A range that does not lie within the stream is reported as corruption.
    pub fn entry_range(&self, key: &str) -> Result<Range<u64>> {
        let entry = self
            .get(key)
            .ok_or_else(|| Error::EntryNotFound(key.to_string()))?;
        let block_size = u64::from(self.header.block_size);
        let start = self
            .data_offset()
            .checked_add(u64::from(entry.offset) * block_size);
        let end = start.and_then(|s| s.checked_add(u64::from(entry.size_blocks) * block_size));
        match (start, end) {
            (Some(start), Some(end)) if end <= self.len => Ok(start..end),
            _ => Err(Error::Corruption(format!(
                "entry '{}' ({} blocks at block {}) extends past the end of the file ({} bytes)",
                key, entry.size_blocks, entry.offset, self.len
            ))),
        }
    }

    /// Read all blocks of an entry: payload followed by zero padding.
    pub fn read_entry(&mut self, key: &str) -> Result<Vec<u8>> {
        let range = self.entry_range(key)?;
        self.read_range(range, key)
    }

    /// Read the first `len` bytes of an entry.
    pub fn read_payload(&mut self, key: &str, len: u64) -> Result<Vec<u8>> {
        let range = self.entry_range(key)?;
        if len > range.end - range.start {
            return Err(Error::Corruption(format!(
                "entry '{}' holds {} bytes, {} requested",
                key,
                range.end - range.start,
                len
            )));
        }
        self.read_range(range.start..range.start + len, key)
    }

    fn read_range(&mut self, range: Range<u64>, key: &str) -> Result<Vec<u8>> {
        self.reader.seek(SeekFrom::Start(range.start))?;
        let mut data = vec![0u8; (range.end - range.start) as usize];
        read_exact_or_corrupt(&mut self.reader, &mut data, &format!("entry '{key}'"))?;
        Ok(data)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}
