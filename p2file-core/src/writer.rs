//! Container writer.
//!
//! Emits the header, the whole index table, then every entry's payload
//! zero-padded to its block boundary, in index order. The layout is computed
//! completely before the first byte goes out, so key and size errors never
//! produce a partial file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::format::{BLOCK_SIZE, FILE_HEADER_SIZE, FLAGS_ALL_FEATURES, FileHeader};
use crate::index::IndexTable;

/// Default capacity of the buffered file writer (1MB)
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Configuration for the container writer
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Flags stored in the file header
    pub flags: u16,
    /// Capacity of the buffered writer used by `write_to_path`
    pub buffer_capacity: usize,
    /// fsync the file before it is moved into place
    pub sync: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            flags: FLAGS_ALL_FEATURES,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            sync: false,
        }
    }
}

impl WriterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(4096);
        self
    }

    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

/// Summary of a written container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    pub num_entries: usize,
    /// Index table size in bytes
    pub index_size: u32,
    /// Blocks in the data region
    pub total_blocks: u32,
    /// Sum of payload sizes before padding
    pub payload_bytes: u64,
    /// Total file size
    pub file_bytes: u64,
}

/// Writes an ordered list of entries as one container
#[derive(Debug, Clone, Default)]
pub struct ContainerWriter {
    config: WriterConfig,
}

impl ContainerWriter {
    pub fn new(config: WriterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Compute the header and index for `entries` without writing anything.
    pub fn prepare(&self, entries: &[Entry]) -> Result<(FileHeader, IndexTable)> {
        let index = IndexTable::build(entries)?;
        let index_size = index.index_size()?;
        let header = FileHeader::new(self.config.flags, index_size);
        Ok((header, index))
    }

    /// Write the container to `writer`.
    ///
    /// The writer is flushed but not synced. On error the stream holds a
    /// partial container that must be discarded.
    pub fn write(&self, entries: &[Entry], writer: &mut (impl Write + ?Sized)) -> Result<WriteStats> {
        let (header, index) = self.prepare(entries)?;
        self.write_prepared(&header, &index, entries, writer)
    }

    /// Serialize the container into memory.
    pub fn to_bytes(&self, entries: &[Entry]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write(entries, &mut buf)?;
        Ok(buf)
    }

    /// Write the container to `path`.
    ///
    /// Data goes to a temporary file next to `path` that is renamed over it
    /// only after every byte has been written, so a failed write leaves no
    /// file (and no truncated one) at `path`.
    pub fn write_to_path(&self, entries: &[Entry], path: impl AsRef<Path>) -> Result<WriteStats> {
        let path = path.as_ref();
        let (header, index) = self.prepare(entries)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let tmp = tempfile::Builder::new()
            .prefix(".p2file-")
            .suffix(".tmp")
            .tempfile_in(dir)?;

        let stats = {
            let file: &File = tmp.as_file();
            let mut out = BufWriter::with_capacity(self.config.buffer_capacity, file);
            let stats = self.write_prepared(&header, &index, entries, &mut out)?;
            out.flush()?;
            stats
        };
        if self.config.sync {
            tmp.as_file().sync_all()?;
        }
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;

        log::info!(
            "Wrote {} entries ({} blocks, {} bytes) to {:?}",
            stats.num_entries,
            stats.total_blocks,
            stats.file_bytes,
            path
        );
        Ok(stats)
    }

    fn write_prepared(
        &self,
        header: &FileHeader,
        index: &IndexTable,
        entries: &[Entry],
        writer: &mut (impl Write + ?Sized),
    ) -> Result<WriteStats> {
        log::debug!(
            "Container header: {} entries, index size {} bytes, header size {} bytes",
            index.len(),
            header.index_size,
            FILE_HEADER_SIZE
        );

        header.write_to(writer)?;
        index.write_to(writer)?;

        let zeros = zero_block(entries)?;
        let mut payload_bytes = 0u64;
        for (i, entry) in entries.iter().enumerate() {
            log::debug!(
                "Writing entry {} '{}': {} blocks ({} bytes, {} padding)",
                i,
                entry.key(),
                entry.block_count(),
                entry.byte_size(),
                entry.padding()
            );
            writer.write_all(entry.payload())?;
            write_zeros(writer, &zeros, entry.padding())?;
            payload_bytes += entry.byte_size();
        }
        writer.flush()?;

        Ok(WriteStats {
            num_entries: entries.len(),
            index_size: header.index_size,
            total_blocks: index.total_blocks(),
            payload_bytes,
            file_bytes: header.data_offset()
                + u64::from(index.total_blocks()) * u64::from(BLOCK_SIZE),
        })
    }
}

/// Reusable zero buffer, sized to the largest padding needed (at most one block).
fn zero_block(entries: &[Entry]) -> Result<Vec<u8>> {
    let len = entries
        .iter()
        .map(Entry::padding)
        .max()
        .unwrap_or(0)
        .min(u64::from(BLOCK_SIZE)) as usize;

    let mut zeros = Vec::new();
    zeros
        .try_reserve_exact(len)
        .map_err(|_| Error::Allocation { bytes: len })?;
    zeros.resize(len, 0);
    Ok(zeros)
}

fn write_zeros(writer: &mut (impl Write + ?Sized), zeros: &[u8], mut remaining: u64) -> Result<()> {
    while remaining > 0 {
        let chunk = remaining.min(zeros.len() as u64) as usize;
        writer.write_all(&zeros[..chunk])?;
        remaining -= chunk as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::INDEX_ENTRY_SIZE;

    const BS: usize = BLOCK_SIZE as usize;

    #[test]
    fn test_write_layout() {
        let entries = vec![
            Entry::from_text("cellmetadata", "{\"a\":1}").unwrap(),
            Entry::new("blob", vec![0xAB; BS + 3]).unwrap(),
        ];
        let writer = ContainerWriter::default();
        let bytes = writer.to_bytes(&entries).unwrap();

        let data_offset = FILE_HEADER_SIZE + 2 * INDEX_ENTRY_SIZE;
        assert_eq!(bytes.len(), data_offset + 3 * BS);

        let first = &bytes[data_offset..data_offset + BS];
        assert_eq!(&first[..7], b"{\"a\":1}");
        assert!(first[7..].iter().all(|&b| b == 0));

        let second = &bytes[data_offset + BS..];
        assert!(second[..BS + 3].iter().all(|&b| b == 0xAB));
        assert!(second[BS + 3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_stats() {
        let entries = vec![
            Entry::new("a", vec![1; 10]).unwrap(),
            Entry::new("b", vec![2; BS + 1]).unwrap(),
        ];
        let mut sink = Vec::new();
        let stats = ContainerWriter::default().write(&entries, &mut sink).unwrap();

        assert_eq!(stats.num_entries, 2);
        assert_eq!(stats.index_size, 280);
        assert_eq!(stats.total_blocks, 3);
        assert_eq!(stats.payload_bytes, 10 + BS as u64 + 1);
        assert_eq!(stats.file_bytes, sink.len() as u64);
    }

    #[test]
    fn test_empty_container() {
        let bytes = ContainerWriter::default().to_bytes(&[]).unwrap();
        assert_eq!(bytes.len(), FILE_HEADER_SIZE);
        let header = FileHeader::read_from(&bytes).unwrap();
        assert_eq!(header.index_size, 0);
    }

    #[test]
    fn test_custom_flags() {
        let writer = ContainerWriter::new(WriterConfig::new().with_flags(0x0001));
        let bytes = writer.to_bytes(&[]).unwrap();
        assert_eq!(&bytes[34..36], &[0x01, 0x00]);
    }

    #[test]
    fn test_duplicate_keys_write_nothing() {
        let entries = vec![
            Entry::new("same", vec![1]).unwrap(),
            Entry::new("same", vec![2]).unwrap(),
        ];
        let mut sink = Vec::new();
        let err = ContainerWriter::default()
            .write(&entries, &mut sink)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(_)));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_zero_block_size() {
        let entries = vec![
            Entry::new("a", vec![1; BS]).unwrap(),
            Entry::new("b", vec![1; 100]).unwrap(),
        ];
        assert_eq!(zero_block(&entries).unwrap().len(), BS - 100);
        assert!(zero_block(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = WriterConfig::new()
            .with_buffer_capacity(16)
            .with_sync(true);
        assert_eq!(config.buffer_capacity, 4096);
        assert!(config.sync);
        assert_eq!(config.flags, FLAGS_ALL_FEATURES);
    }
}
