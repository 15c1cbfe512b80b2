//! p2file - writer for the block-quantized pagoda2 data container
//!
//! Packs named documents and two sparse matrices into one binary file laid
//! out for random-access reads by a client that only has 32-bit-safe integer
//! arithmetic:
//! - Fixed 48-byte header followed by a table of 140-byte index records
//! - Every entry starts on a 2 MiB block boundary and is zero-padded to it
//! - Index offsets are counted in blocks, so they fit in u32
//! - Sparse matrices use a self-contained compressed-column sub-format
//!
//! The whole file is built in memory and written once.

pub mod entry;
pub mod error;
pub mod export;
pub mod format;
pub mod index;
pub mod reader;
pub mod sparse;
pub mod writer;

#[cfg(test)]
mod tests;

pub use entry::{Entry, EntryKey, blocks_for};
pub use error::{Error, Result};
pub use export::{ExportSource, NamedDocument, embedding_key, write_export};
pub use format::{
    BLOCK_SIZE, FILE_HEADER_SIZE, FILE_IDENTIFIER, FLAGS_ALL_FEATURES, FileHeader,
    INDEX_ENTRY_SIZE, KEY_FIELD_SIZE, MAX_KEY_LEN,
};
pub use index::{IndexEntry, IndexTable};
pub use reader::ContainerReader;
pub use sparse::{
    DecodedSparseMatrix, SparseMatrix, SparseMatrixHeader, SparseMatrixView, encode_entry,
};
pub use writer::{ContainerWriter, WriteStats, WriterConfig};
