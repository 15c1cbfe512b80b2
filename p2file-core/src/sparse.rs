//! Sparse matrix sub-format.
//!
//! A compressed-sparse-column matrix is stored as one self-contained entry
//! payload. All offsets are relative to the start of the payload, so the blob
//! can be placed anywhere in the container:
//! ```text
//! [sub-header: rows, cols, p_off, i_off, x_off, dimname1_off, dimname2_off, dimname2_end]
//! [p: (cols + 1) * u32]   column pointers
//! [i: nnz * u32]          row indices
//! [x: nnz * f32]          values
//! [dimname1 \0]
//! [dimname2 \0]
//! ```
//! Values are narrowed from f64 to f32; the reader expects 4-byte floats.

use std::io::{Cursor, Write};
use std::mem::size_of;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::format::SPARSE_HEADER_SIZE;

const INDEX_SIZE: u64 = size_of::<u32>() as u64;
const VALUE_SIZE: u64 = size_of::<f32>() as u64;

/// Borrowed compressed-column view over host-owned arrays
#[derive(Debug, Clone, Copy)]
pub struct SparseMatrixView<'a> {
    pub rows: u32,
    pub cols: u32,
    /// Column pointers, `cols + 1` entries starting at 0
    pub col_ptr: &'a [u32],
    /// Row index of each stored value
    pub row_idx: &'a [u32],
    pub values: &'a [f64],
    /// Label of the row dimension
    pub row_dim_name: &'a str,
    /// Label of the column dimension
    pub col_dim_name: &'a str,
}

impl SparseMatrixView<'_> {
    /// Number of stored (non-zero) values
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Check that the arrays describe a well-formed CSC matrix.
    ///
    /// Both dimensions must be positive.
    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(Error::MalformedMatrix(format!(
                "matrix is {}x{}, both dimensions must be positive",
                self.rows, self.cols
            )));
        }
        let expected_ptrs = self.cols as usize + 1;
        if self.col_ptr.len() != expected_ptrs {
            return Err(Error::MalformedMatrix(format!(
                "column pointer array has {} entries, expected cols + 1 = {}",
                self.col_ptr.len(),
                expected_ptrs
            )));
        }
        if self.col_ptr[0] != 0 {
            return Err(Error::MalformedMatrix(format!(
                "column pointer array starts at {}, expected 0",
                self.col_ptr[0]
            )));
        }
        if let Some(col) = self.col_ptr.windows(2).position(|w| w[1] < w[0]) {
            return Err(Error::MalformedMatrix(format!(
                "column pointers decrease at column {}: {} -> {}",
                col,
                self.col_ptr[col],
                self.col_ptr[col + 1]
            )));
        }
        if self.row_idx.len() != self.values.len() {
            return Err(Error::MalformedMatrix(format!(
                "{} row indices but {} values",
                self.row_idx.len(),
                self.values.len()
            )));
        }
        let last = self.col_ptr[self.cols as usize] as usize;
        if last != self.values.len() {
            return Err(Error::MalformedMatrix(format!(
                "last column pointer is {}, but {} values are stored",
                last,
                self.values.len()
            )));
        }
        if let Some(k) = self.row_idx.iter().position(|&r| r >= self.rows) {
            return Err(Error::MalformedMatrix(format!(
                "row index {} at position {} is out of range for {} rows",
                self.row_idx[k], k, self.rows
            )));
        }
        for (which, name) in [("row", self.row_dim_name), ("column", self.col_dim_name)] {
            if name.as_bytes().contains(&0) {
                return Err(Error::MalformedMatrix(format!(
                    "{which} dimension name contains a NUL byte"
                )));
            }
        }
        Ok(())
    }
}

/// Owned compressed-column matrix, as supplied by a host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseMatrix {
    pub rows: u32,
    pub cols: u32,
    #[serde(alias = "p")]
    pub col_ptr: Vec<u32>,
    #[serde(alias = "i")]
    pub row_idx: Vec<u32>,
    #[serde(alias = "x")]
    pub values: Vec<f64>,
    #[serde(default)]
    pub row_dim_name: String,
    #[serde(default)]
    pub col_dim_name: String,
}

impl SparseMatrix {
    pub fn view(&self) -> SparseMatrixView<'_> {
        SparseMatrixView {
            rows: self.rows,
            cols: self.cols,
            col_ptr: &self.col_ptr,
            row_idx: &self.row_idx,
            values: &self.values,
            row_dim_name: &self.row_dim_name,
            col_dim_name: &self.col_dim_name,
        }
    }
}

fn to_field(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        Error::OffsetOverflow(format!("sparse matrix {what} offset {value} exceeds u32"))
    })
}

/// Sub-header embedded at the start of a sparse matrix payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SparseMatrixHeader {
    pub rows: u32,
    pub cols: u32,
    pub col_ptr_offset: u32,
    pub row_idx_offset: u32,
    pub values_offset: u32,
    pub dim_name1_offset: u32,
    pub dim_name2_offset: u32,
    pub dim_name2_end: u32,
}

impl SparseMatrixHeader {
    /// Lay out the sections of `matrix` back to back after the sub-header.
    pub fn for_matrix(matrix: &SparseMatrixView<'_>) -> Result<Self> {
        let col_ptr_offset = SPARSE_HEADER_SIZE as u64;
        let row_idx_offset = col_ptr_offset + INDEX_SIZE * matrix.col_ptr.len() as u64;
        let values_offset = row_idx_offset + INDEX_SIZE * matrix.row_idx.len() as u64;
        let dim_name1_offset = values_offset + VALUE_SIZE * matrix.values.len() as u64;
        let dim_name2_offset = dim_name1_offset + matrix.row_dim_name.len() as u64 + 1;
        let dim_name2_end = dim_name2_offset + matrix.col_dim_name.len() as u64 + 1;

        Ok(Self {
            rows: matrix.rows,
            cols: matrix.cols,
            col_ptr_offset: to_field(col_ptr_offset, "column pointer")?,
            row_idx_offset: to_field(row_idx_offset, "row index")?,
            values_offset: to_field(values_offset, "value")?,
            dim_name1_offset: to_field(dim_name1_offset, "first dimension name")?,
            dim_name2_offset: to_field(dim_name2_offset, "second dimension name")?,
            dim_name2_end: to_field(dim_name2_end, "dimension name end")?,
        })
    }

    /// Total size of the encoded blob in bytes
    pub fn encoded_size(&self) -> usize {
        self.dim_name2_end as usize
    }

    pub fn write_to(&self, writer: &mut (impl Write + ?Sized)) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.rows)?;
        writer.write_u32::<LittleEndian>(self.cols)?;
        writer.write_u32::<LittleEndian>(self.col_ptr_offset)?;
        writer.write_u32::<LittleEndian>(self.row_idx_offset)?;
        writer.write_u32::<LittleEndian>(self.values_offset)?;
        writer.write_u32::<LittleEndian>(self.dim_name1_offset)?;
        writer.write_u32::<LittleEndian>(self.dim_name2_offset)?;
        writer.write_u32::<LittleEndian>(self.dim_name2_end)?;
        Ok(())
    }

    /// Parse the sub-header and check that its sections are consistent.
    pub fn read_from(data: &[u8]) -> Result<Self> {
        if data.len() < SPARSE_HEADER_SIZE {
            return Err(Error::Corruption(format!(
                "sparse matrix header truncated: {} bytes",
                data.len()
            )));
        }
        let mut reader = Cursor::new(data);
        let header = Self {
            rows: reader.read_u32::<LittleEndian>()?,
            cols: reader.read_u32::<LittleEndian>()?,
            col_ptr_offset: reader.read_u32::<LittleEndian>()?,
            row_idx_offset: reader.read_u32::<LittleEndian>()?,
            values_offset: reader.read_u32::<LittleEndian>()?,
            dim_name1_offset: reader.read_u32::<LittleEndian>()?,
            dim_name2_offset: reader.read_u32::<LittleEndian>()?,
            dim_name2_end: reader.read_u32::<LittleEndian>()?,
        };

        let offsets = [
            SPARSE_HEADER_SIZE as u64,
            u64::from(header.col_ptr_offset),
            u64::from(header.row_idx_offset),
            u64::from(header.values_offset),
            u64::from(header.dim_name1_offset),
            u64::from(header.dim_name2_offset),
            u64::from(header.dim_name2_end),
        ];
        if offsets.windows(2).any(|w| w[1] < w[0]) {
            return Err(Error::Corruption(format!(
                "sparse matrix offsets are not ordered: {offsets:?}"
            )));
        }
        if header.dim_name2_end as usize > data.len() {
            return Err(Error::Corruption(format!(
                "sparse matrix blob truncated: needs {} bytes, have {}",
                header.dim_name2_end,
                data.len()
            )));
        }
        let ptr_bytes = u64::from(header.row_idx_offset - header.col_ptr_offset);
        let idx_bytes = u64::from(header.values_offset - header.row_idx_offset);
        let val_bytes = u64::from(header.dim_name1_offset - header.values_offset);
        if ptr_bytes != INDEX_SIZE * (u64::from(header.cols) + 1)
            || idx_bytes % INDEX_SIZE != 0
            || idx_bytes / INDEX_SIZE != val_bytes / VALUE_SIZE
            || val_bytes % VALUE_SIZE != 0
        {
            return Err(Error::Corruption(
                "sparse matrix section sizes do not match its dimensions".into(),
            ));
        }
        Ok(header)
    }

    /// Number of stored values implied by the section offsets
    pub fn nnz(&self) -> usize {
        ((self.dim_name1_offset - self.values_offset) as u64 / VALUE_SIZE) as usize
    }
}

/// Encode a matrix into its self-contained sub-format blob.
pub fn encode(matrix: &SparseMatrixView<'_>) -> Result<Vec<u8>> {
    matrix.validate()?;
    let header = SparseMatrixHeader::for_matrix(matrix)?;

    log::debug!(
        "sparse matrix {}x{} nnz={}: p@{} i@{} x@{} dimnames@{}..{}..{}",
        header.rows,
        header.cols,
        matrix.nnz(),
        header.col_ptr_offset,
        header.row_idx_offset,
        header.values_offset,
        header.dim_name1_offset,
        header.dim_name2_offset,
        header.dim_name2_end
    );

    let size = header.encoded_size();
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| Error::Allocation { bytes: size })?;

    header.write_to(&mut buf)?;
    for &p in matrix.col_ptr {
        buf.write_u32::<LittleEndian>(p)?;
    }
    for &i in matrix.row_idx {
        buf.write_u32::<LittleEndian>(i)?;
    }
    for &x in matrix.values {
        buf.write_f32::<LittleEndian>(x as f32)?;
    }
    buf.extend_from_slice(matrix.row_dim_name.as_bytes());
    buf.push(0);
    buf.extend_from_slice(matrix.col_dim_name.as_bytes());
    buf.push(0);

    debug_assert_eq!(buf.len(), size);
    Ok(buf)
}

/// Encode a matrix and wrap it as a container entry.
pub fn encode_entry(key: &str, matrix: &SparseMatrixView<'_>) -> Result<Entry> {
    Entry::new(key, encode(matrix)?)
}

/// Matrix read back from its sub-format blob
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSparseMatrix {
    pub header: SparseMatrixHeader,
    pub col_ptr: Vec<u32>,
    pub row_idx: Vec<u32>,
    pub values: Vec<f32>,
    pub row_dim_name: String,
    pub col_dim_name: String,
}

impl DecodedSparseMatrix {
    /// Decode a blob; trailing bytes past `dim_name2_end` (block padding) are ignored.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let header = SparseMatrixHeader::read_from(data)?;

        let read_u32s = |start: u32, end: u32| -> Vec<u32> {
            data[start as usize..end as usize]
                .chunks_exact(size_of::<u32>())
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        };
        let col_ptr = read_u32s(header.col_ptr_offset, header.row_idx_offset);
        let row_idx = read_u32s(header.row_idx_offset, header.values_offset);
        let values = data[header.values_offset as usize..header.dim_name1_offset as usize]
            .chunks_exact(size_of::<f32>())
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let row_dim_name = read_terminated(data, header.dim_name1_offset, header.dim_name2_offset)?;
        let col_dim_name = read_terminated(data, header.dim_name2_offset, header.dim_name2_end)?;

        Ok(Self {
            header,
            col_ptr,
            row_idx,
            values,
            row_dim_name,
            col_dim_name,
        })
    }
}

/// Read a NUL-terminated UTF-8 string occupying exactly `start..end`.
fn read_terminated(data: &[u8], start: u32, end: u32) -> Result<String> {
    let bytes = &data[start as usize..end as usize];
    match bytes.split_last() {
        Some((&0, text)) if !text.contains(&0) => String::from_utf8(text.to_vec())
            .map_err(|e| Error::Corruption(format!("dimension name is not UTF-8: {e}"))),
        _ => Err(Error::Corruption(
            "dimension name is not NUL-terminated at its recorded end".into(),
        )),
    }
}
