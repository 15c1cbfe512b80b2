//! The fixed entry set of a pagoda2 export.
//!
//! Keys and their order are part of the format contract: the web client looks
//! entries up by these names.

use std::path::Path;

use crate::entry::Entry;
use crate::error::Result;
use crate::sparse::{SparseMatrix, encode_entry};
use crate::writer::{ContainerWriter, WriteStats, WriterConfig};

pub const KEY_CELL_METADATA: &str = "cellmetadata";
pub const KEY_CELL_ORDER: &str = "cellorder";
pub const KEY_GENE_INFORMATION: &str = "geneinformation";
pub const KEY_REDUCED_DENDROGRAM: &str = "reduceddendrogram";
pub const KEY_EMBEDDING_STRUCTURE: &str = "embeddingstructure";
pub const KEY_SPARSE_MATRIX: &str = "sparseMatrix";
pub const KEY_ASPECT_MATRIX: &str = "aspectMatrix";
pub const KEY_ASPECT_INFORMATION: &str = "aspectinformation";
pub const KEY_GENE_SETS: &str = "genesets";
pub const KEY_GENE_SET_GENES: &str = "genesetsgenes";

/// Entry key of an embedding: its name without the last extension.
///
/// `"PCA_UMAP.json"` becomes `"PCA_UMAP"`; a name without a dot is kept as is.
pub fn embedding_key(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name,
    }
}

/// A named, already-encoded document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedDocument {
    pub name: String,
    pub data: Vec<u8>,
}

impl NamedDocument {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Host data for one export.
///
/// Documents are opaque payloads (JSON text in practice); the two matrices are
/// encoded into the sparse matrix sub-format.
#[derive(Debug, Clone, Default)]
pub struct ExportSource {
    pub cell_metadata: Vec<u8>,
    pub cell_order: Vec<u8>,
    pub gene_information: Vec<u8>,
    pub reduced_dendrogram: Vec<u8>,
    pub embedding_structure: Vec<u8>,
    /// One entry per projection, keyed by `embedding_key(name)`
    pub embeddings: Vec<NamedDocument>,
    /// Expression matrix
    pub sparse_matrix: SparseMatrix,
    /// Aspect matrix
    pub aspect_matrix: SparseMatrix,
    pub aspect_information: Vec<u8>,
    pub gene_sets: Vec<u8>,
    pub gene_set_genes: Vec<u8>,
}

impl ExportSource {
    /// Keys of the entries this source produces, in file order
    pub fn entry_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = [
            KEY_CELL_METADATA,
            KEY_CELL_ORDER,
            KEY_GENE_INFORMATION,
            KEY_REDUCED_DENDROGRAM,
            KEY_EMBEDDING_STRUCTURE,
        ]
        .iter()
        .map(|k| k.to_string())
        .collect();
        keys.extend(
            self.embeddings
                .iter()
                .map(|e| embedding_key(&e.name).to_string()),
        );
        keys.extend(
            [
                KEY_SPARSE_MATRIX,
                KEY_ASPECT_MATRIX,
                KEY_ASPECT_INFORMATION,
                KEY_GENE_SETS,
                KEY_GENE_SET_GENES,
            ]
            .iter()
            .map(|k| k.to_string()),
        );
        keys
    }

    /// Build the ordered entry list.
    ///
    /// The two matrices are independent and are encoded in parallel; any
    /// malformed matrix or key fails here, before anything is written.
    pub fn into_entries(self) -> Result<Vec<Entry>> {
        let (sparse, aspect) = rayon::join(
            || encode_entry(KEY_SPARSE_MATRIX, &self.sparse_matrix.view()),
            || encode_entry(KEY_ASPECT_MATRIX, &self.aspect_matrix.view()),
        );
        let sparse = sparse?;
        let aspect = aspect?;
        log::debug!(
            "Encoded matrices: {} = {} bytes, {} = {} bytes",
            KEY_SPARSE_MATRIX,
            sparse.byte_size(),
            KEY_ASPECT_MATRIX,
            aspect.byte_size()
        );

        let Self {
            cell_metadata,
            cell_order,
            gene_information,
            reduced_dendrogram,
            embedding_structure,
            embeddings,
            aspect_information,
            gene_sets,
            gene_set_genes,
            ..
        } = self;

        let mut entries = Vec::with_capacity(10 + embeddings.len());
        entries.push(Entry::new(KEY_CELL_METADATA, cell_metadata)?);
        entries.push(Entry::new(KEY_CELL_ORDER, cell_order)?);
        entries.push(Entry::new(KEY_GENE_INFORMATION, gene_information)?);
        entries.push(Entry::new(KEY_REDUCED_DENDROGRAM, reduced_dendrogram)?);
        entries.push(Entry::new(KEY_EMBEDDING_STRUCTURE, embedding_structure)?);
        for embedding in embeddings {
            entries.push(Entry::new(embedding_key(&embedding.name), embedding.data)?);
        }
        entries.push(sparse);
        entries.push(aspect);
        entries.push(Entry::new(KEY_ASPECT_INFORMATION, aspect_information)?);
        entries.push(Entry::new(KEY_GENE_SETS, gene_sets)?);
        entries.push(Entry::new(KEY_GENE_SET_GENES, gene_set_genes)?);

        Ok(entries)
    }
}

/// Encode `source` and write it as a container at `path`.
pub fn write_export(
    source: ExportSource,
    path: impl AsRef<Path>,
    config: WriterConfig,
) -> Result<WriteStats> {
    let entries = source.into_entries()?;
    ContainerWriter::new(config).write_to_path(&entries, path)
}
