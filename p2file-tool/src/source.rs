//! JSON description of an export, as read by `p2file-tool write`

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;

use p2file_core::{ExportSource, NamedDocument, SparseMatrix};

/// One projection of the cells
#[derive(Debug, Deserialize)]
pub struct EmbeddingDoc {
    /// File-style name; the extension is dropped to form the entry key
    pub name: String,
    pub data: Value,
}

/// Top-level input document.
///
/// Text documents are JSON values: a string is stored verbatim, anything else
/// is serialized compactly. Every document is required and may not be null.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceDoc {
    pub cell_metadata: Value,
    pub cell_order: Value,
    pub gene_information: Value,
    pub reduced_dendrogram: Value,
    pub embedding_structure: Value,
    #[serde(default)]
    pub embeddings: Vec<EmbeddingDoc>,
    pub sparse_matrix: SparseMatrix,
    pub aspect_matrix: SparseMatrix,
    pub aspect_information: Value,
    pub gene_sets: Value,
    pub gene_set_genes: Value,
}

/// Payload bytes of a document value
pub fn document_bytes(value: Value) -> Result<Vec<u8>> {
    match value {
        Value::String(text) => Ok(text.into_bytes()),
        other => serde_json::to_vec(&other).context("Failed to serialize document"),
    }
}

fn required_document(name: &str, value: Value) -> Result<Vec<u8>> {
    if value.is_null() {
        bail!("Document '{}' is null", name);
    }
    document_bytes(value).with_context(|| format!("Invalid document '{}'", name))
}

impl SourceDoc {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse export description")
    }

    pub fn into_export_source(self) -> Result<ExportSource> {
        let embeddings = self
            .embeddings
            .into_iter()
            .map(|e| {
                let data = document_bytes(e.data)
                    .with_context(|| format!("Invalid embedding '{}'", e.name))?;
                Ok(NamedDocument::new(e.name, data))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ExportSource {
            cell_metadata: required_document("cell_metadata", self.cell_metadata)?,
            cell_order: required_document("cell_order", self.cell_order)?,
            gene_information: required_document("gene_information", self.gene_information)?,
            reduced_dendrogram: required_document("reduced_dendrogram", self.reduced_dendrogram)?,
            embedding_structure: required_document(
                "embedding_structure",
                self.embedding_structure,
            )?,
            embeddings,
            sparse_matrix: self.sparse_matrix,
            aspect_matrix: self.aspect_matrix,
            aspect_information: required_document("aspect_information", self.aspect_information)?,
            gene_sets: required_document("gene_sets", self.gene_sets)?,
            gene_set_genes: required_document("gene_set_genes", self.gene_set_genes)?,
        })
    }
}
