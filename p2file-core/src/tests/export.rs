use std::io::Cursor;

use crate::error::Error;
use crate::export::{ExportSource, NamedDocument, write_export};
use crate::reader::ContainerReader;
use crate::sparse::{DecodedSparseMatrix, SparseMatrix};
use crate::writer::{ContainerWriter, WriterConfig};

fn expression_matrix() -> SparseMatrix {
    SparseMatrix {
        rows: 3,
        cols: 2,
        col_ptr: vec![0, 2, 3],
        row_idx: vec![0, 1, 2],
        values: vec![1.0, 2.0, 3.0],
        row_dim_name: "genes".into(),
        col_dim_name: "cells".into(),
    }
}

fn aspect_matrix() -> SparseMatrix {
    SparseMatrix {
        rows: 2,
        cols: 3,
        col_ptr: vec![0, 1, 1, 2],
        row_idx: vec![1, 0],
        values: vec![-0.25, 4.5],
        row_dim_name: "aspects".into(),
        col_dim_name: "cells".into(),
    }
}

fn export_source() -> ExportSource {
    ExportSource {
        cell_metadata: br#"{"batch":{"data":[0,1]}}"#.to_vec(),
        cell_order: br#"["c1","c2"]"#.to_vec(),
        gene_information: br#"[{"genename":"g1"}]"#.to_vec(),
        reduced_dendrogram: b"{}".to_vec(),
        embedding_structure: br#"{"PCA":{"tSNE":"PCA_tSNE"}}"#.to_vec(),
        embeddings: vec![NamedDocument::new("PCA_tSNE.json", "[[0,1],[1,0]]")],
        sparse_matrix: expression_matrix(),
        aspect_matrix: aspect_matrix(),
        aspect_information: b"[]".to_vec(),
        gene_sets: b"{}".to_vec(),
        gene_set_genes: b"{}".to_vec(),
    }
}

#[test]
fn test_export_round_trip() {
    let source = export_source();
    let keys = source.entry_keys();
    let entries = source.into_entries().unwrap();
    let bytes = ContainerWriter::default().to_bytes(&entries).unwrap();
    let mut reader = ContainerReader::open(Cursor::new(bytes)).unwrap();

    let stored: Vec<&str> = reader.entries().iter().map(|e| e.key.as_str()).collect();
    assert_eq!(stored, keys);
    let offsets: Vec<u32> = reader.entries().iter().map(|e| e.offset).collect();
    assert_eq!(offsets, (0..11).collect::<Vec<u32>>());

    let order = reader.read_payload("cellorder", 11).unwrap();
    assert_eq!(order, br#"["c1","c2"]"#);

    let block = reader.read_entry("sparseMatrix").unwrap();
    let matrix = DecodedSparseMatrix::decode(&block).unwrap();
    assert_eq!(matrix.col_ptr, vec![0, 2, 3]);
    assert_eq!(matrix.row_idx, vec![0, 1, 2]);
    assert_eq!(matrix.values, vec![1.0f32, 2.0, 3.0]);
    assert_eq!(matrix.row_dim_name, "genes");
    assert_eq!(matrix.col_dim_name, "cells");

    let block = reader.read_entry("aspectMatrix").unwrap();
    let aspects = DecodedSparseMatrix::decode(&block).unwrap();
    assert_eq!(aspects.header.rows, 2);
    assert_eq!(aspects.header.cols, 3);
    assert_eq!(aspects.col_ptr, vec![0, 1, 1, 2]);
    assert_eq!(aspects.values, vec![-0.25f32, 4.5]);
    assert_eq!(aspects.row_dim_name, "aspects");
}

#[test]
fn test_export_is_deterministic() {
    let writer = ContainerWriter::default();
    let first = writer
        .to_bytes(&export_source().into_entries().unwrap())
        .unwrap();
    let second = writer
        .to_bytes(&export_source().into_entries().unwrap())
        .unwrap();
    assert!(first == second);
}

#[test]
fn test_malformed_matrix_writes_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.bin");
    let mut source = export_source();
    source.sparse_matrix.row_idx[0] = 3;

    let err = write_export(source, &path, WriterConfig::default()).unwrap_err();
    assert!(matches!(err, Error::MalformedMatrix(_)));
    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_write_export_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.bin");

    let stats = write_export(export_source(), &path, WriterConfig::default()).unwrap();
    assert_eq!(stats.num_entries, 11);
    assert_eq!(stats.total_blocks, 11);

    let mut reader = ContainerReader::open_path(&path).unwrap();
    let embedding = reader.read_payload("PCA_tSNE", 13).unwrap();
    assert_eq!(embedding, b"[[0,1],[1,0]]");
}

#[test]
fn test_embedding_key_collision_is_rejected() {
    let mut source = export_source();
    source
        .embeddings
        .push(NamedDocument::new("genesets.json", "[]"));
    let entries = source.into_entries().unwrap();
    assert!(matches!(
        ContainerWriter::default().to_bytes(&entries),
        Err(Error::DuplicateKey(key)) if key == "genesets"
    ));
}
