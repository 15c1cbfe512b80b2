use std::io::Cursor;

use crate::entry::Entry;
use crate::error::Error;
use crate::format::{BLOCK_SIZE, FILE_HEADER_SIZE, INDEX_ENTRY_SIZE};
use crate::reader::ContainerReader;
use crate::writer::{ContainerWriter, WriterConfig};

const BS: usize = BLOCK_SIZE as usize;

fn text_entries(sizes: &[usize]) -> Vec<Entry> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| {
            let fill = b'a' + i as u8;
            Entry::new(format!("doc{}", i), vec![fill; size]).unwrap()
        })
        .collect()
}

/// Five text entries of mixed sizes each fit one block.
#[test]
fn test_five_entry_scenario() {
    let entries = text_entries(&[10, 2_097_152, 1, 5, 100]);
    let bytes = ContainerWriter::default().to_bytes(&entries).unwrap();

    let reader = ContainerReader::open(Cursor::new(&bytes)).unwrap();
    let sizes: Vec<u32> = reader.entries().iter().map(|e| e.size_blocks).collect();
    let offsets: Vec<u32> = reader.entries().iter().map(|e| e.offset).collect();
    assert_eq!(sizes, vec![1, 1, 1, 1, 1]);
    assert_eq!(offsets, vec![0, 1, 2, 3, 4]);

    assert_eq!(reader.header().index_size as usize, 5 * INDEX_ENTRY_SIZE);
    assert_eq!(
        bytes.len(),
        FILE_HEADER_SIZE + 5 * INDEX_ENTRY_SIZE + 5 * BS
    );
}

/// Every entry reads back as its payload followed by zeros up to the block boundary.
#[test]
fn test_round_trip_payloads() {
    let entries = text_entries(&[0, 17, BS, BS + 1, 3 * BS - 2]);
    let bytes = ContainerWriter::default().to_bytes(&entries).unwrap();
    let mut reader = ContainerReader::open(Cursor::new(bytes)).unwrap();

    let mut expected_offset = 0u32;
    for entry in &entries {
        let key = entry.key().as_str();
        let record = reader.get(key).unwrap().clone();
        assert_eq!(record.key, *entry.key());
        assert_eq!(record.size_blocks, entry.byte_size().div_ceil(BS as u64) as u32);
        assert_eq!(record.offset, expected_offset);
        expected_offset += record.size_blocks;

        let data = reader.read_entry(key).unwrap();
        assert_eq!(data.len(), record.size_blocks as usize * BS);
        assert_eq!(&data[..entry.payload().len()], entry.payload());
        assert!(data[entry.payload().len()..].iter().all(|&b| b == 0));
    }
    assert_eq!(reader.index().total_blocks(), expected_offset);
}

#[test]
fn test_exact_block_has_no_padding() {
    let entries = text_entries(&[BS, BS + 1]);
    let bytes = ContainerWriter::default().to_bytes(&entries).unwrap();
    let mut reader = ContainerReader::open(Cursor::new(bytes)).unwrap();

    assert_eq!(reader.get("doc0").unwrap().size_blocks, 1);
    assert_eq!(reader.get("doc1").unwrap().size_blocks, 2);

    let exact = reader.read_entry("doc0").unwrap();
    assert!(exact.iter().all(|&b| b == b'a'));

    let spilled = reader.read_entry("doc1").unwrap();
    assert_eq!(spilled[BS], b'b');
    assert_eq!(spilled[BS + 1..].len(), BS - 1);
    assert!(spilled[BS + 1..].iter().all(|&b| b == 0));
}

#[test]
fn test_output_is_deterministic() {
    let writer = ContainerWriter::default();
    let first = writer.to_bytes(&text_entries(&[5, 6000, 0, 1])).unwrap();
    let second = writer.to_bytes(&text_entries(&[5, 6000, 0, 1])).unwrap();
    assert!(first == second);
}

#[test]
fn test_write_to_path_matches_in_memory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let entries = text_entries(&[3, 4]);
    let writer = ContainerWriter::new(WriterConfig::new().with_sync(true));

    let stats = writer.write_to_path(&entries, &path).unwrap();
    let on_disk = std::fs::read(&path).unwrap();
    assert_eq!(on_disk, writer.to_bytes(&entries).unwrap());
    assert_eq!(stats.file_bytes, on_disk.len() as u64);

    // Only the finished file is left behind
    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("out.bin")]);

    let reader = ContainerReader::open_path(&path).unwrap();
    assert_eq!(reader.entries().len(), 2);
}

#[test]
fn test_failed_write_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dup.bin");
    let entries = vec![
        Entry::new("x", vec![1]).unwrap(),
        Entry::new("x", vec![2]).unwrap(),
    ];

    let err = ContainerWriter::default()
        .write_to_path(&entries, &path)
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateKey(_)));
    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_existing_file_survives_failed_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keep.bin");
    let writer = ContainerWriter::default();
    writer.write_to_path(&text_entries(&[8]), &path).unwrap();
    let before = std::fs::read(&path).unwrap();

    let entries = vec![
        Entry::new("x", vec![1]).unwrap(),
        Entry::new("x", vec![2]).unwrap(),
    ];
    assert!(writer.write_to_path(&entries, &path).is_err());
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn test_missing_directory_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no/such/dir/out.bin");
    let err = ContainerWriter::default()
        .write_to_path(&text_entries(&[1]), &path)
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}
