//! Container operations: write, inspect

use std::fs;
use std::io::{self, Read, Seek, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use p2file_core::{ContainerReader, FileHeader, IndexEntry, WriterConfig, write_export};

use crate::source::SourceDoc;

pub fn write_container(input: PathBuf, output: PathBuf, sync: bool) -> Result<()> {
    let text = fs::read_to_string(&input)
        .with_context(|| format!("Failed to read export description: {:?}", input))?;
    let source = SourceDoc::parse(&text)?.into_export_source()?;

    info!(
        "Loaded {} embeddings, expression matrix {}x{} ({} nonzeros)",
        source.embeddings.len(),
        source.sparse_matrix.rows,
        source.sparse_matrix.cols,
        source.sparse_matrix.row_idx.len()
    );

    let config = WriterConfig::new().with_sync(sync);
    let stats = write_export(source, &output, config)
        .with_context(|| format!("Failed to write container: {:?}", output))?;

    info!(
        "Wrote {:?}: {} entries, {} blocks, {} payload bytes, {} bytes total",
        output, stats.num_entries, stats.total_blocks, stats.payload_bytes, stats.file_bytes
    );
    Ok(())
}

/// Header and index of a container, as printed by `inspect --json`
#[derive(Debug, Serialize)]
pub struct ContainerReport<'a> {
    pub header: &'a FileHeader,
    pub data_offset: u64,
    pub entries: &'a [IndexEntry],
}

pub fn render_report<R: Read + Seek>(
    reader: &ContainerReader<R>,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let header = reader.header();
    if json {
        let report = ContainerReport {
            header,
            data_offset: reader.data_offset(),
            entries: reader.entries(),
        };
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "Version: {}.{}", header.version_major, header.version_minor)?;
    writeln!(out, "Flags: {:#06x}", header.flags)?;
    writeln!(out, "Block size: {}", header.block_size)?;
    writeln!(out, "Header size: {}", header.header_size)?;
    writeln!(out, "Index size: {} ({} entries)", header.index_size, header.num_entries())?;
    writeln!(out, "Data offset: {}", reader.data_offset())?;
    writeln!(out, "Total blocks: {}", reader.index().total_blocks())?;
    writeln!(out)?;
    writeln!(out, "{:<40} {:>10} {:>10}", "KEY", "OFFSET", "BLOCKS")?;
    for entry in reader.entries() {
        writeln!(
            out,
            "{:<40} {:>10} {:>10}",
            entry.key.as_str(),
            entry.offset,
            entry.size_blocks
        )?;
    }
    Ok(())
}

pub fn inspect_container(file: PathBuf, json: bool) -> Result<()> {
    let reader = ContainerReader::open_path(&file)
        .with_context(|| format!("Failed to open container: {:?}", file))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    render_report(&reader, json, &mut out)
}
