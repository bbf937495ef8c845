//! Utilities for reading files into buffers and persisting them atomically.

use std::fs::File;
use std::io::prelude::*;
use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8Path;
use tracing::*;

/// A loaded file, either as a buffer (if it's small) or as a memory map.
#[derive(Debug)]
pub enum LoadedFile {
    Buffered(Vec<u8>),
    Mapped(memmap2::Mmap),
}

impl LoadedFile {
    pub fn bytes(&self) -> &[u8] {
        match self {
            LoadedFile::Buffered(vec) => vec,
            LoadedFile::Mapped(map) => map,
        }
    }
}

/// Reads an entire file if it's small enough, memory maps it otherwise.
pub fn read_file(path: &Utf8Path) -> Result<Arc<LoadedFile>> {
    const MEGA: u64 = 1024 * 1024;

    let mut fh = File::open(path).with_context(|| format!("Couldn't open {path}"))?;
    let file_length = fh.metadata()?.len();

    let file = if file_length < 10 * MEGA {
        trace!("{path} is < 10MB, reading to buffer");
        let mut buffer = Vec::with_capacity(file_length as usize);
        fh.read_to_end(&mut buffer)?;
        LoadedFile::Buffered(buffer)
    } else {
        trace!("{path} is > 10MB, memory mapping");
        let mapping = unsafe { memmap2::Mmap::map(&fh)? };
        LoadedFile::Mapped(mapping)
    };

    Ok(Arc::new(file))
}

/// Writes bytes to a temporary file next to `to`, fsyncs, then renames.
///
/// `to` never contains a partial file: it either doesn't exist,
/// holds its old contents, or holds all of `bytes`.
pub fn atomic_write(to: &Utf8Path, bytes: &[u8]) -> Result<()> {
    let dir = to
        .parent()
        .with_context(|| format!("{to} has no parent directory"))?;

    let mut fh = tempfile::Builder::new()
        .suffix(".part")
        .tempfile_in(dir)
        .with_context(|| format!("Couldn't open a temporary file in {dir}"))?;
    fh.write_all(bytes)
        .with_context(|| format!("Couldn't write {to}"))?;
    fh.as_file()
        .sync_all()
        .with_context(|| format!("Couldn't sync {to}"))?;
    fh.persist(to)
        .with_context(|| format!("Couldn't rename into {to}"))?;
    Ok(())
}

/// Reads `length` bytes at `offset` from the given file.
pub fn read_range(path: &Utf8Path, offset: u64, length: u64) -> Result<Vec<u8>> {
    let mut fh = File::open(path).with_context(|| format!("Couldn't open {path}"))?;
    fh.seek(std::io::SeekFrom::Start(offset))
        .with_context(|| format!("Couldn't seek to {offset} in {path}"))?;
    let mut buf = vec![0; length as usize];
    fh.read_exact(&mut buf)
        .with_context(|| format!("Couldn't read {length} bytes at {offset} from {path}"))?;
    Ok(buf)
}
