//! Cut files into content-defined blocks.

use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8Path;
use fastcdc::v2020::FastCDC;
use rayon::prelude::*;
use tracing::*;

use crate::file_util::{self, LoadedFile};
use crate::hashing::ContentId;

/// A span of a shared byte buffer,
/// similar to [`Bytes`](https://docs.rs/bytes/latest/bytes/struct.Bytes.html),
/// but referencing the file it came from.
///
/// All blocks from a file share the same underlying buffer via a refcount to
/// avoid reallocating the whole file, bit by bit, as we hand its blocks to
/// the bundle packer.
#[derive(Debug, Clone)]
pub struct FileSpan {
    file: Arc<LoadedFile>,
    start: usize,
    end: usize,
}

impl AsRef<[u8]> for FileSpan {
    fn as_ref(&self) -> &[u8] {
        let bytes: &[u8] = self.file.bytes();
        &bytes[self.start..self.end]
    }
}

/// Either part of a loaded file or an owned buffer.
#[derive(Debug, Clone)]
pub enum Contents {
    Buffer(Vec<u8>),
    Span(FileSpan),
}

/// A content-defined chunk of a file.
///
/// Our fundamental unit of patching: files are ordered lists of blocks,
/// and apply rebuilds them block by block from wherever each can be found.
#[derive(Debug, Clone)]
pub struct Block {
    /// The bytes themselves
    pub contents: Contents,
    /// The ID of said bytes
    pub id: ContentId,
    /// Where the block started in the file that produced it
    pub offset: u64,
}

impl Block {
    /// Convenience method to get at the block's contents as a byte slice
    pub fn bytes(&self) -> &[u8] {
        match &self.contents {
            Contents::Buffer(v) => v,
            Contents::Span(s) => s.as_ref(),
        }
    }

    pub fn len(&self) -> u64 {
        self.bytes().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }
}

/// The smallest block FastCDC will cut for the given average.
pub fn min_size(avg: u32) -> u32 {
    avg / 4
}

/// The largest block FastCDC will cut for the given average.
pub fn max_size(avg: u32) -> u32 {
    avg * 4
}

/// Cuts a file into content-defined blocks between avg/4 and avg*4 bytes.
///
/// Insertions and deletions only perturb the blocks around the edit point,
/// so most of an edited file hashes to the same block IDs as the previous
/// version and never travels the wire again.
///
/// The whole file is loaded (or mapped) once and processed in a single
/// forward pass; hashing the cuts fans out across a rayon pool.
pub fn chunk_file(path: &Utf8Path, avg: u32) -> Result<Vec<Block>> {
    let file = file_util::read_file(path).with_context(|| format!("Couldn't read {path}"))?;
    chunk_loaded(path, file, avg)
}

fn chunk_loaded(path: &Utf8Path, file: Arc<LoadedFile>, avg: u32) -> Result<Vec<Block>> {
    let file_bytes: &[u8] = file.bytes();
    if file_bytes.is_empty() {
        debug!("{path} is empty, no blocks");
        return Ok(Vec::new());
    }

    trace!("Finding cut points for {path}");
    let cuts: Vec<_> = FastCDC::new(file_bytes, min_size(avg), avg, max_size(avg)).collect();
    debug!("Chunking {} into {} blocks", path, cuts.len());

    let blocks: Vec<Block> = cuts
        .par_iter()
        .map(|cut| {
            let file = file.clone();
            let start = cut.offset;
            let end = cut.offset + cut.length;
            let span = FileSpan { file, start, end };

            let id = ContentId::hash(span.as_ref());

            trace!("{}: [{}..{}] {}", path, start, end, id);

            Block {
                contents: Contents::Span(span),
                id,
                offset: start as u64,
            }
        })
        .collect();

    Ok(blocks)
}

#[cfg(test)]
mod test {
    use super::*;

    use std::io::Write;

    /// Deterministic nonsense so cut points land where real data would
    /// put them, not where a degenerate pattern (e.g. all zeroes) does.
    fn scribble(len: usize, mut seed: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            out.extend_from_slice(&seed.to_le_bytes());
        }
        out.truncate(len);
        out
    }

    fn write_temp(bytes: &[u8]) -> Result<(tempfile::TempDir, camino::Utf8PathBuf)> {
        let dir = tempfile::tempdir()?;
        let path = camino::Utf8Path::from_path(dir.path()).unwrap().join("input");
        let mut fh = std::fs::File::create(&path)?;
        fh.write_all(bytes)?;
        Ok((dir, path))
    }

    #[test]
    fn blocks_reassemble_the_file() -> Result<()> {
        const AVG: u32 = 4096;
        let data = scribble(100 * 1024, 42);
        let (_dir, path) = write_temp(&data)?;

        let blocks = chunk_file(&path, AVG)?;
        assert!(blocks.len() > 1);

        let mut rebuilt = Vec::new();
        let mut expected_offset = 0u64;
        for block in &blocks {
            assert_eq!(block.offset, expected_offset);
            assert!(block.len() <= max_size(AVG) as u64);
            assert_eq!(block.id, ContentId::hash(block.bytes()));
            expected_offset += block.len();
            rebuilt.extend_from_slice(block.bytes());
        }
        assert_eq!(rebuilt, data);

        // All blocks but the last respect the minimum size.
        for block in &blocks[..blocks.len() - 1] {
            assert!(block.len() >= min_size(AVG) as u64);
        }
        Ok(())
    }

    #[test]
    fn deterministic() -> Result<()> {
        let data = scribble(64 * 1024, 7);
        let (_dir, path) = write_temp(&data)?;

        let first: Vec<_> = chunk_file(&path, 1024)?
            .iter()
            .map(|b| (b.offset, b.len(), b.id))
            .collect();
        let second: Vec<_> = chunk_file(&path, 1024)?
            .iter()
            .map(|b| (b.offset, b.len(), b.id))
            .collect();
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn empty_file_has_no_blocks() -> Result<()> {
        let (_dir, path) = write_temp(b"")?;
        assert!(chunk_file(&path, 1024)?.is_empty());
        Ok(())
    }

    #[test]
    fn tiny_file_is_one_block() -> Result<()> {
        let (_dir, path) = write_temp(b"hello")?;
        let blocks = chunk_file(&path, 65536)?;
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].bytes(), b"hello");
        assert_eq!(
            format!("{}", blocks[0].id),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        Ok(())
    }
}
