//! Train and apply the Zstd dictionary shared by all blocks of a manifest.
//!
//! Blocks compress independently (apply wants random access into bundles),
//! which leaves classic stream compression nothing to work with across
//! block boundaries. A trained dictionary wins most of that back, at the
//! price of shipping ~110 KiB of dictionary alongside the patch data.

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use tracing::*;

use crate::chunk;
use crate::hashing::ContentId;

/// What `zstd --train` calls `--maxdict`.
pub const TARGET_DICT_SIZE: usize = 110 * 1024;

pub const DEFAULT_LEVEL: i32 = 5;

/// Zstd wants a decent spread of samples; below this we don't bother.
const MIN_SAMPLES: usize = 8;

// Sampling caps so training a huge tree stays cheap.
const SAMPLE_BLOCK_CAP: usize = 10_000;
const SAMPLE_BYTE_CAP: usize = 100 * 1024 * 1024;

/// A trained dictionary and the ID it's referenced by.
#[derive(Debug, Clone)]
pub struct Dictionary {
    id: ContentId,
    bytes: Vec<u8>,
}

impl Dictionary {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            id: ContentId::hash(&bytes),
            bytes,
        }
    }

    pub fn id(&self) -> ContentId {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Trains a dictionary from the given blocks, sampling uniformly
/// up to [`SAMPLE_BLOCK_CAP`] blocks or [`SAMPLE_BYTE_CAP`] bytes.
///
/// Returns `None` (and the manifest should fall back to uncompressed)
/// when there's too little material to train on - Zstd refuses to
/// build a dictionary from a handful of samples.
pub fn train(blocks: &[&[u8]]) -> Option<Dictionary> {
    if blocks.len() < MIN_SAMPLES {
        warn!(
            "Only {} blocks to sample, not training a dictionary",
            blocks.len()
        );
        return None;
    }

    let mut rng = rand::thread_rng();
    let mut samples: Vec<&[u8]> = blocks
        .choose_multiple(&mut rng, SAMPLE_BLOCK_CAP)
        .copied()
        .collect();

    let mut sampled_bytes = 0;
    samples.retain(|s| {
        sampled_bytes += s.len();
        sampled_bytes <= SAMPLE_BYTE_CAP
    });

    debug!(
        "Training dictionary from {} samples ({} bytes)",
        samples.len(),
        sampled_bytes.min(SAMPLE_BYTE_CAP)
    );

    match zstd::dict::from_samples(&samples, TARGET_DICT_SIZE) {
        Ok(bytes) => {
            let dictionary = Dictionary::from_bytes(bytes);
            info!(
                "Trained dictionary {} ({} bytes)",
                dictionary.id().short_name(),
                dictionary.bytes().len()
            );
            Some(dictionary)
        }
        Err(e) => {
            warn!("Dictionary training failed ({e}), storing uncompressed");
            None
        }
    }
}

/// Compresses and decompresses blocks with a fixed dictionary.
pub struct Codec {
    dictionary: Dictionary,
    level: i32,
    /// Decompressed blocks can't exceed the chunker's max cut size.
    max_block_size: usize,
}

impl Codec {
    pub fn new(dictionary: Dictionary, level: i32, avg_block_size: u32) -> Self {
        Self {
            dictionary,
            level,
            max_block_size: chunk::max_size(avg_block_size) as usize,
        }
    }

    pub fn dictionary_id(&self) -> ContentId {
        self.dictionary.id()
    }

    pub fn dictionary_bytes(&self) -> &[u8] {
        self.dictionary.bytes()
    }

    /// Compresses one block into a single Zstd frame keyed by the dictionary.
    pub fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut compressor =
            zstd::bulk::Compressor::with_dictionary(self.level, self.dictionary.bytes())
                .context("Couldn't build a Zstd compressor")?;
        compressor.compress(bytes).context("Compression failed")
    }

    /// Decompresses one block.
    ///
    /// Zstd itself rejects frames cut with a different dictionary; callers
    /// still verify the result's hash against the block ID.
    pub fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut decompressor =
            zstd::bulk::Decompressor::with_dictionary(self.dictionary.bytes())
                .context("Couldn't build a Zstd decompressor")?;
        decompressor
            .decompress(bytes, self.max_block_size)
            .context("Decompression failed")
    }
}
