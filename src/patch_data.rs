//! The patch data directory: a changelog, an optional dictionary,
//! and content-addressed blocks and bundles.
//!
//! ```text
//! patch-data/
//!   changelog.json
//!   dictionary              (absent if uncompressed)
//!   blocks/<hh>/<blockid>   (sharded by the first two hex chars)
//!   bundles/<bundleid>
//! ```
//!
//! The same layout is staged locally and mirrored to the object store,
//! so the key helpers here are used by both sides.

use anyhow::{Context, Result, ensure};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::*;

use crate::changelog::{CHANGELOG_NAME, Changelog};
use crate::file_util;
use crate::hashing::ContentId;

pub const DICTIONARY_NAME: &str = "dictionary";

/// The object-store key for a block, e.g. `blocks/ab/abcd...`.
pub fn block_key(id: &ContentId) -> String {
    format!("blocks/{}/{}", id.shard(), id)
}

/// The object-store key for a bundle, e.g. `bundles/abcd...`.
pub fn bundle_key(id: &ContentId) -> String {
    format!("bundles/{id}")
}

/// A patch data directory on the local filesystem.
///
/// Blocks and bundles are immutable once written; `put` goes through a
/// temp file and a rename so a crash never leaves a half-written object
/// under its final name.
#[derive(Debug, Clone)]
pub struct PatchData {
    root: Utf8PathBuf,
}

impl PatchData {
    /// Opens an existing directory, creating the layout if it's missing.
    pub fn create(root: &Utf8Path) -> Result<Self> {
        std::fs::create_dir_all(root.join("blocks"))
            .with_context(|| format!("Couldn't create {root}/blocks"))?;
        std::fs::create_dir_all(root.join("bundles"))
            .with_context(|| format!("Couldn't create {root}/bundles"))?;
        Ok(Self {
            root: root.to_owned(),
        })
    }

    pub fn open(root: &Utf8Path) -> Result<Self> {
        ensure!(root.is_dir(), "{root} isn't a directory");
        Ok(Self {
            root: root.to_owned(),
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn changelog_path(&self) -> Utf8PathBuf {
        self.root.join(CHANGELOG_NAME)
    }

    pub fn dictionary_path(&self) -> Utf8PathBuf {
        self.root.join(DICTIONARY_NAME)
    }

    pub fn block_path(&self, id: &ContentId) -> Utf8PathBuf {
        self.root.join(block_key(id))
    }

    pub fn bundle_path(&self, id: &ContentId) -> Utf8PathBuf {
        self.root.join(bundle_key(id))
    }

    pub fn has_block(&self, id: &ContentId) -> bool {
        self.block_path(id).is_file()
    }

    /// Stores a block. Idempotent: blocks are content-addressed, so if the
    /// file is already there its bytes are already right.
    pub fn put_block(&self, id: &ContentId, stored_bytes: &[u8]) -> Result<()> {
        let path = self.block_path(id);
        if path.is_file() {
            trace!("block {} already stored", id.short_name());
            return Ok(());
        }
        std::fs::create_dir_all(path.parent().unwrap())
            .with_context(|| format!("Couldn't create shard directory for {id}"))?;
        file_util::atomic_write(&path, stored_bytes)
    }

    /// Reads a block's *stored* bytes; callers decompress if the manifest
    /// is compressed.
    pub fn get_block(&self, id: &ContentId) -> Result<Vec<u8>> {
        let path = self.block_path(id);
        std::fs::read(&path).with_context(|| format!("Couldn't read block {path}"))
    }

    pub fn has_bundle(&self, id: &ContentId) -> bool {
        self.bundle_path(id).is_file()
    }

    pub fn put_bundle(&self, id: &ContentId, stored_bytes: &[u8]) -> Result<()> {
        let path = self.bundle_path(id);
        if path.is_file() {
            trace!("bundle {} already stored", id.short_name());
            return Ok(());
        }
        file_util::atomic_write(&path, stored_bytes)
    }

    pub fn get_bundle(&self, id: &ContentId) -> Result<Vec<u8>> {
        let path = self.bundle_path(id);
        std::fs::read(&path).with_context(|| format!("Couldn't read bundle {path}"))
    }

    /// Enumerates all stored block IDs, sorted. Used for upload planning.
    pub fn iter_blocks(&self) -> Result<Vec<ContentId>> {
        let mut ids = Vec::new();
        let blocks_dir = self.root.join("blocks");
        for shard in sorted_entries(&blocks_dir)? {
            if !shard.is_dir() {
                continue;
            }
            for block in sorted_entries(&shard)? {
                let name = block.file_name().unwrap_or_default();
                match name.parse::<ContentId>() {
                    Ok(id) => ids.push(id),
                    Err(_) => warn!("Ignoring stray file in block store: {block}"),
                }
            }
        }
        Ok(ids)
    }

    /// Enumerates all stored bundle IDs, sorted.
    pub fn iter_bundles(&self) -> Result<Vec<ContentId>> {
        let mut ids = Vec::new();
        for bundle in sorted_entries(&self.root.join("bundles"))? {
            let name = bundle.file_name().unwrap_or_default();
            match name.parse::<ContentId>() {
                Ok(id) => ids.push(id),
                Err(_) => warn!("Ignoring stray file in bundle store: {bundle}"),
            }
        }
        Ok(ids)
    }

    pub fn load_changelog(&self) -> Result<Changelog> {
        Changelog::load(&self.changelog_path())
    }

    pub fn save_changelog(&self, changelog: &Changelog) -> Result<()> {
        changelog.save(&self.changelog_path())
    }

    pub fn load_dictionary(&self) -> Result<Vec<u8>> {
        let path = self.dictionary_path();
        std::fs::read(&path).with_context(|| format!("Couldn't read dictionary {path}"))
    }

    pub fn save_dictionary(&self, bytes: &[u8]) -> Result<()> {
        file_util::atomic_write(&self.dictionary_path(), bytes)
    }
}

fn sorted_entries(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let mut entries = Vec::new();
    for entry in dir
        .read_dir_utf8()
        .with_context(|| format!("Couldn't read {dir}"))?
    {
        entries.push(entry?.path().to_owned());
    }
    entries.sort();
    Ok(entries)
}
