//! The changelog: a JSON manifest describing one version of a tree.
//!
//! Everything else hangs off this document. Files map to ordered block
//! lists, blocks map to the bundle that carries them, and bundles record
//! where each block sits in the stored object. It's a DAG with the
//! changelog at the root; nothing in it is mutated after creation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use jiff::Timestamp;
use serde_derive::{Deserialize, Serialize};

use crate::error::PatchError;
use crate::file_util;
use crate::hashing::ContentId;

pub const CHANGELOG_NAME: &str = "changelog.json";

/// One block's place inside a bundle.
///
/// Offsets and lengths are *stored-form* bytes: if the manifest is
/// compressed, they index the concatenation of compressed frames.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub block: ContentId,
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changelog {
    /// Monotonically increasing, starting at 1.
    pub version: u64,
    pub created_at: Timestamp,
    /// The average block size the chunker aimed for.
    pub block_size: u32,
    pub compressed: bool,
    /// Set iff `compressed`.
    pub dictionary_id: Option<ContentId>,
    /// Relative, forward-slash paths to the ordered blocks that make them up.
    /// An empty list is an empty file.
    pub files: BTreeMap<Utf8PathBuf, Vec<ContentId>>,
    /// Bundle ID to the blocks stored inside, in stored order.
    pub bundles: BTreeMap<ContentId, Vec<BundleEntry>>,
    /// Every referenced block to the bundle that carries it.
    pub block_index: BTreeMap<ContentId, ContentId>,
    pub total_uncompressed_bytes: u64,
}

impl Changelog {
    /// Checks the cross-referencing invariants of the schema.
    ///
    /// Run after every load and before every save; a changelog that fails
    /// this is a bug upstream or a mangled download, not something to
    /// limp along with.
    pub fn check(&self) -> Result<(), PatchError> {
        let schema = |msg: String| PatchError::Input(format!("changelog: {msg}"));

        if self.compressed != self.dictionary_id.is_some() {
            return Err(schema(format!(
                "compressed = {} but dictionary_id = {:?}",
                self.compressed, self.dictionary_id
            )));
        }

        for path in self.files.keys() {
            if path.is_absolute() {
                return Err(schema(format!("{path} isn't relative")));
            }
            if path
                .components()
                .any(|c| !matches!(c, camino::Utf8Component::Normal(_)))
            {
                return Err(schema(format!("{path} climbs out of the tree")));
            }
        }

        // Every block referenced by a file resolves to a bundle.
        for (path, blocks) in &self.files {
            for block in blocks {
                let bundle = self
                    .block_index
                    .get(block)
                    .ok_or_else(|| schema(format!("{path} references unindexed block {block}")))?;
                let members = self.bundles.get(bundle).ok_or_else(|| {
                    schema(format!("block {block} indexed to unknown bundle {bundle}"))
                })?;
                if !members.iter().any(|e| e.block == *block) {
                    return Err(schema(format!(
                        "bundle {bundle} doesn't contain block {block} as indexed"
                    )));
                }
            }
        }

        // Every indexed block points at a real bundle, and every bundle
        // carries at least one indexed block.
        for (block, bundle) in &self.block_index {
            if !self.bundles.contains_key(bundle) {
                return Err(schema(format!(
                    "block {block} indexed to unknown bundle {bundle}"
                )));
            }
        }
        for bundle in self.bundles.keys() {
            if !self.block_index.values().any(|b| b == bundle) {
                return Err(schema(format!("bundle {bundle} carries no indexed blocks")));
            }
        }

        // Bundle entries tile the bundle: contiguous from zero, no gaps,
        // no overlaps.
        for (bundle, entries) in &self.bundles {
            let mut expected_offset = 0;
            for entry in entries {
                if entry.offset != expected_offset {
                    return Err(schema(format!(
                        "bundle {bundle}: block {} at offset {}, expected {}",
                        entry.block, entry.offset, expected_offset
                    )));
                }
                if entry.length == 0 {
                    return Err(schema(format!(
                        "bundle {bundle}: block {} is empty",
                        entry.block
                    )));
                }
                expected_offset += entry.length;
            }
        }

        Ok(())
    }

    /// The stored length of the given bundle (the sum of its entries).
    pub fn bundle_length(&self, bundle: &ContentId) -> Option<u64> {
        self.bundles
            .get(bundle)
            .map(|entries| entries.iter().map(|e| e.length).sum())
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let changelog: Changelog =
            serde_json::from_slice(bytes).context("Couldn't parse changelog JSON")?;
        changelog.check()?;
        Ok(changelog)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        self.check()?;
        let mut out = serde_json::to_vec_pretty(self).context("Couldn't serialize changelog")?;
        out.push(b'\n');
        Ok(out)
    }

    pub fn load(path: &Utf8Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Couldn't read changelog {path}"))?;
        Self::from_json(&bytes).with_context(|| format!("Couldn't load changelog {path}"))
    }

    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        file_util::atomic_write(path, &self.to_json()?)
            .with_context(|| format!("Couldn't save changelog {path}"))
    }
}
