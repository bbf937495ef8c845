//! Group blocks into bundles: one remote object per bundle instead of
//! one request per block.
//!
//! Packing rules:
//!
//! - A file's blocks sit contiguously in one bundle, in file order,
//!   unless the size cap forces a split.
//! - A block keeps the bundle it was assigned in the previous changelog.
//!   Bundles already on the CDN are immutable; repacking a reused block
//!   would invalidate caches for bytes that never changed.
//! - A block appears in at most one bundle; the first file to mention a
//!   shared block wins.
//!
//! Bundle IDs hash the concatenated *uncompressed* payloads, so an ID is
//! stable for stable membership no matter how the bytes are stored.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::*;

use crate::changelog::{BundleEntry, Changelog};
use crate::chunk::Block;
use crate::dictionary::Codec;
use crate::hashing::{ContentId, IdHasher};
use crate::patch_data::PatchData;

/// How much uncompressed payload a bundle may carry.
pub const BUNDLE_CAP: u64 = 16 * 1024 * 1024;

/// Bundle assignments for a changelog in the making.
#[derive(Debug, Default)]
pub struct Assignments {
    pub bundles: BTreeMap<ContentId, Vec<BundleEntry>>,
    pub block_index: BTreeMap<ContentId, ContentId>,
}

/// Carries forward every previous bundle that still has a referenced block.
///
/// Carried bundles keep their membership lists verbatim - the stored
/// object doesn't change, so neither may its description. Only valid when
/// the stored form is unchanged too (same compression, same dictionary);
/// the caller checks that before offering `previous`.
pub fn carry_previous(
    previous: &Changelog,
    referenced: &FxHashSet<ContentId>,
) -> Assignments {
    let mut carried = Assignments::default();

    for (bundle_id, entries) in &previous.bundles {
        let keeps_any = entries.iter().any(|e| referenced.contains(&e.block));
        if !keeps_any {
            trace!("bundle {} no longer referenced", bundle_id.short_name());
            continue;
        }
        carried.bundles.insert(*bundle_id, entries.clone());
        for entry in entries {
            if referenced.contains(&entry.block) {
                carried.block_index.insert(entry.block, *bundle_id);
            }
        }
    }

    debug!(
        "Carried {} of {} previous bundles",
        carried.bundles.len(),
        previous.bundles.len()
    );
    carried
}

/// Packs every not-yet-assigned block into new bundles, writes the bundle
/// files and their blocks into the patch data directory, and extends
/// `assignments` with the results.
///
/// `files` drives the grouping (file order, sorted paths); `blocks` holds
/// the actual bytes for every block that might need packing.
pub fn pack_new(
    files: &BTreeMap<Utf8PathBuf, Vec<ContentId>>,
    blocks: &FxHashMap<ContentId, Block>,
    codec: Option<&Codec>,
    patch: &PatchData,
    assignments: &mut Assignments,
) -> Result<()> {
    // Group first so each bundle's membership is settled before we touch
    // any bytes.
    let mut groups: Vec<Vec<ContentId>> = Vec::new();
    let mut open_group: Vec<ContentId> = Vec::new();
    let mut open_size: u64 = 0;
    let mut grouped = FxHashSet::default();

    for (path, file_blocks) in files {
        for id in file_blocks {
            if assignments.block_index.contains_key(id) || grouped.contains(id) {
                continue;
            }
            let block = blocks
                .get(id)
                .with_context(|| format!("{path} references block {id} with no bytes on hand"))?;

            if open_size + block.len() > BUNDLE_CAP && !open_group.is_empty() {
                groups.push(std::mem::take(&mut open_group));
                open_size = 0;
            }
            open_group.push(*id);
            open_size += block.len();
            grouped.insert(*id);
        }
    }
    if !open_group.is_empty() {
        groups.push(open_group);
    }

    debug!("Packing {} new bundles", groups.len());

    // Compress and write the bundles themselves in parallel; the group
    // step above already fixed the membership and order of each.
    let packed: Vec<(ContentId, Vec<BundleEntry>)> = groups
        .par_iter()
        .map(|group| pack_one(group, blocks, codec, patch))
        .collect::<Result<_>>()?;

    for (bundle_id, entries) in packed {
        for entry in &entries {
            assignments.block_index.insert(entry.block, bundle_id);
        }
        if assignments.bundles.insert(bundle_id, entries).is_some() {
            bail!("Duplicate bundle {bundle_id} packed");
        }
    }
    Ok(())
}

fn pack_one(
    group: &[ContentId],
    blocks: &FxHashMap<ContentId, Block>,
    codec: Option<&Codec>,
    patch: &PatchData,
) -> Result<(ContentId, Vec<BundleEntry>)> {
    let mut payload_hash = IdHasher::new();
    let mut stored = Vec::new();
    let mut entries = Vec::with_capacity(group.len());

    for id in group {
        let block = blocks.get(id).expect("grouped block lost its bytes");
        payload_hash.update(block.bytes());

        let stored_bytes = match codec {
            Some(codec) => codec
                .compress(block.bytes())
                .with_context(|| format!("Couldn't compress block {id}"))?,
            None => block.bytes().to_vec(),
        };

        entries.push(BundleEntry {
            block: *id,
            offset: stored.len() as u64,
            length: stored_bytes.len() as u64,
        });

        patch
            .put_block(id, &stored_bytes)
            .with_context(|| format!("Couldn't store block {id}"))?;
        stored.extend_from_slice(&stored_bytes);
    }

    let bundle_id = payload_hash.finalize();
    patch
        .put_bundle(&bundle_id, &stored)
        .with_context(|| format!("Couldn't store bundle {bundle_id}"))?;

    trace!(
        "bundle {}: {} blocks, {} stored bytes",
        bundle_id.short_name(),
        entries.len(),
        stored.len()
    );
    Ok((bundle_id, entries))
}
