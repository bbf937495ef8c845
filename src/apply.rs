//! Reconstruct an installation from a changelog.
//!
//! Five strictly ordered phases:
//!
//! 1. **Scan** the installation, chunking what's already there. Files
//!    that match their manifest entry are clean; every other local block
//!    is a candidate byte range to reuse.
//! 2. **Plan** each file as an ordered list of block sources: reuse local
//!    bytes, read the block store, or fetch a bundle.
//! 3. **Acquire** missing bundles concurrently, slice them into blocks,
//!    verify every block against its ID, and land it in the local block
//!    store. Nothing unverified ever reaches a target file.
//! 4. **Materialise** every dirty file to a temporary neighbor, fsync,
//!    and rename. No target path is ever observable half-written, and
//!    donor files stay readable until every temp file is complete.
//! 5. **Prune** files the changelog doesn't know, then empty directories.
//!
//! Rerunning after an interruption is cheap: the scan rediscovers
//! everything already materialised and the block store keeps everything
//! already fetched.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, ensure};
use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tokio::task::JoinSet;
use tracing::*;

use crate::changelog::{BundleEntry, Changelog};
use crate::dictionary::Codec;
use crate::error::PatchError;
use crate::fetch::{self, Fetcher};
use crate::file_util;
use crate::fs_walk;
use crate::hashing::ContentId;
use crate::patch_data::{self, PatchData};
use crate::progress::Progress;

/// A byte range in an existing local file that hashes to a wanted block.
#[derive(Debug, Clone)]
struct LocalRange {
    path: Utf8PathBuf,
    offset: u64,
    length: u64,
}

/// Where one block of a planned file will come from.
#[derive(Debug, Clone)]
enum BlockSource {
    /// Reuse bytes already sitting in the installation.
    Local(LocalRange),
    /// Read the (stored-form) block from the local block store.
    Store,
    /// The block arrives inside this bundle during acquisition,
    /// after which it's in the block store like any other.
    Bundle(ContentId),
}

#[derive(Debug, Default)]
struct Plan {
    /// Files whose bytes already match the changelog. Untouched.
    clean: BTreeSet<Utf8PathBuf>,
    /// Everything else, with a source per block.
    dirty: BTreeMap<Utf8PathBuf, Vec<(ContentId, BlockSource)>>,
    /// Bundles acquisition has to produce.
    needed_bundles: BTreeSet<ContentId>,
}

pub struct ApplyOptions {
    pub attempts: u32,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            attempts: fetch::DEFAULT_ATTEMPTS,
        }
    }
}

/// Applies `changelog` to `install`, fetching missing bundles from
/// `fetcher` (if given) into `patch`'s block store.
///
/// With no fetcher, every missing block must already be in `patch`
/// (the local patch data directory), or apply fails.
pub async fn apply(
    changelog: &Changelog,
    install: &Utf8Path,
    patch: &PatchData,
    fetcher: Option<Arc<Fetcher>>,
    codec: Option<Arc<Codec>>,
    options: &ApplyOptions,
    progress: &Progress,
) -> Result<()> {
    ensure!(
        changelog.compressed == codec.is_some(),
        "Compressed changelog needs a codec and vice versa"
    );

    std::fs::create_dir_all(install).with_context(|| format!("Couldn't create {install}"))?;

    info!("Scanning {install} for reusable blocks");
    let (clean, local) = scan(install, changelog, progress)?;

    let plan = make_plan(changelog, patch, clean, local)?;
    info!(
        "{} files clean, {} to write, {} bundles to acquire",
        plan.clean.len(),
        plan.dirty.len(),
        plan.needed_bundles.len()
    );

    acquire(
        changelog,
        patch,
        fetcher,
        &codec,
        &plan.needed_bundles,
        options,
        progress,
    )
    .await?;

    materialise(install, patch, &codec, &plan, progress)?;

    prune(install, changelog, progress)?;

    Ok(())
}

/// Chunks every existing file, recording which manifest blocks are already
/// present locally and which files are entirely clean.
fn scan(
    install: &Utf8Path,
    changelog: &Changelog,
    progress: &Progress,
) -> Result<(BTreeSet<Utf8PathBuf>, FxHashMap<ContentId, LocalRange>)> {
    let walked = fs_walk::walk_tree(install, changelog.block_size, progress)?;

    let mut clean = BTreeSet::new();
    let mut local: FxHashMap<ContentId, LocalRange> = FxHashMap::default();

    for (relative, ids) in &walked.files {
        if changelog.files.get(relative) == Some(ids) {
            trace!("{relative} is clean");
            clean.insert(relative.clone());
        }

        // Any local block the changelog wants is a donor, even from files
        // that moved or changed; record where its bytes live.
        let mut offset = 0u64;
        for id in ids {
            let length = walked.blocks[id].len();
            if changelog.block_index.contains_key(id) {
                local.entry(*id).or_insert_with(|| LocalRange {
                    path: install.join(relative),
                    offset,
                    length,
                });
            }
            offset += length;
        }
    }

    Ok((clean, local))
}

fn make_plan(
    changelog: &Changelog,
    patch: &PatchData,
    clean: BTreeSet<Utf8PathBuf>,
    local: FxHashMap<ContentId, LocalRange>,
) -> Result<Plan> {
    let mut plan = Plan {
        clean,
        ..Default::default()
    };

    for (relative, ids) in &changelog.files {
        if plan.clean.contains(relative) {
            continue;
        }
        let mut sources = Vec::with_capacity(ids.len());
        for id in ids {
            let source = if let Some(range) = local.get(id) {
                BlockSource::Local(range.clone())
            } else if patch.has_block(id) {
                BlockSource::Store
            } else {
                let bundle = changelog
                    .block_index
                    .get(id)
                    .ok_or_else(|| anyhow!(PatchError::Input(format!(
                        "changelog references unindexed block {id}"
                    ))))?;
                plan.needed_bundles.insert(*bundle);
                BlockSource::Bundle(*bundle)
            };
            sources.push((*id, source));
        }
        plan.dirty.insert(relative.clone(), sources);
    }

    Ok(plan)
}

/// Fetches (or reads) every needed bundle, slices it, verifies each
/// block, and lands the stored form in the block store.
async fn acquire(
    changelog: &Changelog,
    patch: &PatchData,
    fetcher: Option<Arc<Fetcher>>,
    codec: &Option<Arc<Codec>>,
    needed: &BTreeSet<ContentId>,
    options: &ApplyOptions,
    progress: &Progress,
) -> Result<()> {
    if needed.is_empty() {
        return Ok(());
    }

    let Some(fetcher) = fetcher else {
        // Local-only apply: bundles must be sitting in the patch data
        // directory. No retries; local corruption doesn't get better.
        for bundle_id in needed {
            let entries = bundle_entries(changelog, bundle_id)?;
            let bytes = patch.get_bundle(bundle_id)?;
            slice_and_store(&bytes, bundle_id, &entries, codec.as_deref(), patch)
                .with_context(|| format!("Local bundle {bundle_id} is corrupt"))?;
            Progress::bump(&progress.bundles_fetched);
        }
        return Ok(());
    };

    let mut tasks = JoinSet::new();
    for bundle_id in needed {
        let bundle_id = *bundle_id;
        let entries = bundle_entries(changelog, &bundle_id)?;
        let patch = patch.clone();
        let codec = codec.clone();
        let attempts = options.attempts;
        let fetcher = fetcher.clone();

        tasks.spawn(async move {
            acquire_one(&bundle_id, entries, &fetcher, codec, patch, attempts).await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let fetched: u64 = joined.expect("acquire task panicked")?;
        Progress::bump(&progress.bundles_fetched);
        Progress::add(&progress.bytes_fetched, fetched);
    }
    Ok(())
}

fn bundle_entries(changelog: &Changelog, bundle_id: &ContentId) -> Result<Vec<BundleEntry>> {
    changelog
        .bundles
        .get(bundle_id)
        .cloned()
        .ok_or_else(|| {
            anyhow!(PatchError::Input(format!(
                "changelog references unknown bundle {bundle_id}"
            )))
        })
}

/// Fetch-slice-verify-store for one bundle, with bounded retries.
///
/// A failed attempt throws away the whole download: partial trust in a
/// mangled bundle isn't worth the bookkeeping.
async fn acquire_one(
    bundle_id: &ContentId,
    entries: Vec<BundleEntry>,
    fetcher: &Fetcher,
    codec: Option<Arc<Codec>>,
    patch: PatchData,
    attempts: u32,
) -> Result<u64> {
    let key = patch_data::bundle_key(bundle_id);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome: Result<u64, PatchError> = async {
            let bytes = fetcher.fetch(&key).await?;
            let fetched = bytes.len() as u64;

            // Slicing, decompression, and hashing are CPU work; keep them
            // off the I/O loop.
            let bundle_id = *bundle_id;
            let entries = entries.clone();
            let codec = codec.clone();
            let patch = patch.clone();
            tokio::task::spawn_blocking(move || {
                slice_and_store(&bytes, &bundle_id, &entries, codec.as_deref(), &patch)
            })
            .await
            .expect("bundle verification panicked")?;

            Ok(fetched)
        }
        .await;

        match outcome {
            Ok(fetched) => return Ok(fetched),
            Err(e) if e.retryable() && attempt < attempts => {
                warn!("bundle {}: {e} (attempt {attempt}/{attempts})", bundle_id.short_name());
                tokio::time::sleep(fetch::backoff(attempt)).await;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Couldn't acquire bundle {bundle_id} after {attempt} attempts")
                });
            }
        }
    }
}

/// Slices a bundle per its manifest entries, verifies every block's hash
/// (after decompression), and stores the stored-form blocks.
fn slice_and_store(
    bytes: &[u8],
    bundle_id: &ContentId,
    entries: &[BundleEntry],
    codec: Option<&Codec>,
    patch: &PatchData,
) -> Result<(), PatchError> {
    let expected_len: u64 = entries.iter().map(|e| e.length).sum();
    if bytes.len() as u64 != expected_len {
        return Err(PatchError::Integrity(format!(
            "bundle {bundle_id} is {} bytes, changelog says {expected_len}",
            bytes.len()
        )));
    }

    for entry in entries {
        let start = entry.offset as usize;
        let end = start
            .checked_add(entry.length as usize)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| {
                PatchError::Integrity(format!(
                    "bundle {bundle_id}: block {} slice [{}, +{}) is out of range",
                    entry.block, entry.offset, entry.length
                ))
            })?;
        let stored = &bytes[start..end];

        let payload = match codec {
            Some(codec) => codec.decompress(stored).map_err(|e| {
                PatchError::Integrity(format!(
                    "bundle {bundle_id}: block {} didn't decompress: {e}",
                    entry.block
                ))
            })?,
            None => stored.to_vec(),
        };

        let hash = ContentId::hash(&payload);
        if hash != entry.block {
            return Err(PatchError::Integrity(format!(
                "bundle {bundle_id}: block hashed to {hash}, expected {}",
                entry.block
            )));
        }

        patch
            .put_block(&entry.block, stored)
            .map_err(|e| PatchError::Storage(format!("Couldn't store block {}: {e}", entry.block)))?;
    }
    Ok(())
}

/// Writes every dirty file to a temporary neighbor, then renames them all.
///
/// The write and rename passes are separate on purpose: a file being
/// rewritten can donate byte ranges to *other* files, so no target may be
/// replaced until every temp file has been assembled.
fn materialise(
    install: &Utf8Path,
    patch: &PatchData,
    codec: &Option<Arc<Codec>>,
    plan: &Plan,
    progress: &Progress,
) -> Result<()> {
    Progress::add(&progress.files_clean, plan.clean.len() as u64);

    // Make room first: manifest directories win over colliding files.
    for relative in plan.dirty.keys() {
        clear_colliding_files(install, relative)?;
    }

    let staged: Vec<(tempfile::NamedTempFile, Utf8PathBuf)> = plan
        .dirty
        .par_iter()
        .map(|(relative, sources)| -> Result<_> {
            let target = install.join(relative);
            if target.is_dir() {
                warn!("Removing directory {target}: the patch puts a file there");
                std::fs::remove_dir_all(&target)
                    .with_context(|| format!("Couldn't remove {target}"))?;
            }
            let dir = target.parent().expect("target has no parent");
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Couldn't create {dir}"))?;

            let mut temp = tempfile::Builder::new()
                .suffix(".part")
                .tempfile_in(dir)
                .with_context(|| format!("Couldn't open a temporary file for {target}"))?;

            let mut written = 0u64;
            for (id, source) in sources {
                let payload = read_source(id, source, patch, codec.as_deref())
                    .with_context(|| format!("Couldn't assemble {relative}"))?;
                temp.write_all(&payload)
                    .with_context(|| format!("Couldn't write {target}"))?;
                written += payload.len() as u64;

                if matches!(source, BlockSource::Local(_)) {
                    Progress::bump(&progress.blocks_reused);
                }
            }

            temp.as_file()
                .sync_all()
                .with_context(|| format!("Couldn't sync {target}"))?;

            info!("{:>8} {relative}", "write");
            Progress::bump(&progress.files_written);
            Progress::add(&progress.bytes_written, written);
            Ok((temp, target))
        })
        .collect::<Result<_>>()?;

    // Everything assembled and synced; flip the names.
    for (temp, target) in staged {
        temp.persist(&target)
            .with_context(|| format!("Couldn't rename into {target}"))?;
    }
    Ok(())
}

/// Produces the uncompressed payload for one planned block.
fn read_source(
    id: &ContentId,
    source: &BlockSource,
    patch: &PatchData,
    codec: Option<&Codec>,
) -> Result<Vec<u8>> {
    match source {
        BlockSource::Local(range) => {
            // Scanned and hashed earlier this run; just reread the range.
            file_util::read_range(&range.path, range.offset, range.length)
        }
        BlockSource::Store | BlockSource::Bundle(_) => {
            // Bundle-sourced blocks landed in the store during acquisition.
            let stored = patch.get_block(id)?;
            let payload = match codec {
                Some(codec) => codec.decompress(&stored)?,
                None => stored,
            };
            let hash = ContentId::hash(&payload);
            ensure!(
                hash == *id,
                PatchError::Integrity(format!("stored block hashed to {hash}, expected {id}"))
            );
            Ok(payload)
        }
    }
}

/// Removes any ancestor of `relative` that exists as a regular file,
/// so the directories the changelog implies can be created.
fn clear_colliding_files(install: &Utf8Path, relative: &Utf8Path) -> Result<()> {
    let mut dir = Utf8PathBuf::from(install);
    let Some(parent) = relative.parent() else {
        return Ok(());
    };
    for component in parent.components() {
        dir.push(component);
        if dir.is_file() {
            warn!("Removing {dir}: it collides with a patch directory");
            std::fs::remove_file(&dir).with_context(|| format!("Couldn't remove {dir}"))?;
            break;
        }
    }
    Ok(())
}

/// Deletes files the changelog doesn't mention, then any directories left
/// empty. Runs strictly after every file has been materialised.
fn prune(install: &Utf8Path, changelog: &Changelog, progress: &Progress) -> Result<()> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    gather_everything(install, Utf8Path::new(""), &mut files, &mut dirs)?;

    for relative in files {
        if !changelog.files.contains_key(&relative) {
            let absolute = install.join(&relative);
            info!("{:>8} {relative}", "prune");
            std::fs::remove_file(&absolute)
                .with_context(|| format!("Couldn't remove {absolute}"))?;
            Progress::bump(&progress.files_pruned);
        }
    }

    // Deepest first, so child directories empty out their parents.
    dirs.sort_by_key(|d: &Utf8PathBuf| std::cmp::Reverse(d.as_str().len()));
    for relative in dirs {
        let absolute = install.join(&relative);
        if absolute
            .read_dir_utf8()
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false)
        {
            debug!("Removing empty directory {relative}");
            std::fs::remove_dir(&absolute)
                .with_context(|| format!("Couldn't remove {absolute}"))?;
        }
    }
    Ok(())
}

fn gather_everything(
    dir: &Utf8Path,
    prefix: &Utf8Path,
    files: &mut Vec<Utf8PathBuf>,
    dirs: &mut Vec<Utf8PathBuf>,
) -> Result<()> {
    for entry in dir
        .read_dir_utf8()
        .with_context(|| format!("Couldn't read directory {dir}"))?
    {
        let entry = entry.with_context(|| format!("Failed iterating {dir}"))?;
        let name = entry.path().file_name().expect("entry without a name");
        let relative = if prefix.as_str().is_empty() {
            Utf8PathBuf::from(name)
        } else {
            Utf8PathBuf::from(format!("{prefix}/{name}"))
        };

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            dirs.push(relative.clone());
            gather_everything(entry.path(), &relative, files, dirs)?;
        } else {
            files.push(relative);
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    use std::fs;
    use std::sync::atomic::Ordering;

    use crate::bundle::{self, Assignments};

    const AVG: u32 = 1024;

    fn utf8(path: &std::path::Path) -> Utf8PathBuf {
        Utf8Path::from_path(path).unwrap().to_owned()
    }

    /// Build patch data + changelog for whatever's in `source`.
    fn create_patch(source: &Utf8Path, patch_root: &Utf8Path) -> Result<Changelog> {
        let patch = PatchData::create(patch_root)?;
        let walked = fs_walk::walk_tree(source, AVG, &Progress::default())?;

        let mut assignments = Assignments::default();
        bundle::pack_new(&walked.files, &walked.blocks, None, &patch, &mut assignments)?;

        let changelog = Changelog {
            version: 1,
            created_at: "2024-04-01T12:00:00Z".parse().unwrap(),
            block_size: AVG,
            compressed: false,
            dictionary_id: None,
            files: walked.files,
            bundles: assignments.bundles,
            block_index: assignments.block_index,
            total_uncompressed_bytes: walked.total_bytes,
        };
        changelog.check()?;
        patch.save_changelog(&changelog)?;
        Ok(changelog)
    }

    fn scribble(len: usize, mut seed: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            out.extend_from_slice(&seed.to_le_bytes());
        }
        out.truncate(len);
        out
    }

    #[tokio::test]
    async fn local_apply_round_trips() -> Result<()> {
        let source_dir = tempfile::tempdir()?;
        let patch_dir = tempfile::tempdir()?;
        let install_dir = tempfile::tempdir()?;
        let source = utf8(source_dir.path());
        let install = utf8(install_dir.path());

        fs::create_dir_all(source.join("sub"))?;
        fs::write(source.join("a.txt"), b"hello")?;
        fs::write(source.join("sub/b.bin"), scribble(10 * 1024, 9))?;
        fs::write(source.join("empty"), b"")?;

        let changelog = create_patch(&source, &utf8(patch_dir.path()))?;
        let patch = PatchData::open(&utf8(patch_dir.path()))?;

        apply(
            &changelog,
            &install,
            &patch,
            None,
            None,
            &ApplyOptions::default(),
            &Progress::default(),
        )
        .await?;

        assert_eq!(fs::read(install.join("a.txt"))?, b"hello");
        assert_eq!(fs::read(install.join("sub/b.bin"))?, scribble(10 * 1024, 9));
        assert_eq!(fs::read(install.join("empty"))?, b"");
        Ok(())
    }

    #[tokio::test]
    async fn second_apply_writes_nothing_and_prunes_strays() -> Result<()> {
        let source_dir = tempfile::tempdir()?;
        let patch_dir = tempfile::tempdir()?;
        let install_dir = tempfile::tempdir()?;
        let source = utf8(source_dir.path());
        let install = utf8(install_dir.path());

        fs::write(source.join("keep.bin"), scribble(8 * 1024, 3))?;
        let changelog = create_patch(&source, &utf8(patch_dir.path()))?;
        let patch = PatchData::open(&utf8(patch_dir.path()))?;

        apply(
            &changelog,
            &install,
            &patch,
            None,
            None,
            &ApplyOptions::default(),
            &Progress::default(),
        )
        .await?;

        // Drop in a stray and an empty stray directory.
        fs::create_dir_all(install.join("stray-dir"))?;
        fs::write(install.join("stray-dir/stray.txt"), b"shouldn't be here")?;

        let progress = Progress::default();
        apply(
            &changelog,
            &install,
            &patch,
            None,
            None,
            &ApplyOptions::default(),
            &progress,
        )
        .await?;

        assert_eq!(progress.files_written.load(Ordering::Relaxed), 0);
        assert_eq!(progress.files_clean.load(Ordering::Relaxed), 1);
        assert_eq!(progress.files_pruned.load(Ordering::Relaxed), 1);
        assert!(!install.join("stray-dir").exists());
        assert!(install.join("keep.bin").exists());
        Ok(())
    }

    #[tokio::test]
    async fn local_blocks_are_reused_for_renames() -> Result<()> {
        let source_dir = tempfile::tempdir()?;
        let patch_dir = tempfile::tempdir()?;
        let install_dir = tempfile::tempdir()?;
        let source = utf8(source_dir.path());
        let install = utf8(install_dir.path());

        let payload = scribble(16 * 1024, 77);
        fs::write(source.join("new-name.bin"), &payload)?;
        let changelog = create_patch(&source, &utf8(patch_dir.path()))?;

        // The installation has the same bytes under the old name, and an
        // *empty* patch data directory: every block must come from local
        // reuse.
        fs::write(install.join("old-name.bin"), &payload)?;
        let empty_patch_dir = tempfile::tempdir()?;
        let patch = PatchData::create(&utf8(empty_patch_dir.path()))?;

        let progress = Progress::default();
        apply(
            &changelog,
            &install,
            &patch,
            None,
            None,
            &ApplyOptions::default(),
            &progress,
        )
        .await?;

        assert_eq!(fs::read(install.join("new-name.bin"))?, payload);
        assert!(!install.join("old-name.bin").exists());
        assert!(progress.blocks_reused.load(Ordering::Relaxed) > 0);
        Ok(())
    }

    #[tokio::test]
    async fn collision_with_manifest_directory_is_cleared() -> Result<()> {
        let source_dir = tempfile::tempdir()?;
        let patch_dir = tempfile::tempdir()?;
        let install_dir = tempfile::tempdir()?;
        let source = utf8(source_dir.path());
        let install = utf8(install_dir.path());

        fs::create_dir_all(source.join("dir"))?;
        fs::write(source.join("dir/file.txt"), b"nested")?;
        let changelog = create_patch(&source, &utf8(patch_dir.path()))?;
        let patch = PatchData::open(&utf8(patch_dir.path()))?;

        // "dir" exists as a file in the installation.
        fs::write(install.join("dir"), b"in the way")?;

        apply(
            &changelog,
            &install,
            &patch,
            None,
            None,
            &ApplyOptions::default(),
            &Progress::default(),
        )
        .await?;

        assert_eq!(fs::read(install.join("dir/file.txt"))?, b"nested");
        Ok(())
    }

    #[test]
    fn slice_and_store_rejects_bad_bytes() -> Result<()> {
        let patch_dir = tempfile::tempdir()?;
        let patch = PatchData::create(&utf8(patch_dir.path()))?;

        let payload = b"some block payload";
        let block = ContentId::hash(payload);
        let bundle_id = ContentId::hash(payload);
        let entries = vec![BundleEntry {
            block,
            offset: 0,
            length: payload.len() as u64,
        }];

        // Correct bytes land.
        slice_and_store(payload, &bundle_id, &entries, None, &patch).unwrap();
        assert!(patch.has_block(&block));

        // Wrong length.
        assert!(matches!(
            slice_and_store(b"short", &bundle_id, &entries, None, &patch),
            Err(PatchError::Integrity(_))
        ));

        // Right length, wrong bytes.
        let mut mangled = payload.to_vec();
        mangled[3] ^= 0xff;
        let fresh_dir = tempfile::tempdir()?;
        let fresh = PatchData::create(&utf8(fresh_dir.path()))?;
        assert!(matches!(
            slice_and_store(&mangled, &bundle_id, &entries, None, &fresh),
            Err(PatchError::Integrity(_))
        ));
        assert!(!fresh.has_block(&block));
        Ok(())
    }
}
