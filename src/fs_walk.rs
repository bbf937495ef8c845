//! Walk a source tree and chunk every file, producing the raw material
//! for a changelog.
//!
//! The walk itself is sequential and sorted (so two runs over the same
//! tree agree byte-for-byte); chunking and hashing fan out across a rayon
//! pool with a mutex-guarded sink collecting results.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{Context, Result, ensure};
use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::*;

use crate::chunk::{self, Block};
use crate::hashing::ContentId;
use crate::progress::Progress;

/// Everything we learned walking a tree.
#[derive(Debug, Default)]
pub struct WalkedTree {
    /// Relative, forward-slash paths to their ordered blocks.
    pub files: BTreeMap<Utf8PathBuf, Vec<ContentId>>,
    /// Every distinct block, holding (a refcount on) its bytes.
    pub blocks: FxHashMap<ContentId, Block>,
    pub total_bytes: u64,
}

/// Walks `root` in sorted order and chunks every regular file.
///
/// Symlinks, devices, and sockets are skipped with a warning; directories
/// exist only as prefixes of the file paths they contain.
pub fn walk_tree(root: &Utf8Path, avg: u32, progress: &Progress) -> Result<WalkedTree> {
    ensure!(root.is_dir(), "{root} isn't a directory");

    let mut relative_paths = Vec::new();
    gather_files(root, Utf8Path::new(""), &mut relative_paths)?;
    debug!("{} files under {root}", relative_paths.len());

    let sink = Mutex::new(WalkedTree::default());

    relative_paths
        .par_iter()
        .try_for_each(|relative| -> Result<()> {
            let absolute = root.join(relative);
            let blocks = chunk::chunk_file(&absolute, avg)?;
            info!("{:>8} {relative}", "hash");
            Progress::bump(&progress.files_hashed);

            let ids: Vec<ContentId> = blocks.iter().map(|b| b.id).collect();
            let file_bytes: u64 = blocks.iter().map(|b| b.len()).sum();

            let mut sink = sink.lock().unwrap();
            for block in blocks {
                sink.blocks.entry(block.id).or_insert(block);
            }
            ensure!(
                sink.files.insert(relative.clone(), ids).is_none(),
                "Walked {relative} twice"
            );
            sink.total_bytes += file_bytes;
            Ok(())
        })?;

    Ok(sink.into_inner().unwrap())
}

/// Collects relative file paths under `dir`, sorted, recursing into
/// subdirectories.
///
/// Paths are built by joining names with `/` so manifests agree across
/// platforms.
fn gather_files(
    dir: &Utf8Path,
    prefix: &Utf8Path,
    out: &mut Vec<Utf8PathBuf>,
) -> Result<()> {
    let mut entries = Vec::new();
    for entry in dir
        .read_dir_utf8()
        .with_context(|| format!("Couldn't read directory {dir}"))?
    {
        let entry = entry.with_context(|| format!("Failed iterating {dir}"))?;
        entries.push((entry.path().to_owned(), entry.file_type()?));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    for (path, file_type) in entries {
        let name = path.file_name().expect("directory entry without a name");
        let relative = if prefix.as_str().is_empty() {
            Utf8PathBuf::from(name)
        } else {
            Utf8PathBuf::from(format!("{prefix}/{name}"))
        };

        if file_type.is_dir() {
            gather_files(&path, &relative, out)?;
        } else if file_type.is_file() {
            out.push(relative);
        } else {
            warn!("Skipping {path}: not a regular file or directory");
        }
    }
    Ok(())
}
