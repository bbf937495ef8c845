//! Confirm an installation matches a changelog, byte for byte.

use anyhow::Result;
use camino::Utf8Path;
use tracing::*;

use crate::changelog::Changelog;
use crate::fs_walk;
use crate::progress::Progress;

/// Rechunks every file under `install` and compares against `changelog`.
///
/// True iff every manifest file is present with exactly its listed
/// blocks, and nothing else is in the tree. Never mutates anything.
pub fn validate(changelog: &Changelog, install: &Utf8Path, progress: &Progress) -> Result<bool> {
    let walked = fs_walk::walk_tree(install, changelog.block_size, progress)?;

    let mut ok = true;

    for (relative, expected) in &changelog.files {
        match walked.files.get(relative) {
            None => {
                info!("{relative}: missing");
                ok = false;
            }
            Some(actual) if actual != expected => {
                info!("{relative}: contents differ");
                ok = false;
            }
            Some(_) => trace!("{relative}: ok"),
        }
    }

    for relative in walked.files.keys() {
        if !changelog.files.contains_key(relative) {
            info!("{relative}: not in the changelog");
            ok = false;
        }
    }

    Ok(ok)
}
