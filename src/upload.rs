//! Push patch data to an object store.
//!
//! Everything but the changelog is content-addressed and immutable, so
//! the plan is simple: list what the store already has, upload what it
//! doesn't, and finish with the changelog (plus a CDN purge for it).
//! Uploading the changelog last means a reader never sees a changelog
//! whose blocks and bundles aren't all in place yet.

use anyhow::{Context, Result, ensure};
use rustc_hash::FxHashSet;
use tracing::*;

use crate::changelog::CHANGELOG_NAME;
use crate::patch_data::{self, DICTIONARY_NAME, PatchData};
use crate::progress::Progress;
use crate::store::ObjectStore;

/// Uploads new objects from `patch` to `store`.
///
/// With `all`, skips the remote listing and re-puts everything; useful
/// when the listing is suspect or a previous upload half-finished in
/// some surprising way.
pub async fn upload(
    patch: &PatchData,
    store: &dyn ObjectStore,
    all: bool,
    progress: &Progress,
) -> Result<()> {
    // The changelog is what readers trust; make sure it's coherent
    // before shipping anything.
    let changelog = patch.load_changelog()?;

    let existing: FxHashSet<String> = if all {
        FxHashSet::default()
    } else {
        store.list("").await?.into_iter().collect()
    };
    debug!("{} objects already in the store", existing.len());

    let mut keys: Vec<String> = patch
        .iter_blocks()?
        .iter()
        .map(patch_data::block_key)
        .collect();
    keys.extend(patch.iter_bundles()?.iter().map(patch_data::bundle_key));
    if changelog.compressed {
        ensure!(
            patch.dictionary_path().is_file(),
            "Changelog is compressed but {} has no dictionary",
            patch.root()
        );
        keys.push(DICTIONARY_NAME.to_owned());
    }

    for key in keys {
        if existing.contains(&key) {
            trace!("{key} already uploaded");
            continue;
        }
        let bytes = std::fs::read(patch.root().join(&key))
            .with_context(|| format!("Couldn't read {key}"))?;
        info!("{:>8} {key}", "upload");
        store.put(&key, &bytes).await?;
        Progress::bump(&progress.objects_uploaded);
    }

    // And now the part the world actually watches.
    store
        .put(CHANGELOG_NAME, &changelog.to_json()?)
        .await
        .context("Couldn't upload the changelog")?;
    Progress::bump(&progress.objects_uploaded);
    store.purge_cache(CHANGELOG_NAME).await?;

    info!(
        "Published version {} ({} files)",
        changelog.version,
        changelog.files.len()
    );
    Ok(())
}
