//! Diff two changelogs to find what's genuinely new and what's obsolete.

use std::collections::BTreeSet;

use tracing::*;

use crate::changelog::Changelog;
use crate::hashing::ContentId;

/// What changed between a previous changelog and its successor.
///
/// Obsolete objects are reported, never deleted here; garbage collection
/// is an explicit, separate decision.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub new_blocks: BTreeSet<ContentId>,
    pub new_bundles: BTreeSet<ContentId>,
    pub obsolete_blocks: BTreeSet<ContentId>,
    pub obsolete_bundles: BTreeSet<ContentId>,
}

/// Compares `next` against `previous`. With no previous changelog,
/// everything in `next` is new.
pub fn diff(previous: Option<&Changelog>, next: &Changelog) -> DiffResult {
    let next_blocks: BTreeSet<ContentId> = next.block_index.keys().copied().collect();
    let next_bundles: BTreeSet<ContentId> = next.bundles.keys().copied().collect();

    let result = match previous {
        None => DiffResult {
            new_blocks: next_blocks,
            new_bundles: next_bundles,
            ..Default::default()
        },
        Some(previous) => {
            let prev_blocks: BTreeSet<ContentId> =
                previous.block_index.keys().copied().collect();
            let prev_bundles: BTreeSet<ContentId> = previous.bundles.keys().copied().collect();

            DiffResult {
                new_blocks: next_blocks.difference(&prev_blocks).copied().collect(),
                new_bundles: next_bundles.difference(&prev_bundles).copied().collect(),
                obsolete_blocks: prev_blocks.difference(&next_blocks).copied().collect(),
                obsolete_bundles: prev_bundles.difference(&next_bundles).copied().collect(),
            }
        }
    };

    debug!(
        "{} new blocks, {} new bundles, {} obsolete blocks, {} obsolete bundles",
        result.new_blocks.len(),
        result.new_bundles.len(),
        result.obsolete_blocks.len(),
        result.obsolete_bundles.len()
    );
    result
}

#[cfg(test)]
mod test {
    use super::*;

    use std::collections::BTreeMap;

    use camino::Utf8PathBuf;

    use crate::changelog::BundleEntry;

    fn changelog_of(payloads: &[&[u8]]) -> Changelog {
        let mut files = BTreeMap::new();
        let mut bundles = BTreeMap::new();
        let mut block_index = BTreeMap::new();
        let mut total = 0;

        for (i, payload) in payloads.iter().enumerate() {
            let block = ContentId::hash(payload);
            let bundle = ContentId::hash(payload);
            files.insert(Utf8PathBuf::from(format!("file-{i}")), vec![block]);
            bundles.insert(
                bundle,
                vec![BundleEntry {
                    block,
                    offset: 0,
                    length: payload.len() as u64,
                }],
            );
            block_index.insert(block, bundle);
            total += payload.len() as u64;
        }

        let changelog = Changelog {
            version: 1,
            created_at: "2024-04-01T12:00:00Z".parse().unwrap(),
            block_size: 65536,
            compressed: false,
            dictionary_id: None,
            files,
            bundles,
            block_index,
            total_uncompressed_bytes: total,
        };
        changelog.check().unwrap();
        changelog
    }

    #[test]
    fn no_previous_means_everything_is_new() {
        let next = changelog_of(&[b"one", b"two"]);
        let result = diff(None, &next);
        assert_eq!(result.new_blocks.len(), 2);
        assert_eq!(result.new_bundles.len(), 2);
        assert!(result.obsolete_blocks.is_empty());
        assert!(result.obsolete_bundles.is_empty());
    }

    #[test]
    fn overlap_is_neither_new_nor_obsolete() {
        let previous = changelog_of(&[b"kept", b"dropped"]);
        let next = changelog_of(&[b"kept", b"added"]);

        let result = diff(Some(&previous), &next);
        assert_eq!(result.new_blocks, [ContentId::hash(b"added")].into());
        assert_eq!(result.obsolete_blocks, [ContentId::hash(b"dropped")].into());
        assert_eq!(result.new_bundles, [ContentId::hash(b"added")].into());
        assert_eq!(result.obsolete_bundles, [ContentId::hash(b"dropped")].into());
    }

    #[test]
    fn identical_changelogs_diff_empty() {
        let previous = changelog_of(&[b"one", b"two"]);
        let next = changelog_of(&[b"one", b"two"]);
        assert_eq!(diff(Some(&previous), &next), DiffResult::default());
    }
}
