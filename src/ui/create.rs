use anyhow::{Context, Result, bail, ensure};
use camino::Utf8PathBuf;
use clap::Parser;
use rustc_hash::FxHashSet;
use tracing::*;

use crate::DEFAULT_BLOCK_SIZE;
use crate::bundle::{self, Assignments};
use crate::changelog::Changelog;
use crate::dictionary::{self, Codec, Dictionary};
use crate::diff;
use crate::error::PatchError;
use crate::fetch::Fetcher;
use crate::fs_walk;
use crate::hashing::ContentId;
use crate::patch_data::{DICTIONARY_NAME, PatchData};
use crate::progress::Progress;

/// Produce a patch data directory (changelog, blocks, bundles, and an
/// optional dictionary) describing the given tree.
#[derive(Debug, Parser)]
pub struct Args {
    /// The tree to snapshot
    source: Utf8PathBuf,

    /// Average block size in bytes
    #[clap(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: u32,

    /// Compress blocks with a trained Zstd dictionary
    #[clap(long)]
    compress: bool,

    /// Zstd compression level
    #[clap(long, default_value_t = dictionary::DEFAULT_LEVEL)]
    compression_level: i32,

    /// Use this dictionary file instead of training or reusing one
    #[clap(long, name = "file")]
    dict_path: Option<Utf8PathBuf>,

    /// Retrain the dictionary even if the previous changelog has one
    #[clap(long)]
    regen_dict: bool,

    /// Where to write the patch data
    #[clap(short, long, default_value = "patch-data")]
    output: Utf8PathBuf,

    /// Previous patch data (a local path or an http(s) URL) to diff
    /// against; unchanged blocks keep their bundles
    #[clap(long, name = "path-or-url")]
    patch_data: Option<String>,
}

pub fn run(args: Args) -> Result<()> {
    ensure!(args.block_size >= 256, "Block size must be at least 256");
    ensure!(
        args.block_size <= 64 * 1024 * 1024,
        "Block size must be at most 64 MiB"
    );
    ensure!(
        args.source.is_dir(),
        PatchError::Input(format!("{} isn't a directory", args.source))
    );
    if let (Ok(source), Ok(output)) = (
        args.source.canonicalize_utf8(),
        args.output.canonicalize_utf8(),
    ) {
        ensure!(
            !output.starts_with(&source),
            PatchError::Config(format!(
                "--output {} is inside the source tree; it would end up in the patch",
                args.output
            ))
        );
    }

    let previous = load_previous(args.patch_data.as_deref())?;
    let progress = Progress::default();

    info!("Hashing {}", args.source);
    let walked = fs_walk::walk_tree(&args.source, args.block_size, &progress)?;

    let codec = if args.compress {
        build_codec(&args, &walked, previous.as_ref())?
    } else {
        None
    };
    let compressed = codec.is_some();
    let dictionary_id = codec.as_ref().map(Codec::dictionary_id);

    let patch = PatchData::create(&args.output)?;
    if let Some(codec) = &codec {
        patch.save_dictionary(codec.dictionary_bytes())?;
    }

    // Unchanged blocks keep their old bundles, but only while the stored
    // form is byte-identical: same compression, same dictionary.
    let referenced: FxHashSet<ContentId> =
        walked.files.values().flatten().copied().collect();
    let mut assignments = Assignments::default();
    if let Some((previous, _)) = &previous {
        if previous.compressed == compressed && previous.dictionary_id == dictionary_id {
            assignments = bundle::carry_previous(previous, &referenced);
        } else {
            info!("Compression settings changed; repacking every bundle");
        }
    }

    bundle::pack_new(
        &walked.files,
        &walked.blocks,
        codec.as_ref(),
        &patch,
        &mut assignments,
    )?;

    let changelog = Changelog {
        version: previous.as_ref().map(|(p, _)| p.version + 1).unwrap_or(1),
        created_at: jiff::Timestamp::now(),
        block_size: args.block_size,
        compressed,
        dictionary_id,
        files: walked.files,
        bundles: assignments.bundles,
        block_index: assignments.block_index,
        total_uncompressed_bytes: walked.total_bytes,
    };
    changelog.check()?;
    patch.save_changelog(&changelog)?;

    let changes = diff::diff(previous.as_ref().map(|(p, _)| p), &changelog);
    println!(
        "Version {}: {} files, {} new blocks in {} new bundles",
        changelog.version,
        changelog.files.len(),
        changes.new_blocks.len(),
        changes.new_bundles.len(),
    );
    if !changes.obsolete_bundles.is_empty() {
        println!(
            "{} blocks and {} bundles are no longer referenced",
            changes.obsolete_blocks.len(),
            changes.obsolete_bundles.len(),
        );
    }
    print!("{}", progress.summary());
    Ok(())
}

type PreviousPatch = (Changelog, Option<Vec<u8>>);

/// Loads the previous changelog (and its dictionary, if any) from a local
/// directory or a remote base URL.
fn load_previous(patch_data: Option<&str>) -> Result<Option<PreviousPatch>> {
    let Some(location) = patch_data else {
        return Ok(None);
    };

    if location.starts_with("http://") || location.starts_with("https://") {
        let runtime = tokio::runtime::Runtime::new()?;
        return runtime.block_on(async {
            let fetcher = Fetcher::new(location)?;
            let changelog = fetcher.fetch_changelog().await?;
            let dictionary = if changelog.compressed {
                Some(fetcher.fetch_with_retry(DICTIONARY_NAME).await?)
            } else {
                None
            };
            Ok(Some((changelog, dictionary)))
        });
    }

    let root = Utf8PathBuf::from(location);
    if !root.is_dir() || !root.join(crate::changelog::CHANGELOG_NAME).is_file() {
        info!("No changelog under {root} yet; treating everything as new");
        return Ok(None);
    }
    let patch = PatchData::open(&root)?;
    let changelog = patch.load_changelog()?;
    let dictionary = if changelog.compressed {
        Some(patch.load_dictionary()?)
    } else {
        None
    };
    Ok(Some((changelog, dictionary)))
}

/// Picks the dictionary per the regeneration policy: an explicit
/// `--dict-path` wins, then the previous dictionary unless `--regen-dict`,
/// then a fresh training run.
fn build_codec(
    args: &Args,
    walked: &fs_walk::WalkedTree,
    previous: Option<&PreviousPatch>,
) -> Result<Option<Codec>> {
    if let Some(dict_path) = &args.dict_path {
        let bytes = std::fs::read(dict_path)
            .with_context(|| format!("Couldn't read dictionary {dict_path}"))?;
        let dictionary = Dictionary::from_bytes(bytes);
        info!("Using dictionary {} from {dict_path}", dictionary.id().short_name());
        return Ok(Some(Codec::new(
            dictionary,
            args.compression_level,
            args.block_size,
        )));
    }

    if !args.regen_dict {
        if let Some((previous_changelog, dictionary_bytes)) = previous {
            if let Some(previous_id) = previous_changelog.dictionary_id {
                let bytes = dictionary_bytes
                    .clone()
                    .context("Previous changelog references a dictionary we don't have")?;
                let dictionary = Dictionary::from_bytes(bytes);
                if dictionary.id() != previous_id {
                    bail!(PatchError::Integrity(format!(
                        "Previous dictionary hashes to {}, changelog says {previous_id}",
                        dictionary.id()
                    )));
                }
                info!("Reusing dictionary {}", previous_id.short_name());
                return Ok(Some(Codec::new(
                    dictionary,
                    args.compression_level,
                    args.block_size,
                )));
            }
        }
    }

    let blocks: Vec<&[u8]> = walked.blocks.values().map(|b| b.bytes()).collect();
    match dictionary::train(&blocks) {
        Some(dictionary) => Ok(Some(Codec::new(
            dictionary,
            args.compression_level,
            args.block_size,
        ))),
        None => {
            warn!("No usable dictionary; writing uncompressed patch data");
            Ok(None)
        }
    }
}
