use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use tracing::*;

use crate::apply::{self, ApplyOptions};
use crate::changelog::Changelog;
use crate::dictionary::{Codec, Dictionary};
use crate::error::PatchError;
use crate::fetch::Fetcher;
use crate::patch_data::{DICTIONARY_NAME, PatchData};
use crate::progress::Progress;

/// Reconstruct an installation from patch data, reusing whatever bytes
/// are already in place.
#[derive(Debug, Parser)]
pub struct Args {
    /// The installation to bring up to date (created if missing)
    install_dir: Utf8PathBuf,

    /// Patch data to apply: a local directory or an http(s) base URL
    #[clap(long, name = "path-or-url")]
    patch_data: String,

    /// Refuse compressed patch data
    #[clap(long)]
    no_compression: bool,

    /// Keep fetched blocks here so an interrupted apply can resume
    /// (defaults to a temporary directory)
    #[clap(long, name = "dir")]
    cache: Option<Utf8PathBuf>,
}

pub fn run(args: Args) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let progress = Progress::default();

    let remote = args.patch_data.starts_with("http://")
        || args.patch_data.starts_with("https://");

    // Holds the default cache alive (and cleans it up) through the apply.
    let mut temp_cache = None;

    let (changelog, patch, fetcher, dictionary) = if remote {
        let fetcher = Arc::new(Fetcher::new(&args.patch_data)?);
        let changelog = runtime.block_on(fetcher.fetch_changelog())?;

        let cache_root = match &args.cache {
            Some(dir) => dir.clone(),
            None => {
                let dir = tempfile::tempdir().context("Couldn't create a cache directory")?;
                let root = Utf8PathBuf::from_path_buf(dir.path().to_owned())
                    .map_err(|p| anyhow::anyhow!("Temp dir {} isn't UTF-8", p.display()))?;
                temp_cache = Some(dir);
                root
            }
        };
        let patch = PatchData::create(&cache_root)?;

        let dictionary = if changelog.compressed {
            Some(runtime.block_on(fetcher.fetch_with_retry(DICTIONARY_NAME))?)
        } else {
            None
        };
        (changelog, patch, Some(fetcher), dictionary)
    } else {
        let patch = PatchData::open(Utf8Path::new(&args.patch_data))?;
        let changelog = patch.load_changelog()?;
        let dictionary = if changelog.compressed {
            Some(patch.load_dictionary()?)
        } else {
            None
        };
        (changelog, patch, None, dictionary)
    };

    let codec = build_codec(&args, &changelog, dictionary)?;

    info!(
        "Applying version {} ({} files) to {}",
        changelog.version,
        changelog.files.len(),
        args.install_dir
    );

    let apply_options = ApplyOptions::default();
    runtime.block_on(async {
        tokio::select! {
            result = apply::apply(
                &changelog,
                &args.install_dir,
                &patch,
                fetcher,
                codec,
                &apply_options,
                &progress,
            ) => result,
            _ = tokio::signal::ctrl_c() => bail!("Interrupted; nothing half-written, rerun to resume"),
        }
    })?;

    drop(temp_cache);
    print!("{}", progress.summary());
    Ok(())
}

fn build_codec(
    args: &Args,
    changelog: &Changelog,
    dictionary: Option<Vec<u8>>,
) -> Result<Option<Arc<Codec>>> {
    if !changelog.compressed {
        return Ok(None);
    }
    ensure!(
        !args.no_compression,
        PatchError::Config(
            "The changelog is compressed, but --no-compression was given".to_owned()
        )
    );

    let expected = changelog
        .dictionary_id
        .expect("compressed changelog without a dictionary id");
    let dictionary = Dictionary::from_bytes(
        dictionary.expect("compressed changelog fetched without a dictionary"),
    );
    if dictionary.id() != expected {
        bail!(PatchError::Integrity(format!(
            "Dictionary hashes to {}, changelog says {expected}",
            dictionary.id()
        )));
    }

    Ok(Some(Arc::new(Codec::new(
        dictionary,
        crate::dictionary::DEFAULT_LEVEL,
        changelog.block_size,
    ))))
}
