use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use tracing::*;

use crate::config::StoreConfig;
use crate::patch_data::PatchData;
use crate::progress::Progress;
use crate::store;
use crate::upload;

/// Upload patch data to the object store, then purge the CDN's copy of
/// the changelog.
///
/// Credentials come from BLOCKPATCH_ACCESS_KEY_ID,
/// BLOCKPATCH_SECRET_ACCESS_KEY, BLOCKPATCH_S3_ENDPOINT, and
/// BLOCKPATCH_S3_BUCKET (plus optional BLOCKPATCH_CDN_ID and
/// BLOCKPATCH_CDN_TOKEN). Without them, only --to works.
#[derive(Debug, Parser)]
pub struct Args {
    /// The patch data directory to publish
    patch_data_dir: Utf8PathBuf,

    /// Upload everything, even objects the store already lists
    #[clap(long)]
    all: bool,

    /// Mirror into a local directory instead of the configured bucket
    #[clap(long, name = "dir")]
    to: Option<Utf8PathBuf>,
}

pub fn run(args: Args) -> Result<()> {
    let patch = PatchData::open(&args.patch_data_dir)?;

    let config = StoreConfig::from_env();
    if config.is_none() && args.to.is_none() {
        debug!("No store credentials in the environment");
    }
    let store = store::open(args.to.as_deref(), config)
        .context("Upload is disabled without a destination")?;

    let progress = Progress::default();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(upload::upload(&patch, store.as_ref(), args.all, &progress))?;

    print!("{}", progress.summary());
    Ok(())
}
