use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use tracing::*;

use crate::changelog::Changelog;
use crate::fetch::Fetcher;
use crate::patch_data::PatchData;
use crate::progress::Progress;
use crate::validate;

/// Check that an installation matches its changelog.
///
/// Exits 0 on a match, nonzero on any difference. Never writes.
#[derive(Debug, Parser)]
pub struct Args {
    /// The installation to check
    install_dir: Utf8PathBuf,

    /// Patch data holding the changelog: a local directory or an
    /// http(s) base URL
    #[clap(long, name = "path-or-url")]
    patch_data: String,
}

pub fn run(args: Args) -> Result<bool> {
    let remote = args.patch_data.starts_with("http://")
        || args.patch_data.starts_with("https://");

    let changelog: Changelog = if remote {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async { Fetcher::new(&args.patch_data)?.fetch_changelog().await })?
    } else {
        PatchData::open(Utf8Path::new(&args.patch_data))?.load_changelog()?
    };

    let ok = validate::validate(&changelog, &args.install_dir, &Progress::default())?;
    if ok {
        info!("{} matches version {}", args.install_dir, changelog.version);
        println!("ok");
    } else {
        warn!("{} does not match version {}", args.install_dir, changelog.version);
        println!("mismatch");
    }
    Ok(ok)
}
