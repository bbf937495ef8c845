use std::process::ExitCode;

use clap::Parser;
use tracing::*;

use blockpatch::ui;

/// Content-addressed binary patches: create them, ship them, apply them.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Verbosity (-v, -vv, -vvv, etc.)
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
enum Subcommand {
    /// Produce a patch data directory from a source tree.
    Create(ui::create::Args),
    /// Upload patch data to the object store.
    Upload(ui::upload::Args),
    /// Reconstruct an installation from patch data.
    Apply(ui::apply::Args),
    /// Check that an installation matches its changelog.
    Validate(ui::validate::Args),
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(args.verbose);

    let result = match args.subcommand {
        Subcommand::Create(c) => ui::create::run(c).map(|()| true),
        Subcommand::Upload(u) => ui::upload::run(u).map(|()| true),
        Subcommand::Apply(a) => ui::apply::run(a).map(|()| true),
        Subcommand::Validate(v) => ui::validate::run(v),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:?}");
            ExitCode::FAILURE
        }
    }
}

/// Set up tracing to spit messages to stderr.
fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
