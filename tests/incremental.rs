use std::fs;

use anyhow::Result;
use camino::Utf8Path;
use tempfile::tempdir;

mod common;

use common::*;

/// Editing a few bytes in the middle of a file only produces a block or
/// two of new patch data, and every unchanged block keeps its bundle.
#[test]
fn small_edit_small_patch() -> Result<()> {
    let source = tempdir()?;
    let patch = tempdir()?;
    let patch_root = Utf8Path::from_path(patch.path()).unwrap();

    fs::write(source.path().join("big.bin"), scribble(200 * 1024, 1))?;
    fs::write(source.path().join("other.bin"), scribble(64 * 1024, 2))?;

    cli_run()?
        .arg("create")
        .arg(source.path())
        .arg("--output")
        .arg(patch.path())
        .assert()
        .success();

    let v1 = blockpatch::patch_data::PatchData::open(patch_root)?.load_changelog()?;
    let blocks_before = blockpatch::patch_data::PatchData::open(patch_root)?
        .iter_blocks()?
        .len();

    // Flip one byte deep inside big.bin.
    let mut bytes = fs::read(source.path().join("big.bin"))?;
    bytes[100_000] ^= 0xff;
    fs::write(source.path().join("big.bin"), bytes)?;

    cli_run()?
        .arg("create")
        .arg(source.path())
        .arg("--output")
        .arg(patch.path())
        .arg("--patch-data")
        .arg(patch.path())
        .assert()
        .success();

    let v2 = blockpatch::patch_data::PatchData::open(patch_root)?.load_changelog()?;
    let blocks_after = blockpatch::patch_data::PatchData::open(patch_root)?
        .iter_blocks()?
        .len();

    assert_eq!(v2.version, v1.version + 1);

    // A one-byte edit perturbs at most the chunk it landed in and its
    // neighbor.
    assert!(
        blocks_after - blocks_before <= 2,
        "{} new blocks for a one-byte edit",
        blocks_after - blocks_before
    );

    // Bundle stability: every block both versions reference is still in
    // the bundle it was first packed into.
    let mut carried = 0;
    for (block, bundle) in &v1.block_index {
        if let Some(new_bundle) = v2.block_index.get(block) {
            assert_eq!(new_bundle, bundle, "block {block} moved bundles");
            carried += 1;
        }
    }
    assert!(carried > 0, "no blocks survived a one-byte edit?");

    // untouched file: identical entry, same bundle assignment throughout.
    assert_eq!(
        v1.files[Utf8Path::new("other.bin")],
        v2.files[Utf8Path::new("other.bin")]
    );

    // And v2 still applies cleanly.
    let install = tempdir()?;
    cli_run()?
        .arg("apply")
        .arg(install.path())
        .arg("--patch-data")
        .arg(patch.path())
        .assert()
        .success();
    assert_trees_equal(source.path(), install.path());
    Ok(())
}

/// Applying v2 on top of an installed v1 only rewrites the edited file,
/// reusing the installation's own bytes for everything it can.
#[test]
fn apply_on_previous_version_reuses_local_blocks() -> Result<()> {
    let source = tempdir()?;
    let patch = tempdir()?;
    let install = tempdir()?;

    fs::write(source.path().join("edited.bin"), scribble(150 * 1024, 8))?;
    fs::write(source.path().join("untouched.bin"), scribble(80 * 1024, 9))?;

    cli_run()?
        .arg("create")
        .arg(source.path())
        .arg("--output")
        .arg(patch.path())
        .assert()
        .success();
    cli_run()?
        .arg("apply")
        .arg(install.path())
        .arg("--patch-data")
        .arg(patch.path())
        .assert()
        .success();

    let untouched_mtime = fs::metadata(install.path().join("untouched.bin"))?.modified()?;

    let mut bytes = fs::read(source.path().join("edited.bin"))?;
    bytes[75_000] = bytes[75_000].wrapping_add(1);
    fs::write(source.path().join("edited.bin"), bytes)?;

    cli_run()?
        .arg("create")
        .arg(source.path())
        .arg("--output")
        .arg(patch.path())
        .arg("--patch-data")
        .arg(patch.path())
        .assert()
        .success();

    std::thread::sleep(std::time::Duration::from_millis(100));
    cli_run()?
        .arg("apply")
        .arg(install.path())
        .arg("--patch-data")
        .arg(patch.path())
        .assert()
        .success();

    assert_trees_equal(source.path(), install.path());
    assert_eq!(
        fs::metadata(install.path().join("untouched.bin"))?.modified()?,
        untouched_mtime,
        "untouched.bin was rewritten"
    );
    Ok(())
}
