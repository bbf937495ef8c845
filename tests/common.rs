#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use assert_cmd::Command;
use walkdir::WalkDir;

pub fn cli_run() -> Result<Command> {
    let bin_name = env!("CARGO_PKG_NAME");
    let mut cmd = Command::cargo_bin(bin_name)?;
    cmd.arg("-vvv");
    Ok(cmd)
}

/// Deterministic nonsense: incompressible enough to behave like real
/// data, reproducible enough to compare runs.
pub fn scribble(len: usize, mut seed: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        out.extend_from_slice(&seed.to_le_bytes());
    }
    out.truncate(len);
    out
}

/// Relative path -> contents for every file under `root`.
pub fn snapshot_tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root) {
        let entry = entry.expect("couldn't walk dir");
        if entry.file_type().is_file() {
            let relative = entry.path().strip_prefix(root).unwrap().to_owned();
            files.insert(relative, fs::read(entry.path()).expect("couldn't read file"));
        }
    }
    files
}

pub fn assert_trees_equal(expected: &Path, actual: &Path) {
    let expected = snapshot_tree(expected);
    let actual = snapshot_tree(actual);
    let expected_paths: Vec<_> = expected.keys().collect();
    let actual_paths: Vec<_> = actual.keys().collect();
    assert_eq!(expected_paths, actual_paths, "different file sets");
    for (path, bytes) in &expected {
        assert_eq!(&actual[path], bytes, "{} differs", path.display());
    }
}
