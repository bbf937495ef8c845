//! Content-addressed binary patches for shipping software updates.
//!
//! `create` cuts a tree into content-defined blocks, groups them into
//! bundles, optionally compresses them with a trained Zstd dictionary,
//! and writes a changelog describing it all. `apply` rebuilds the tree
//! from a changelog, reusing whatever bytes are already on disk and
//! fetching only the bundles it's missing.

pub mod apply;
pub mod bundle;
pub mod changelog;
pub mod chunk;
pub mod config;
pub mod dictionary;
pub mod diff;
pub mod error;
pub mod fetch;
pub mod file_util;
pub mod fs_walk;
pub mod hashing;
pub mod patch_data;
pub mod progress;
pub mod store;
pub mod upload;
pub mod validate;

// CLI stuff:
pub mod ui;

/// The average block size aimed for when none is given.
pub const DEFAULT_BLOCK_SIZE: u32 = 64 * 1024;
