//! Object stores where published patch data lives.
//!
//! The patch engine only needs five operations; everything
//! provider-specific hides behind this trait. Local operations never
//! require a store - it's only the `upload` side of the world.

use anyhow::Result;
use async_trait::async_trait;
use camino::Utf8Path;

use crate::config::StoreConfig;

mod fs;
mod memory;
mod s3;

pub use fs::FilesystemStore;
pub use memory::MemoryStore;
pub use s3::S3Store;

#[async_trait]
pub trait ObjectStore {
    /// Write the given bytes to the given key, replacing anything there.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Read the object at the given key.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Lists all keys with the given prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Asks the CDN in front of the store to forget its copy of `key`.
    ///
    /// Only `changelog.json` ever needs this - every other object is
    /// content-addressed and immutable. Stores without a CDN no-op.
    async fn purge_cache(&self, key: &str) -> Result<()>;
}

/// Opens a store for the given destination: a local directory mirror,
/// or (with credentials from the environment) an S3-compatible bucket.
pub fn open(
    destination: Option<&Utf8Path>,
    config: Option<StoreConfig>,
) -> Result<Box<dyn ObjectStore + Send + Sync>> {
    match (destination, config) {
        (Some(dir), _) => Ok(Box::new(FilesystemStore::new(dir)?)),
        (None, Some(config)) => Ok(Box::new(S3Store::new(config)?)),
        (None, None) => anyhow::bail!(
            "No destination given and no store credentials in the environment; \
             nowhere to upload to"
        ),
    }
}
