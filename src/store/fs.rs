//! A store that's just a directory. Doubles as a local CDN mirror and
//! as the backend for tests that want to look at what got uploaded.

use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};

use super::ObjectStore;
use crate::file_util;

pub struct FilesystemStore {
    base: Utf8PathBuf,
}

impl FilesystemStore {
    pub fn new(base: &Utf8Path) -> Result<Self> {
        std::fs::create_dir_all(base).with_context(|| format!("Couldn't create {base}"))?;
        Ok(Self {
            base: base.to_owned(),
        })
    }
}

#[async_trait]
impl ObjectStore for FilesystemStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let to = self.base.join(key);
        let dir = to.parent().expect("key has no parent");
        std::fs::create_dir_all(dir).with_context(|| format!("Couldn't create {dir}"))?;
        file_util::atomic_write(&to, bytes)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let from = self.base.join(key);
        std::fs::read(&from).with_context(|| format!("Couldn't read {from}"))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        gather_keys(&self.base, Utf8Path::new(""), &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let target = self.base.join(key);
        ensure!(target.is_file(), "No object at {key}");
        std::fs::remove_file(&target).with_context(|| format!("Couldn't remove {target}"))
    }

    async fn purge_cache(&self, _key: &str) -> Result<()> {
        // No CDN in front of a directory.
        Ok(())
    }
}

fn gather_keys(dir: &Utf8Path, prefix: &Utf8Path, out: &mut Vec<String>) -> Result<()> {
    for entry in dir
        .read_dir_utf8()
        .with_context(|| format!("Couldn't read {dir}"))?
    {
        let entry = entry?;
        let name = entry.path().file_name().expect("entry without a name");
        let key = if prefix.as_str().is_empty() {
            name.to_owned()
        } else {
            format!("{prefix}/{name}")
        };
        if entry.file_type()?.is_dir() {
            gather_keys(entry.path(), Utf8Path::new(&key), out)?;
        } else {
            out.push(key);
        }
    }
    Ok(())
}
