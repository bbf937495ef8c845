//! Tools for hashing everything we care about into a unique [`ContentId`]

use std::fmt;

use anyhow::{Context, Result, ensure};
use data_encoding::HEXLOWER;
use sha2::{Digest, Sha256, digest::Output};

type Sha256Digest = Output<Sha256>;

/// The hash (a SHA-256) used to identify all objects in our system:
/// blocks, bundles, and dictionaries.
///
/// Rendered as lowercase hex everywhere, including the changelog
/// and object store keys.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ContentId {
    digest: Sha256Digest,
}

impl ContentId {
    /// Calculates an ID from the given bytes
    pub fn hash(bytes: &[u8]) -> Self {
        Self {
            digest: Sha256::digest(bytes),
        }
    }

    fn from_digest(digest: Sha256Digest) -> Self {
        Self { digest }
    }

    /// Gets a git-like shortened version of the hash that's unique enough
    /// for most UI uses.
    pub fn short_name(&self) -> String {
        let mut full = format!("{self}");
        let _rest = full.split_off(8);
        full
    }

    /// The two-character shard prefix used to keep block directories
    /// from growing millions of entries.
    pub fn shard(&self) -> String {
        let mut full = format!("{self}");
        let _rest = full.split_off(2);
        full
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ digest: {} }}", HEXLOWER.encode(&self.digest))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", HEXLOWER.encode(&self.digest))
    }
}

impl std::str::FromStr for ContentId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = HEXLOWER
            .decode(s.as_bytes())
            .with_context(|| format!("Couldn't decode {s} as lowercase hex"))?;

        ensure!(
            bytes.len() == <Sha256 as Digest>::output_size(),
            "Expected a hex SHA-256"
        );
        Ok(ContentId::from_digest(*Sha256Digest::from_slice(&bytes)))
    }
}

impl serde::Serialize for ContentId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&HEXLOWER.encode(&self.digest))
    }
}

impl<'de> serde::Deserialize<'de> for ContentId {
    fn deserialize<D>(deserializer: D) -> Result<ContentId, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct IdVisitor;

        impl serde::de::Visitor<'_> for IdVisitor {
            type Value = ContentId;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a lowercase hex SHA-256")
            }

            fn visit_str<E: serde::de::Error>(self, s: &str) -> Result<ContentId, E> {
                s.parse().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_str(IdVisitor)
    }
}

/// Incrementally hashes several byte runs into one [`ContentId`].
///
/// Bundle IDs are the hash of the concatenated block payloads;
/// this saves us assembling the concatenation just to hash it.
pub struct IdHasher {
    hasher: Sha256,
}

impl IdHasher {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn finalize(self) -> ContentId {
        ContentId::from_digest(self.hasher.finalize())
    }
}

impl Default for IdHasher {
    fn default() -> Self {
        Self::new()
    }
}
