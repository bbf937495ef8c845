//! The error taxonomy: what failed, and whether it's worth retrying.
//!
//! Most of the crate reports errors through [`anyhow`] with path context,
//! but a few spots need to *classify* a failure - the apply engine retries
//! a bundle on transient network trouble or a bad slice, and gives up
//! immediately on anything local. Those spots raise a [`PatchError`],
//! which travels through `anyhow` chains like any other error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    /// Missing paths, unreadable files, malformed or contradictory manifests.
    #[error("input: {0}")]
    Input(String),

    /// A hash didn't match its ID, or a bundle slice points outside the bundle.
    #[error("integrity: {0}")]
    Integrity(String),

    /// Transient HTTP trouble: 5xx, connection reset, timeout.
    #[error("network: {0}")]
    Network(String),

    /// The local disk let us down.
    #[error("storage: {0}")]
    Storage(String),

    /// Configuration that can't work, caught before any real work begins.
    #[error("config: {0}")]
    Config(String),
}

impl PatchError {
    /// Should a *network-sourced* operation that hit this error try again?
    ///
    /// Integrity failures are retryable over the network (the bytes may have
    /// been mangled in flight or by a misbehaving cache); everything local is
    /// fatal on first sight.
    pub fn retryable(&self) -> bool {
        matches!(self, PatchError::Network(_) | PatchError::Integrity(_))
    }
}
