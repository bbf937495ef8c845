//! Progress counters passed into long-running operations.
//!
//! Not an ambient side effect: callers hand a [`Progress`] to create,
//! apply, and upload, and decide for themselves what to print when.
//! Workers just bump relaxed atomics.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Progress {
    pub files_hashed: AtomicU64,
    pub files_clean: AtomicU64,
    pub files_written: AtomicU64,
    pub files_pruned: AtomicU64,
    pub blocks_reused: AtomicU64,
    pub bundles_fetched: AtomicU64,
    pub bytes_fetched: AtomicU64,
    pub bytes_written: AtomicU64,
    pub objects_uploaded: AtomicU64,
}

impl Progress {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    /// One line per nonzero counter, for printing at the end of a command.
    pub fn summary(&self) -> String {
        let counts = [
            (&self.files_hashed, "files hashed"),
            (&self.files_clean, "files already up to date"),
            (&self.files_written, "files written"),
            (&self.files_pruned, "files pruned"),
            (&self.blocks_reused, "blocks reused locally"),
            (&self.bundles_fetched, "bundles fetched"),
            (&self.bytes_fetched, "bytes fetched"),
            (&self.bytes_written, "bytes written"),
            (&self.objects_uploaded, "objects uploaded"),
        ];

        let mut out = String::new();
        for (counter, what) in counts {
            let count = counter.load(Ordering::Relaxed);
            if count > 0 {
                out.push_str(&format!("{count:>12} {what}\n"));
            }
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn summary_skips_zeroes() {
        let progress = Progress::default();
        assert_eq!(progress.summary(), "");

        Progress::bump(&progress.files_written);
        Progress::add(&progress.bytes_written, 1024);
        let summary = progress.summary();
        assert!(summary.contains("1 files written"));
        assert!(summary.contains("1024 bytes written"));
        assert!(!summary.contains("fetched"));
    }
}
