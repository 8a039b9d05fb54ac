//! Best-effort deletion of cache files
//!
//! A cache file can be held open by a reader while it is evicted. Such files
//! are remembered and retried later instead of failing the eviction.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Files whose deletion failed and must be retried
#[derive(Debug, Default)]
pub struct PendingDeletes {
    paths: Mutex<Vec<PathBuf>>,
}

impl PendingDeletes {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, path: &Path) {
        let mut paths = self.paths.lock().unwrap_or_else(|p| p.into_inner());
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_path_buf());
        }
    }

    /// Number of files still waiting for deletion
    pub fn len(&self) -> usize {
        self.paths.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retry every pending deletion, keeping the ones that still fail.
    ///
    /// Returns the number of files removed.
    pub fn flush(&self) -> usize {
        let mut paths = self.paths.lock().unwrap_or_else(|p| p.into_inner());
        let before = paths.len();
        paths.retain(|path| match std::fs::remove_file(path) {
            Ok(()) => false,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!("Still unable to delete {}: {}", path.display(), e);
                true
            }
        });
        before - paths.len()
    }

    /// Delete `path` if it exists, deferring the deletion when it fails.
    ///
    /// Returns true when the file was deleted or scheduled for deletion.
    pub fn safe_delete(&self, path: &Path) -> bool {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(
                    "Could not delete {} ({}), retrying at shutdown",
                    path.display(),
                    e
                );
                self.push(path);
                true
            }
        }
    }
}
