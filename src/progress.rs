//! Progress reporting and cooperative cancellation
//!
//! Long-running operations receive a `&dyn ProgressMonitor`. They check
//! `is_cancelled` at every remote query and between transferred chunks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receiver for progress updates that can request cancellation
pub trait ProgressMonitor: Send + Sync {
    /// Whether the caller asked for the operation to stop
    fn is_cancelled(&self) -> bool;

    /// A task started; `total` is its size in bytes when known
    fn begin(&self, _task: &str, _total: Option<u64>) {}

    /// `bytes` more units of work completed
    fn worked(&self, _bytes: u64) {}

    /// The current task finished (successfully or not)
    fn done(&self) {}
}

/// Monitor that never cancels and ignores progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressMonitor for NullProgress {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Clonable cancellation flag
///
/// All clones share the same flag, so a signal handler can cancel an
/// operation that received another clone.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl ProgressMonitor for CancelToken {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
