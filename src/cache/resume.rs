//! Resumable partial downloads
//!
//! An interrupted download is parked in `downloading/` together with a JSON
//! marker recording the remote last-modified time it was started against.
//! A later refresh may continue it only while the remote still reports that
//! exact timestamp.

use super::cleanup::PendingDeletes;
use super::layout::CacheLayout;
use crate::transport::DownloadStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, warn};

/// Sidecar metadata for a parked partial download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeMarker {
    /// Remote file being downloaded
    pub remote: String,
    /// Remote last-modified (epoch millis) the partial belongs to
    pub last_modified: i64,
    /// Total size the remote reported
    pub size: u64,
    /// When the partial was parked
    pub parked_at: DateTime<Utc>,
}

impl ResumeMarker {
    /// Whether a partial of `partial_len` bytes with this marker may be
    /// continued against a remote reporting `remote_last_modified`
    pub fn matches(&self, remote_last_modified: i64, partial_len: u64) -> bool {
        remote_last_modified > 0
            && self.last_modified == remote_last_modified
            && partial_len <= self.size
    }
}

/// Why a failed download cannot be kept for resumption
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotResumable {
    #[error("download completed")]
    Complete,
    #[error("resumable downloads are disabled")]
    Disabled,
    #[error("nothing was written")]
    Empty,
    #[error("file size not reported")]
    UnknownSize,
    #[error("last-modified not reported")]
    NoLastModified,
    #[error("more was read ({on_disk} bytes) than the reported size ({reported} bytes)")]
    Oversized { on_disk: u64, reported: u64 },
}

/// What to do with a parked partial before transferring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// No usable partial, download from the start
    Restart,
    /// Continue the transfer after `offset` bytes already in place
    Append { offset: u64 },
    /// The partial already holds every byte the remote reported
    Complete,
}

/// Decide whether a partial file of `on_disk` bytes can be resumed later.
///
/// Returns the reported total size and last-modified time on success.
pub fn check_resumable(
    on_disk: u64,
    status: &DownloadStatus,
    enabled: bool,
) -> Result<(u64, i64), NotResumable> {
    if status.is_ok() {
        return Err(NotResumable::Complete);
    }
    if !enabled {
        return Err(NotResumable::Disabled);
    }
    if on_disk == 0 {
        return Err(NotResumable::Empty);
    }
    let reported = match status.file_size {
        Some(size) if size > 0 => size,
        _ => return Err(NotResumable::UnknownSize),
    };
    let last_modified = match status.last_modified {
        Some(modified) if modified > 0 => modified,
        _ => return Err(NotResumable::NoLastModified),
    };
    // equal sizes are fine: cancelled right after the last byte arrived
    if reported < on_disk {
        return Err(NotResumable::Oversized { on_disk, reported });
    }
    Ok((reported, last_modified))
}

/// Park a partially downloaded `cache_file` for resumption.
///
/// Returns false when the partial is not eligible or any filesystem step
/// fails; the caller then deletes the partial.
pub async fn make_resumable(
    layout: &CacheLayout,
    cache_file: &Path,
    remote: &str,
    status: &DownloadStatus,
    enabled: bool,
    pending: &PendingDeletes,
) -> bool {
    let on_disk = match fs::metadata(cache_file).await {
        Ok(meta) => meta.len(),
        Err(_) => return false,
    };

    let (size, last_modified) = match check_resumable(on_disk, status, enabled) {
        Ok(reported) => reported,
        Err(
            reason @ (NotResumable::UnknownSize
            | NotResumable::NoLastModified
            | NotResumable::Oversized { .. }),
        ) => {
            warn!("Download of {} not resumable because {}", remote, reason);
            return false;
        }
        Err(reason) => {
            debug!("Download of {} not resumable: {}", remote, reason);
            return false;
        }
    };

    let resume_dir = layout.downloading_dir();
    if let Err(e) = fs::create_dir_all(&resume_dir).await {
        error!(
            "Could not create directory {} for resumable download of {}: {}",
            resume_dir.display(),
            remote,
            e
        );
        return false;
    }

    let resume_file = layout.resume_file(cache_file);
    if let Err(e) = fs::rename(cache_file, &resume_file).await {
        error!(
            "Could not move {} to {} for resumed download: {}",
            cache_file.display(),
            resume_file.display(),
            e
        );
        return false;
    }

    let marker = ResumeMarker {
        remote: remote.to_string(),
        last_modified,
        size,
        parked_at: Utc::now(),
    };
    let marker_path = layout.resume_marker(cache_file);
    let written = match serde_json::to_vec_pretty(&marker) {
        Ok(bytes) => fs::write(&marker_path, bytes).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    if let Err(e) = written {
        error!(
            "Could not write resume marker {}: {}",
            marker_path.display(),
            e
        );
        pending.safe_delete(&resume_file);
        return false;
    }

    info!(
        "Kept {} of {} bytes of {} for a resumed download",
        on_disk, size, remote
    );
    true
}

/// Read the marker for a parked partial, if it exists and parses
pub async fn read_marker(layout: &CacheLayout, cache_file: &Path) -> Option<ResumeMarker> {
    let bytes = fs::read(layout.resume_marker(cache_file)).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(marker) => Some(marker),
        Err(e) => {
            warn!(
                "Ignoring unreadable resume marker for {}: {}",
                cache_file.display(),
                e
            );
            None
        }
    }
}

/// Move a still-valid partial download onto `cache_file`.
///
/// Stale partials (remote changed since, unreadable marker, or a remote
/// without a usable timestamp) are discarded.
pub async fn take_resumable(
    layout: &CacheLayout,
    cache_file: &Path,
    remote_last_modified: i64,
    pending: &PendingDeletes,
) -> Resume {
    let resume_file = layout.resume_file(cache_file);
    let marker_path = layout.resume_marker(cache_file);

    let partial_len = match fs::metadata(&resume_file).await {
        Ok(meta) => meta.len(),
        Err(_) => {
            pending.safe_delete(&marker_path);
            return Resume::Restart;
        }
    };

    let marker = match read_marker(layout, cache_file).await {
        Some(marker) if marker.matches(remote_last_modified, partial_len) => marker,
        _ => {
            debug!(
                "Discarding stale partial download {}",
                resume_file.display()
            );
            pending.safe_delete(&resume_file);
            pending.safe_delete(&marker_path);
            return Resume::Restart;
        }
    };

    if let Err(e) = fs::rename(&resume_file, cache_file).await {
        error!(
            "Could not move resumable file {} into cache: {}",
            resume_file.display(),
            e
        );
        return Resume::Restart;
    }
    pending.safe_delete(&marker_path);

    if partial_len == marker.size {
        debug!("Partial {} is already complete", cache_file.display());
        return Resume::Complete;
    }
    debug!(
        "Resuming {} from byte {}",
        cache_file.display(),
        partial_len
    );
    Resume::Append {
        offset: partial_len,
    }
}
