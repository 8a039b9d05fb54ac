//! Transport for `file://` repositories

use super::{DownloadSink, DownloadStatus, Transport, TransportError, CHUNK_SIZE};
use crate::progress::ProgressMonitor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::{ErrorKind, SeekFrom};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;
use url::Url;

/// Reads repository files straight from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransport;

impl FileTransport {
    fn local_path(uri: &Url) -> Result<PathBuf, TransportError> {
        uri.to_file_path()
            .map_err(|_| TransportError::communication(uri, "not a local file path"))
    }

    fn map_io(uri: &Url, err: std::io::Error) -> TransportError {
        match err.kind() {
            ErrorKind::NotFound => TransportError::NotFound(uri.to_string()),
            ErrorKind::PermissionDenied => TransportError::AuthenticationFailed(uri.to_string()),
            _ => TransportError::communication(uri, err.to_string()),
        }
    }

    async fn stat(uri: &Url) -> Result<(u64, i64), TransportError> {
        let path = Self::local_path(uri)?;
        let meta = fs::metadata(&path).await.map_err(|e| Self::map_io(uri, e))?;
        if !meta.is_file() {
            return Err(TransportError::NotFound(uri.to_string()));
        }
        let modified = meta
            .modified()
            .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
            .unwrap_or(0);
        Ok((meta.len(), modified))
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn last_modified(
        &self,
        uri: &Url,
        progress: &dyn ProgressMonitor,
    ) -> Result<i64, TransportError> {
        if progress.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        let (_, modified) = Self::stat(uri).await?;
        Ok(modified)
    }

    async fn download(
        &self,
        uri: &Url,
        sink: &mut DownloadSink,
        offset: Option<u64>,
        progress: &dyn ProgressMonitor,
    ) -> Result<DownloadStatus, TransportError> {
        let (size, modified) = match Self::stat(uri).await {
            Ok(stat) => stat,
            Err(TransportError::NotFound(_)) => {
                return Ok(DownloadStatus::error(format!("{} not found", uri)));
            }
            Err(e) => return Ok(DownloadStatus::error(e.to_string())),
        };
        let reported = |status: DownloadStatus| {
            status
                .with_file_size(Some(size))
                .with_last_modified(Some(modified))
        };

        let start = offset.unwrap_or(0);
        if start > size {
            return Ok(reported(DownloadStatus::error(format!(
                "resume offset {} beyond end of {} ({} bytes)",
                start, uri, size
            ))));
        }

        let path = Self::local_path(uri)?;
        let mut source = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) => return Ok(reported(DownloadStatus::error(e.to_string()))),
        };
        if start > 0 {
            if let Err(e) = source.seek(SeekFrom::Start(start)).await {
                return Ok(reported(DownloadStatus::error(e.to_string())));
            }
            debug!("Resuming {} at byte {}", uri, start);
        }

        progress.begin(uri.as_str(), Some(size - start));
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            if progress.is_cancelled() {
                sink.set_status(reported(DownloadStatus::cancelled()));
                progress.done();
                return Err(TransportError::Cancelled);
            }
            let n = match source.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    progress.done();
                    return Ok(reported(DownloadStatus::error(e.to_string())));
                }
            };
            if let Err(e) = sink.write_chunk(&buf[..n]).await {
                progress.done();
                return Ok(reported(DownloadStatus::error(format!(
                    "writing {}: {}",
                    sink.path().display(),
                    e
                ))));
            }
            progress.worked(n as u64);
        }
        progress.done();

        let status = reported(DownloadStatus::ok());
        sink.set_status(status.clone());
        Ok(status)
    }
}
