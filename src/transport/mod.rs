//! Transport abstraction for remote repository files
//!
//! A transport reports last-modified timestamps and streams file content
//! into a [`DownloadSink`], optionally resuming from a byte offset.
//!
//! - `file://` locations are served by [`FileTransport`]
//! - `http://` and `https://` locations are served by [`HttpTransport`]
//!
//! [`RepositoryTransport`] dispatches on the URL scheme.

mod file;
mod http;
mod sink;

pub use file::FileTransport;
pub use http::HttpTransport;
pub use sink::DownloadSink;

use crate::config::schema::TransportConfig;
use crate::progress::ProgressMonitor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Chunk size used when streaming content
pub(crate) const CHUNK_SIZE: usize = 64 * 1024;

/// Typed failures reported by a transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed for {0}")]
    AuthenticationFailed(String),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Communication with {uri} failed: {reason}")]
    Communication { uri: String, reason: String },
}

impl TransportError {
    pub fn communication(uri: &Url, reason: impl Into<String>) -> Self {
        Self::Communication {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }
}

/// Severity of a download outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Cancel,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Cancel => write!(f, "cancelled"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Outcome of a download attempt
///
/// Carries the size and last-modified time reported by the remote even for
/// aborted transfers; these decide whether a partial file can be resumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStatus {
    pub severity: Severity,
    pub message: Option<String>,
    /// Total size of the remote file in bytes, when reported
    pub file_size: Option<u64>,
    /// Remote last-modified time in milliseconds since the epoch, when reported
    pub last_modified: Option<i64>,
}

impl DownloadStatus {
    pub fn ok() -> Self {
        Self::new(Severity::Ok, None)
    }

    pub fn cancelled() -> Self {
        Self::new(Severity::Cancel, Some("transfer cancelled".to_string()))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, Some(message.into()))
    }

    fn new(severity: Severity, message: Option<String>) -> Self {
        Self {
            severity,
            message,
            file_size: None,
            last_modified: None,
        }
    }

    pub fn with_file_size(mut self, size: Option<u64>) -> Self {
        self.file_size = size;
        self
    }

    pub fn with_last_modified(mut self, last_modified: Option<i64>) -> Self {
        self.last_modified = last_modified;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.severity == Severity::Ok
    }

    pub fn is_cancelled(&self) -> bool {
        self.severity == Severity::Cancel
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{} ({})", message, self.severity),
            None => write!(f, "{}", self.severity),
        }
    }
}

/// Retrieval of remote repository files
#[async_trait]
pub trait Transport: Send + Sync {
    /// Last-modified time of `uri` in milliseconds since the epoch.
    ///
    /// Returns 0 when the remote exists but reports no usable timestamp.
    async fn last_modified(
        &self,
        uri: &Url,
        progress: &dyn ProgressMonitor,
    ) -> Result<i64, TransportError>;

    /// Stream `uri` into `sink`, starting at `offset` when resuming.
    ///
    /// Failed and cancelled transfers are reported through the returned
    /// status. An `Err(Cancelled)` must leave the status in the sink.
    async fn download(
        &self,
        uri: &Url,
        sink: &mut DownloadSink,
        offset: Option<u64>,
        progress: &dyn ProgressMonitor,
    ) -> Result<DownloadStatus, TransportError>;
}

/// Scheme-dispatching transport used by default
pub struct RepositoryTransport {
    file: FileTransport,
    http: HttpTransport,
}

impl RepositoryTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            file: FileTransport,
            http: HttpTransport::new(config),
        }
    }

    fn select(&self, uri: &Url) -> Result<&dyn Transport, TransportError> {
        match uri.scheme() {
            "file" => Ok(&self.file),
            "http" | "https" => Ok(&self.http),
            other => Err(TransportError::communication(
                uri,
                format!("unsupported scheme '{}'", other),
            )),
        }
    }
}

#[async_trait]
impl Transport for RepositoryTransport {
    async fn last_modified(
        &self,
        uri: &Url,
        progress: &dyn ProgressMonitor,
    ) -> Result<i64, TransportError> {
        self.select(uri)?.last_modified(uri, progress).await
    }

    async fn download(
        &self,
        uri: &Url,
        sink: &mut DownloadSink,
        offset: Option<u64>,
        progress: &dyn ProgressMonitor,
    ) -> Result<DownloadStatus, TransportError> {
        self.select(uri)?.download(uri, sink, offset, progress).await
    }
}
