//! Stateful download sink

use super::DownloadStatus;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};

/// Buffered file writer that also holds the status of the transfer feeding it.
///
/// The transport records its status here before returning, so the status
/// survives a transfer that ends in `TransportError::Cancelled`.
pub struct DownloadSink {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
    status: Option<DownloadStatus>,
}

impl DownloadSink {
    /// Open `path` for writing, appending when `append` is set
    pub async fn open(path: &Path, append: bool) -> std::io::Result<Self> {
        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let file = options.open(path).await?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            written: 0,
            status: None,
        })
    }

    /// Destination file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one chunk of content
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written through this sink since it was opened or restarted
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Discard everything in the file, including appended-to content
    pub async fn restart(&mut self) -> std::io::Result<()> {
        self.writer.flush().await?;
        let file = self.writer.get_mut();
        file.set_len(0).await?;
        file.seek(SeekFrom::Start(0)).await?;
        self.written = 0;
        Ok(())
    }

    pub fn set_status(&mut self, status: DownloadStatus) {
        self.status = Some(status);
    }

    pub fn status(&self) -> Option<&DownloadStatus> {
        self.status.as_ref()
    }

    pub fn take_status(&mut self) -> Option<DownloadStatus> {
        self.status.take()
    }

    /// Flush buffered bytes and close the file
    pub async fn close(mut self) -> std::io::Result<()> {
        self.writer.flush().await?;
        self.writer.get_mut().sync_all().await?;
        Ok(())
    }
}
