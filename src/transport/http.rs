//! Transport for `http://` and `https://` repositories
//!
//! Requests run on the blocking pool through `ureq`. Body chunks are handed
//! to the async side over a bounded channel; dropping the receiver stops the
//! blocking reader, which is how cancellation reaches an in-flight transfer.

use super::{DownloadSink, DownloadStatus, Transport, TransportError, CHUNK_SIZE};
use crate::config::schema::TransportConfig;
use crate::progress::ProgressMonitor;
use async_trait::async_trait;
use chrono::DateTime;
use std::io::Read;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use ureq::http::HeaderMap;
use ureq::Agent;
use url::Url;

/// How often a blocked request checks the monitor for cancellation
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Frames sent from the blocking reader to the async writer
enum Frame {
    Response {
        code: u16,
        file_size: Option<u64>,
        last_modified: Option<i64>,
    },
    Chunk(Vec<u8>),
    Failed(String),
}

/// HTTP(S) transport backed by a shared `ureq` agent
#[derive(Clone)]
pub struct HttpTransport {
    agent: Agent,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Self {
        let timeout = Some(Duration::from_secs(config.timeout_secs));
        // bodies are unbounded in time, cancellation stops a slow transfer
        let agent_config = Agent::config_builder()
            .timeout_connect(timeout)
            .timeout_recv_response(timeout)
            .http_status_as_error(false)
            .user_agent(config.user_agent.as_str())
            .build();
        Self {
            agent: Agent::new_with_config(agent_config),
        }
    }
}

/// Parse an HTTP date (`Tue, 15 Nov 1994 08:12:31 GMT`) into epoch millis
pub(crate) fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.timestamp_millis())
}

/// Total size of the remote file from `Content-Range` or `Content-Length`
pub(crate) fn total_size(code: u16, headers: &HeaderMap) -> Option<u64> {
    if code == 206 || code == 416 {
        // bytes 100-999/1000, or bytes */1000 for an unsatisfiable range
        return header_str(headers, "content-range")
            .and_then(|range| range.rsplit('/').next())
            .and_then(|total| total.trim().parse().ok());
    }
    header_str(headers, "content-length").and_then(|len| len.trim().parse().ok())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn classify(uri: &Url, code: u16) -> TransportError {
    match code {
        404 | 410 => TransportError::NotFound(uri.to_string()),
        401 | 403 | 407 => TransportError::AuthenticationFailed(uri.to_string()),
        _ => TransportError::communication(uri, format!("HTTP status {}", code)),
    }
}

/// Run a blocking request while watching the monitor for cancellation
async fn run_blocking<T, F>(
    uri: &Url,
    progress: &dyn ProgressMonitor,
    work: F,
) -> Result<T, TransportError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let mut handle = tokio::task::spawn_blocking(work);
    loop {
        tokio::select! {
            joined = &mut handle => {
                return joined.map_err(|e| TransportError::communication(uri, e.to_string()));
            }
            _ = tokio::time::sleep(CANCEL_POLL) => {
                if progress.is_cancelled() {
                    return Err(TransportError::Cancelled);
                }
            }
        }
    }
}

fn fetch_blocking(agent: Agent, target: String, offset: Option<u64>, tx: mpsc::Sender<Frame>) {
    let mut request = agent.get(&target);
    if let Some(start) = offset {
        request = request.header("Range", format!("bytes={}-", start));
    }

    let mut response = match request.call() {
        Ok(response) => response,
        Err(e) => {
            let _ = tx.blocking_send(Frame::Failed(e.to_string()));
            return;
        }
    };

    let code = response.status().as_u16();
    let headers = response.headers();
    let frame = Frame::Response {
        code,
        file_size: total_size(code, headers),
        last_modified: header_str(headers, "last-modified").and_then(parse_http_date),
    };
    if tx.blocking_send(frame).is_err() || code >= 300 {
        return;
    }

    let mut reader = response.body_mut().as_reader();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => {
                if tx.blocking_send(Frame::Chunk(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.blocking_send(Frame::Failed(e.to_string()));
                return;
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn last_modified(
        &self,
        uri: &Url,
        progress: &dyn ProgressMonitor,
    ) -> Result<i64, TransportError> {
        if progress.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let agent = self.agent.clone();
        let target = uri.to_string();
        let response = run_blocking(uri, progress, move || agent.head(&target).call())
            .await?
            .map_err(|e| TransportError::communication(uri, e.to_string()))?;

        let code = response.status().as_u16();
        if !(200..300).contains(&code) {
            return Err(classify(uri, code));
        }

        match header_str(response.headers(), "last-modified") {
            Some(value) => Ok(parse_http_date(value).unwrap_or_else(|| {
                warn!("Unparsable Last-Modified '{}' for {}", value, uri);
                0
            })),
            None => Ok(0),
        }
    }

    async fn download(
        &self,
        uri: &Url,
        sink: &mut DownloadSink,
        offset: Option<u64>,
        progress: &dyn ProgressMonitor,
    ) -> Result<DownloadStatus, TransportError> {
        let (tx, mut rx) = mpsc::channel(8);
        let agent = self.agent.clone();
        let target = uri.to_string();
        let start = offset.filter(|o| *o > 0);
        tokio::task::spawn_blocking(move || fetch_blocking(agent, target, start, tx));

        let mut file_size = None;
        let mut last_modified = None;
        let mut expected = None;
        let mut received: u64 = 0;

        loop {
            let polled = tokio::select! {
                frame = rx.recv() => Some(frame),
                _ = tokio::time::sleep(CANCEL_POLL) => None,
            };
            let frame = match polled {
                Some(frame) => frame,
                None if progress.is_cancelled() => {
                    drop(rx);
                    progress.done();
                    sink.set_status(
                        DownloadStatus::cancelled()
                            .with_file_size(file_size)
                            .with_last_modified(last_modified),
                    );
                    return Err(TransportError::Cancelled);
                }
                None => continue,
            };

            let status_with = move |status: DownloadStatus| {
                status
                    .with_file_size(file_size)
                    .with_last_modified(last_modified)
            };

            match frame {
                Some(Frame::Response {
                    code,
                    file_size: size,
                    last_modified: modified,
                }) => {
                    file_size = size;
                    last_modified = modified;
                    if code == 416 {
                        // the range starts at the end: nothing is missing
                        if start.is_some() && file_size == start {
                            progress.done();
                            let status = DownloadStatus::ok()
                                .with_file_size(file_size)
                                .with_last_modified(last_modified);
                            sink.set_status(status.clone());
                            return Ok(status);
                        }
                        return Ok(DownloadStatus::error("range not satisfiable"));
                    }
                    if code >= 300 {
                        let reason = classify(uri, code).to_string();
                        return Ok(DownloadStatus::error(reason)
                            .with_file_size(file_size)
                            .with_last_modified(last_modified));
                    }
                    let resumed = start.is_some() && code == 206;
                    if start.is_some() && !resumed {
                        debug!("Server ignored range request for {}, restarting", uri);
                        if let Err(e) = sink.restart().await {
                            return Ok(DownloadStatus::error(e.to_string()));
                        }
                    }
                    expected = match (file_size, resumed) {
                        (Some(size), true) => Some(size.saturating_sub(start.unwrap_or(0))),
                        (size, _) => size,
                    };
                    progress.begin(uri.as_str(), expected);
                }
                Some(Frame::Chunk(chunk)) => {
                    if progress.is_cancelled() {
                        drop(rx);
                        progress.done();
                        sink.set_status(status_with(DownloadStatus::cancelled()));
                        return Err(TransportError::Cancelled);
                    }
                    if let Err(e) = sink.write_chunk(&chunk).await {
                        progress.done();
                        return Ok(status_with(DownloadStatus::error(format!(
                            "writing {}: {}",
                            sink.path().display(),
                            e
                        ))));
                    }
                    received += chunk.len() as u64;
                    progress.worked(chunk.len() as u64);
                }
                Some(Frame::Failed(reason)) => {
                    progress.done();
                    return Ok(status_with(DownloadStatus::error(reason)));
                }
                None => break,
            }
        }
        progress.done();

        let status = match expected {
            Some(expected) if received < expected => DownloadStatus::error(format!(
                "premature end of {} after {} of {} bytes",
                uri, received, expected
            )),
            _ => DownloadStatus::ok(),
        }
        .with_file_size(file_size)
        .with_last_modified(last_modified);
        sink.set_status(status.clone());
        Ok(status)
    }
}
