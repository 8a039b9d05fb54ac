//! Metadata cache manager
//!
//! Keeps one local copy of each repository index (`<prefix>.jar` or
//! `<prefix>.xml`) and refreshes it when the remote reports a newer
//! last-modified time, a different index format, or no usable timestamp.
//! Interrupted downloads are parked for resumption; caches of removed
//! repositories are evicted through the provisioning event bus.

use super::cleanup::PendingDeletes;
use super::layout::{CacheLayout, IndexFormat, DOWNLOADING_DIR, RESUME_SUFFIX};
use super::resume::{make_resumable, take_resumable, Resume};
use super::root::CacheRoot;
use crate::config::Config;
use crate::error::{RepoCacheError, RepoCacheResult};
use crate::events::{
    ProvisioningEventBus, ProvisioningListener, RepositoryEvent, RepositoryEventKind,
    RepositoryType,
};
use crate::location::RepositoryLocation;
use crate::progress::ProgressMonitor;
use crate::transport::{DownloadSink, DownloadStatus, Transport, TransportError};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;

/// Behavior switches for a cache manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Keep interrupted downloads for resumption
    pub resumable: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self { resumable: true }
    }
}

impl CacheOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            resumable: config.cache.resumable,
        }
    }
}

/// A file found in the cache directory
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub format: IndexFormat,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Interrupted download waiting in `downloading/`
    pub partial: bool,
}

/// Decide whether a local cache must be refreshed.
///
/// `existing` is the format of the current cache file (if any) with its
/// modification time; the remote side is whichever index was queried. A
/// remote timestamp of zero or less is never trusted: some servers report 0
/// for files that exist.
pub fn is_stale(
    existing: Option<(IndexFormat, i64)>,
    remote_format: IndexFormat,
    remote_modified: i64,
) -> bool {
    match existing {
        None => true,
        Some((format, local_modified)) => {
            remote_modified > local_modified || format != remote_format || remote_modified <= 0
        }
    }
}

/// Modification time of `path` in epoch millis, 0 when unavailable
async fn modified_millis(path: &Path) -> i64 {
    fs::metadata(path)
        .await
        .and_then(|meta| meta.modified())
        .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
        .unwrap_or(0)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Inner {
    root: Box<dyn CacheRoot>,
    transport: Arc<dyn Transport>,
    options: CacheOptions,
    known_prefixes: Mutex<HashSet<String>>,
    key_locks: KeyLocks,
    listener: Mutex<Option<Arc<dyn ProvisioningListener>>>,
    pending: PendingDeletes,
}

impl Inner {
    fn layout(&self) -> CacheLayout {
        CacheLayout::new(self.root.cache_dir())
    }

    fn delete_cache(&self, location: &RepositoryLocation) -> usize {
        let layout = self.layout();
        let prefixes: Vec<String> = lock(&self.known_prefixes).iter().cloned().collect();

        let mut deleted = 0;
        for prefix in &prefixes {
            for cache_file in layout.cache_files(location, prefix) {
                for path in [
                    layout.resume_file(&cache_file),
                    layout.resume_marker(&cache_file),
                    cache_file,
                ] {
                    if self.pending.safe_delete(&path) {
                        deleted += 1;
                    }
                }
            }
        }

        info!(
            "Evicted {} cache file(s) for {} across {} prefix(es)",
            deleted,
            location,
            prefixes.len()
        );
        deleted
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            self.pending.flush();
        }
    }
}

type KeyLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Held per-key lock; the map entry goes away with its last holder
struct KeyLease<'a> {
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
    key: String,
    locks: &'a KeyLocks,
}

impl Drop for KeyLease<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // clones are only taken under this mutex, so the count is stable here
        let mut locks = lock(self.locks);
        if locks
            .get(&self.key)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

/// Deletes caches of metadata repositories that get removed
struct EvictionListener {
    inner: Weak<Inner>,
}

impl ProvisioningListener for EvictionListener {
    fn notify(&self, event: &RepositoryEvent) {
        if event.kind != RepositoryEventKind::Removed
            || event.repository_type != RepositoryType::Metadata
        {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            inner.delete_cache(&event.location);
        }
    }
}

/// Manages local cache files of remote metadata repository indexes.
///
/// Clones share state: known prefixes, per-key locks, the eviction listener
/// and deferred deletions.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<Inner>,
}

impl CacheManager {
    pub fn new(
        root: impl CacheRoot + 'static,
        transport: Arc<dyn Transport>,
        options: CacheOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: Box::new(root),
                transport,
                options,
                known_prefixes: Mutex::new(HashSet::new()),
                key_locks: Mutex::new(HashMap::new()),
                listener: Mutex::new(None),
                pending: PendingDeletes::new(),
            }),
        }
    }

    /// Current cache directory layout
    pub fn layout(&self) -> CacheLayout {
        self.inner.layout()
    }

    pub fn options(&self) -> CacheOptions {
        self.inner.options
    }

    /// Every prefix this manager has cached, sorted
    pub fn known_prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = lock(&self.inner.known_prefixes).iter().cloned().collect();
        prefixes.sort();
        prefixes
    }

    /// Include `prefix` in eviction sweeps without caching anything for it
    pub fn remember_prefix(&self, prefix: &str) {
        lock(&self.inner.known_prefixes).insert(prefix.to_string());
    }

    /// Existing cache file for (location, prefix) without contacting the remote
    pub fn existing_cache(&self, location: &RepositoryLocation, prefix: &str) -> Option<PathBuf> {
        self.layout().existing_cache(location, prefix)
    }

    /// Serialize work on one (location, prefix) pair
    async fn lock_key(&self, location: &RepositoryLocation, prefix: &str) -> KeyLease<'_> {
        let key = format!("{}{}", prefix, location.cache_key());
        let key_lock = lock(&self.inner.key_locks)
            .entry(key.clone())
            .or_default()
            .clone();
        KeyLease {
            guard: Some(key_lock.lock_owned().await),
            key,
            locks: &self.inner.key_locks,
        }
    }

    /// Return a local file holding the latest index for (location, prefix).
    ///
    /// The remote is queried for `<prefix>.jar`, falling back to
    /// `<prefix>.xml`. Content is transferred only when the local cache is
    /// missing or stale.
    pub async fn create_cache(
        &self,
        location: &RepositoryLocation,
        prefix: &str,
        progress: &dyn ProgressMonitor,
    ) -> RepoCacheResult<PathBuf> {
        if prefix.is_empty() || prefix.contains(['/', '\\']) {
            return Err(RepoCacheError::InvalidPrefix(prefix.to_string()));
        }
        lock(&self.inner.known_prefixes).insert(prefix.to_string());

        let _lease = self.lock_key(location, prefix).await;

        let layout = self.layout();
        let existing = match layout.existing_cache(location, prefix) {
            Some(path) => {
                let modified = modified_millis(&path).await;
                IndexFormat::of(&path).map(|format| (path, format, modified))
            }
            None => None,
        };

        let (format, remote, remote_modified) =
            self.query_remote(location, prefix, progress).await?;

        let stale = is_stale(
            existing.as_ref().map(|(_, format, modified)| (*format, *modified)),
            format,
            remote_modified,
        );
        if let (false, Some((path, _, _))) = (stale, &existing) {
            debug!("Cache {} is up to date with {}", path.display(), remote);
            return Ok(path.clone());
        }

        let cache_file = layout.cache_file(location, prefix, format);
        self.update_cache(&layout, &cache_file, &remote, remote_modified, progress)
            .await?;

        // the other format is no longer authoritative
        if let Some((path, old_format, _)) = &existing {
            if *old_format != format {
                self.inner.pending.safe_delete(path);
            }
        }
        Ok(cache_file)
    }

    /// Find which index the remote serves and its last-modified time
    async fn query_remote(
        &self,
        location: &RepositoryLocation,
        prefix: &str,
        progress: &dyn ProgressMonitor,
    ) -> RepoCacheResult<(IndexFormat, Url, i64)> {
        let jar = location.append(&IndexFormat::Jar.remote_name(prefix))?;
        let xml = location.append(&IndexFormat::Xml.remote_name(prefix))?;
        let transport = &self.inner.transport;

        let jar_lookup = transport.last_modified(&jar, progress).await;
        if progress.is_cancelled() {
            return Err(RepoCacheError::Cancelled);
        }

        let (format, remote, modified) = match jar_lookup {
            Ok(modified) => (IndexFormat::Jar, jar, modified),
            Err(e) => {
                // errors for the jar are not reported, the xml decides
                debug!("Skipping {}: {}", jar, e);
                let modified = transport
                    .last_modified(&xml, progress)
                    .await
                    .map_err(|e| match e {
                        TransportError::Cancelled => RepoCacheError::Cancelled,
                        TransportError::NotFound(_) => RepoCacheError::NotFound {
                            jar: jar.to_string(),
                            xml: xml.to_string(),
                        },
                        TransportError::AuthenticationFailed(_) => {
                            RepoCacheError::AuthenticationFailed {
                                location: location.to_string(),
                            }
                        }
                        TransportError::Communication { reason, .. } => {
                            RepoCacheError::communication(location.to_string(), reason)
                        }
                    })?;
                (IndexFormat::Xml, xml, modified)
            }
        };

        if modified <= 0 {
            warn!("Server returned lastModified <= 0 for {}", remote);
        }
        Ok((format, remote, modified))
    }

    /// Download `remote` into `cache_file`, resuming a parked partial when
    /// it still matches `remote_modified`
    async fn update_cache(
        &self,
        layout: &CacheLayout,
        cache_file: &Path,
        remote: &Url,
        remote_modified: i64,
        progress: &dyn ProgressMonitor,
    ) -> RepoCacheResult<()> {
        if let Some(parent) = cache_file.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                RepoCacheError::io(format!("creating cache directory {}", parent.display()), e)
            })?;
        }

        let offset = match take_resumable(layout, cache_file, remote_modified, &self.inner.pending)
            .await
        {
            Resume::Complete => {
                info!("Cached {} at {} from a finished partial", remote, cache_file.display());
                return Ok(());
            }
            Resume::Append { offset } => Some(offset),
            Resume::Restart => None,
        };

        let mut sink = DownloadSink::open(cache_file, offset.is_some())
            .await
            .map_err(|e| RepoCacheError::io(format!("opening {}", cache_file.display()), e))?;

        info!("Downloading {} to {}", remote, cache_file.display());
        let outcome = self
            .inner
            .transport
            .download(remote, &mut sink, offset, progress)
            .await;
        let (result, fault) = match outcome {
            Ok(status) => (Some(status), None),
            // the status was recorded in the sink before the transport gave up
            Err(TransportError::Cancelled) => (sink.take_status(), None),
            Err(e) => (None, Some(e.to_string())),
        };

        let closed = sink.close().await;
        let status = match (result, closed) {
            (None, _) => {
                // unverified content must never look like a valid cache
                self.inner.pending.safe_delete(cache_file);
                if progress.is_cancelled() || fault.is_none() {
                    return Err(RepoCacheError::Cancelled);
                }
                return Err(RepoCacheError::Unexpected {
                    remote: remote.to_string(),
                    reason: fault.unwrap_or_default(),
                });
            }
            (Some(status), Err(e)) if status.is_ok() => {
                DownloadStatus::error(format!("flushing {}: {}", cache_file.display(), e))
                    .with_file_size(status.file_size)
                    .with_last_modified(status.last_modified)
            }
            (Some(status), _) => status,
        };

        if status.is_ok() {
            info!("Cached {} at {}", remote, cache_file.display());
            return Ok(());
        }

        let parked = make_resumable(
            layout,
            cache_file,
            remote.as_str(),
            &status,
            self.inner.options.resumable,
            &self.inner.pending,
        )
        .await;
        if !parked {
            self.inner.pending.safe_delete(cache_file);
        }

        if status.is_cancelled() || progress.is_cancelled() {
            return Err(RepoCacheError::Cancelled);
        }
        Err(RepoCacheError::Transfer {
            remote: remote.to_string(),
            status,
        })
    }

    /// Delete every cache file, partial and marker for `location` under all
    /// known prefixes. Returns the number of files removed or scheduled.
    pub fn delete_cache(&self, location: &RepositoryLocation) -> usize {
        self.inner.delete_cache(location)
    }

    /// Evict caches when metadata repositories are removed.
    ///
    /// Safe to call repeatedly: the same listener is re-attached, which also
    /// covers a bus that was replaced since the last call.
    pub fn register_repo_event_listener(&self, bus: &ProvisioningEventBus) {
        let listener = lock(&self.inner.listener)
            .get_or_insert_with(|| {
                let listener: Arc<dyn ProvisioningListener> = Arc::new(EvictionListener {
                    inner: Arc::downgrade(&self.inner),
                });
                listener
            })
            .clone();
        bus.add_listener(listener);
    }

    /// Stop evicting caches on repository removal
    pub fn unregister_repo_event_listener(&self, bus: &ProvisioningEventBus) {
        if let Some(listener) = lock(&self.inner.listener).take() {
            bus.remove_listener(&listener);
        }
    }

    /// Completed caches and parked partials in the cache directory
    pub async fn cached_entries(&self) -> RepoCacheResult<Vec<CacheEntry>> {
        let layout = self.layout();
        let mut entries = Self::scan_dir(layout.root(), false).await?;
        entries.extend(Self::scan_dir(&layout.downloading_dir(), true).await?);
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn scan_dir(dir: &Path, partial: bool) -> RepoCacheResult<Vec<CacheEntry>> {
        if !dir.is_dir() {
            return Ok(vec![]);
        }

        let mut entries = vec![];
        let mut reader = fs::read_dir(dir)
            .await
            .map_err(|e| RepoCacheError::io(format!("reading {}", dir.display()), e))?;

        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| RepoCacheError::io("reading cache entry", e))?
        {
            let path = entry.path();
            let name = entry.file_name();
            if name == DOWNLOADING_DIR || name.to_string_lossy().ends_with(RESUME_SUFFIX) {
                continue;
            }
            let Some(format) = IndexFormat::of(&path) else {
                continue;
            };
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            entries.push(CacheEntry {
                path,
                format,
                size_bytes: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
                partial,
            });
        }

        Ok(entries)
    }

    /// Retry deletions that failed earlier. Returns how many succeeded.
    pub fn shutdown(&self) -> usize {
        self.inner.pending.flush()
    }

    /// Files still waiting for deletion
    pub fn pending_deletes(&self) -> usize {
        self.inner.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::resume::read_marker;
    use crate::cache::root::FixedRoot;
    use crate::progress::{CancelToken, NullProgress};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const BASE: &str = "http://example.com/repo";
    const OLD: i64 = 1_600_000_000_000;

    /// How the next download should end early
    #[derive(Clone, Copy)]
    enum Interrupt {
        /// network failure after N total bytes
        FailAt(u64),
        /// cancellation after N total bytes
        CancelAt(u64),
        /// transport fault without any status
        Fault,
    }

    #[derive(Clone)]
    struct RemoteFile {
        content: Vec<u8>,
        last_modified: i64,
    }

    #[derive(Default)]
    struct FakeRemote {
        files: Mutex<HashMap<String, RemoteFile>>,
        lookup_errors: Mutex<HashMap<String, TransportError>>,
        interrupt: Mutex<Option<Interrupt>>,
        offsets: Mutex<Vec<Option<u64>>>,
        lookups: AtomicUsize,
        downloads: AtomicUsize,
    }

    impl FakeRemote {
        fn put(&self, name: &str, content: &[u8], last_modified: i64) {
            lock(&self.files).insert(
                format!("{}/{}", BASE, name),
                RemoteFile {
                    content: content.to_vec(),
                    last_modified,
                },
            );
        }

        fn remove(&self, name: &str) {
            lock(&self.files).remove(&format!("{}/{}", BASE, name));
        }

        fn fail_lookup(&self, name: &str, err: TransportError) {
            lock(&self.lookup_errors).insert(format!("{}/{}", BASE, name), err);
        }

        fn interrupt_next(&self, interrupt: Interrupt) {
            *lock(&self.interrupt) = Some(interrupt);
        }

        fn downloads(&self) -> usize {
            self.downloads.load(Ordering::SeqCst)
        }

        fn offsets(&self) -> Vec<Option<u64>> {
            lock(&self.offsets).clone()
        }
    }

    #[async_trait]
    impl Transport for FakeRemote {
        async fn last_modified(
            &self,
            uri: &Url,
            progress: &dyn ProgressMonitor,
        ) -> Result<i64, TransportError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if progress.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            if let Some(err) = lock(&self.lookup_errors).get(uri.as_str()) {
                return Err(err.clone());
            }
            lock(&self.files)
                .get(uri.as_str())
                .map(|f| f.last_modified)
                .ok_or_else(|| TransportError::NotFound(uri.to_string()))
        }

        async fn download(
            &self,
            uri: &Url,
            sink: &mut DownloadSink,
            offset: Option<u64>,
            _progress: &dyn ProgressMonitor,
        ) -> Result<DownloadStatus, TransportError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            lock(&self.offsets).push(offset);

            let Some(file) = lock(&self.files).get(uri.as_str()).cloned() else {
                return Ok(DownloadStatus::error("not found"));
            };
            let size = file.content.len() as u64;
            let reported = move |status: DownloadStatus| {
                status
                    .with_file_size(Some(size))
                    .with_last_modified(Some(file.last_modified))
            };
            let start = offset.unwrap_or(0) as usize;
            let interrupt = lock(&self.interrupt).take();

            let end = match interrupt {
                Some(Interrupt::FailAt(n)) | Some(Interrupt::CancelAt(n)) => n as usize,
                Some(Interrupt::Fault) => {
                    sink.write_chunk(&file.content[start..start + 1]).await.unwrap();
                    return Err(TransportError::communication(uri, "socket closed"));
                }
                None => file.content.len(),
            };
            sink.write_chunk(&file.content[start..end]).await.unwrap();

            match interrupt {
                Some(Interrupt::FailAt(_)) => Ok(reported(DownloadStatus::error("connection reset"))),
                Some(Interrupt::CancelAt(_)) => {
                    sink.set_status(reported(DownloadStatus::cancelled()));
                    Err(TransportError::Cancelled)
                }
                _ => {
                    let status = reported(DownloadStatus::ok());
                    sink.set_status(status.clone());
                    Ok(status)
                }
            }
        }
    }

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        remote: Arc<FakeRemote>,
        manager: CacheManager,
    }

    fn fixture_with(options: CacheOptions) -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        let remote = Arc::new(FakeRemote::default());
        let manager = CacheManager::new(FixedRoot(root.clone()), remote.clone(), options);
        Fixture {
            _dir: dir,
            root,
            remote,
            manager,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(CacheOptions::default())
    }

    fn location() -> RepositoryLocation {
        RepositoryLocation::parse(BASE).unwrap()
    }

    fn future_millis() -> i64 {
        Utc::now().timestamp_millis() + 3_600_000
    }

    #[test]
    fn staleness_rule() {
        use IndexFormat::{Jar, Xml};
        assert!(is_stale(None, Jar, OLD));
        assert!(!is_stale(Some((Jar, OLD + 1)), Jar, OLD));
        assert!(!is_stale(Some((Jar, OLD)), Jar, OLD));
        assert!(is_stale(Some((Jar, OLD)), Jar, OLD + 1));
        assert!(is_stale(Some((Xml, OLD + 1)), Jar, OLD));
        assert!(is_stale(Some((Jar, OLD + 1)), Xml, OLD));
        for local in [i64::MIN, 0, OLD, i64::MAX] {
            assert!(is_stale(Some((Jar, local)), Jar, 0));
            assert!(is_stale(Some((Jar, local)), Jar, -1));
        }
    }

    #[tokio::test]
    async fn downloads_jar_when_missing() {
        let f = fixture();
        f.remote.put("content.jar", b"jar index", OLD);

        let path = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap();

        assert_eq!(
            path,
            f.root
                .join(format!("content{}.jar", location().cache_key()))
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"jar index");
        assert_eq!(f.remote.downloads(), 1);
    }

    #[tokio::test]
    async fn unchanged_remote_is_not_downloaded_again() {
        let f = fixture();
        f.remote.put("content.jar", b"jar index", OLD);

        let first = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap();
        for _ in 0..3 {
            let again = f
                .manager
                .create_cache(&location(), "content", &NullProgress)
                .await
                .unwrap();
            assert_eq!(again, first);
        }

        assert_eq!(f.remote.downloads(), 1);
        assert_eq!(f.remote.lookups.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn newer_remote_refreshes() {
        let f = fixture();
        f.remote.put("content.jar", b"v1", OLD);
        f.manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap();

        f.remote.put("content.jar", b"v2", future_millis());
        let path = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"v2");
        assert_eq!(f.remote.downloads(), 2);
    }

    #[tokio::test]
    async fn falls_back_to_xml() {
        let f = fixture();
        f.remote.put("content.xml", b"<repository/>", OLD);

        let path = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap();

        assert_eq!(IndexFormat::of(&path), Some(IndexFormat::Xml));
        assert_eq!(std::fs::read(&path).unwrap(), b"<repository/>");
    }

    #[tokio::test]
    async fn jar_lookup_errors_are_swallowed() {
        let f = fixture();
        f.remote.put("content.xml", b"<repository/>", OLD);
        f.remote.fail_lookup(
            "content.jar",
            TransportError::AuthenticationFailed("jar".to_string()),
        );

        let path = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap();
        assert_eq!(IndexFormat::of(&path), Some(IndexFormat::Xml));
    }

    #[tokio::test]
    async fn neither_index_is_not_found() {
        let f = fixture();

        let err = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap_err();

        match err {
            RepoCacheError::NotFound { jar, xml } => {
                assert!(jar.ends_with("/repo/content.jar"));
                assert!(xml.ends_with("/repo/content.xml"));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn xml_lookup_failures_are_typed() {
        let f = fixture();
        f.remote.fail_lookup(
            "content.xml",
            TransportError::AuthenticationFailed("xml".to_string()),
        );
        let err = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoCacheError::AuthenticationFailed { .. }));

        f.remote.fail_lookup(
            "content.xml",
            TransportError::Communication {
                uri: "xml".to_string(),
                reason: "connection refused".to_string(),
            },
        );
        let err = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoCacheError::Communication { .. }));
    }

    #[tokio::test]
    async fn cancelled_before_lookup() {
        let f = fixture();
        f.remote.put("content.jar", b"jar index", OLD);
        let token = CancelToken::new();
        token.cancel();

        let err = f
            .manager
            .create_cache(&location(), "content", &token)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(f.remote.downloads(), 0);
    }

    #[tokio::test]
    async fn extension_switch_refreshes() {
        let f = fixture();
        f.remote.put("content.xml", b"<repository/>", OLD);
        let xml = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap();

        // older than the local cache, but a different format
        f.remote.put("content.jar", b"jar index", OLD);
        let jar = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap();

        assert_eq!(IndexFormat::of(&jar), Some(IndexFormat::Jar));
        assert_eq!(f.remote.downloads(), 2);
        assert!(!xml.exists());

        // and back again once the jar disappears
        f.remote.remove("content.jar");
        let back = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap();
        assert_eq!(back, xml);
        assert_eq!(f.remote.downloads(), 3);
    }

    #[tokio::test]
    async fn zero_timestamp_is_always_stale() {
        let f = fixture();
        f.remote.put("content.jar", b"jar index", 0);

        for _ in 0..3 {
            f.manager
                .create_cache(&location(), "content", &NullProgress)
                .await
                .unwrap();
        }

        assert_eq!(f.remote.downloads(), 3);
    }

    #[tokio::test]
    async fn interrupted_download_resumes() {
        let f = fixture();
        let content: Vec<u8> = (0..100u8).collect();
        f.remote.put("content.jar", &content, OLD);
        f.remote.interrupt_next(Interrupt::FailAt(40));

        let err = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoCacheError::Transfer { .. }));

        let layout = f.manager.layout();
        let cache_file = layout.cache_file(&location(), "content", IndexFormat::Jar);
        assert!(!cache_file.exists());
        let partial = layout.resume_file(&cache_file);
        assert_eq!(std::fs::metadata(&partial).unwrap().len(), 40);
        let marker = read_marker(&layout, &cache_file).await.unwrap();
        assert_eq!(marker.last_modified, OLD);
        assert_eq!(marker.size, 100);

        let path = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap();

        assert_eq!(f.remote.offsets(), vec![None, Some(40)]);
        assert_eq!(std::fs::read(&path).unwrap(), content);
        assert!(!partial.exists());
        assert!(!layout.resume_marker(&cache_file).exists());
    }

    #[tokio::test]
    async fn changed_remote_invalidates_partial() {
        let f = fixture();
        f.remote.put("content.jar", &[1u8; 100], OLD);
        f.remote.interrupt_next(Interrupt::FailAt(40));
        assert!(f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .is_err());

        f.remote.put("content.jar", &[2u8; 80], OLD + 1);
        let path = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap();

        assert_eq!(f.remote.offsets(), vec![None, None]);
        assert_eq!(std::fs::read(&path).unwrap(), vec![2u8; 80]);
        let layout = f.manager.layout();
        assert!(!layout.resume_file(&path).exists());
    }

    #[tokio::test]
    async fn cancellation_keeps_partial() {
        let f = fixture();
        f.remote.put("content.jar", &[7u8; 100], OLD);
        f.remote.interrupt_next(Interrupt::CancelAt(30));

        let err = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        let layout = f.manager.layout();
        let cache_file = layout.cache_file(&location(), "content", IndexFormat::Jar);
        assert_eq!(
            std::fs::metadata(layout.resume_file(&cache_file))
                .unwrap()
                .len(),
            30
        );
    }

    #[tokio::test]
    async fn disabled_resume_deletes_partial() {
        let f = fixture_with(CacheOptions { resumable: false });
        f.remote.put("content.jar", &[7u8; 100], OLD);
        f.remote.interrupt_next(Interrupt::FailAt(30));

        assert!(f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .is_err());

        let layout = f.manager.layout();
        let cache_file = layout.cache_file(&location(), "content", IndexFormat::Jar);
        assert!(!cache_file.exists());
        assert!(!layout.resume_file(&cache_file).exists());
    }

    #[tokio::test]
    async fn transport_fault_removes_partial() {
        let f = fixture();
        f.remote.put("content.jar", &[7u8; 100], OLD);
        f.remote.interrupt_next(Interrupt::Fault);

        let err = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, RepoCacheError::Unexpected { .. }));
        let layout = f.manager.layout();
        let cache_file = layout.cache_file(&location(), "content", IndexFormat::Jar);
        assert!(!cache_file.exists());
        assert!(!layout.resume_file(&cache_file).exists());
    }

    #[tokio::test]
    async fn rejects_bad_prefix() {
        let f = fixture();
        for prefix in ["", "a/b"] {
            let err = f
                .manager
                .create_cache(&location(), prefix, &NullProgress)
                .await
                .unwrap_err();
            assert!(matches!(err, RepoCacheError::InvalidPrefix(_)));
        }
        assert!(f.manager.known_prefixes().is_empty());
    }

    #[tokio::test]
    async fn concurrent_calls_download_once() {
        let f = fixture();
        f.remote.put("content.jar", b"jar index", OLD);
        let loc = location();

        let (a, b) = tokio::join!(
            f.manager.create_cache(&loc, "content", &NullProgress),
            f.manager.create_cache(&loc, "content", &NullProgress),
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(f.remote.downloads(), 1);
    }

    #[tokio::test]
    async fn removal_event_sweeps_known_prefixes() {
        let f = fixture();
        f.remote.put("content.jar", b"content", OLD);
        f.remote.put("artifacts.xml", b"artifacts", OLD);
        let x = location();
        let y = RepositoryLocation::parse("http://example.com/other").unwrap();

        f.manager.create_cache(&x, "content", &NullProgress).await.unwrap();
        f.manager
            .create_cache(&x, "artifacts", &NullProgress)
            .await
            .unwrap();

        // every prefix/format combination, each with a parked partial and marker
        let layout = f.manager.layout();
        std::fs::create_dir_all(layout.downloading_dir()).unwrap();
        let mut swept = vec![];
        for prefix in ["content", "artifacts"] {
            for cache_file in layout.cache_files(&x, prefix) {
                if !cache_file.exists() {
                    std::fs::write(&cache_file, b"stray").unwrap();
                }
                std::fs::write(layout.resume_file(&cache_file), b"part").unwrap();
                std::fs::write(layout.resume_marker(&cache_file), b"{}").unwrap();
                swept.push(layout.resume_file(&cache_file));
                swept.push(layout.resume_marker(&cache_file));
                swept.push(cache_file);
            }
        }
        assert_eq!(swept.len(), 12);

        let other = layout.cache_file(&y, "content", IndexFormat::Jar);
        std::fs::write(&other, b"keep").unwrap();
        let other_marker = layout.resume_marker(&other);
        std::fs::write(&other_marker, b"{}").unwrap();

        let bus = ProvisioningEventBus::new();
        f.manager.register_repo_event_listener(&bus);
        bus.publish(&RepositoryEvent::metadata_removed(x.clone()));

        for path in &swept {
            assert!(!path.exists(), "{} survived eviction", path.display());
        }
        assert!(other.exists());
        assert!(other_marker.exists());
        assert_eq!(f.manager.delete_cache(&x), 0);
    }

    #[tokio::test]
    async fn finished_partial_is_promoted_without_transfer() {
        let f = fixture();
        f.remote.put("content.jar", b"0123456789", OLD);
        f.remote.interrupt_next(Interrupt::CancelAt(10));

        let err = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());

        let path = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");
        assert_eq!(f.remote.downloads(), 1);
        let layout = f.manager.layout();
        assert!(!layout.resume_file(&path).exists());
        assert!(!layout.resume_marker(&path).exists());
    }

    #[tokio::test]
    async fn key_locks_are_released() {
        let f = fixture();
        f.remote.put("content.jar", b"content", OLD);
        f.remote.put("artifacts.jar", b"artifacts", OLD);
        let loc = location();

        let (a, b, c) = tokio::join!(
            f.manager.create_cache(&loc, "content", &NullProgress),
            f.manager.create_cache(&loc, "content", &NullProgress),
            f.manager.create_cache(&loc, "artifacts", &NullProgress),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        assert!(lock(&f.manager.inner.key_locks).is_empty());

        // failures release the lock as well
        let _ = f
            .manager
            .create_cache(&loc, "missing", &NullProgress)
            .await
            .unwrap_err();
        assert!(lock(&f.manager.inner.key_locks).is_empty());
    }

    #[tokio::test]
    async fn other_events_are_ignored() {
        let f = fixture();
        f.remote.put("content.jar", b"content", OLD);
        let path = f
            .manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap();

        let bus = ProvisioningEventBus::new();
        f.manager.register_repo_event_listener(&bus);
        bus.publish(&RepositoryEvent::new(
            RepositoryEventKind::Removed,
            RepositoryType::Artifact,
            location(),
        ));
        bus.publish(&RepositoryEvent::new(
            RepositoryEventKind::Added,
            RepositoryType::Metadata,
            location(),
        ));

        assert!(path.exists());
    }

    #[test]
    fn listener_registration_is_idempotent() {
        let f = fixture();
        let bus = ProvisioningEventBus::new();

        f.manager.register_repo_event_listener(&bus);
        f.manager.register_repo_event_listener(&bus);
        f.manager.clone().register_repo_event_listener(&bus);
        assert_eq!(bus.listener_count(), 1);

        // a fresh bus gets the same listener attached
        let renewed = ProvisioningEventBus::new();
        f.manager.register_repo_event_listener(&renewed);
        assert_eq!(renewed.listener_count(), 1);

        f.manager.unregister_repo_event_listener(&bus);
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn lists_entries() {
        let f = fixture();
        f.remote.put("content.jar", &[1u8; 10], OLD);
        f.remote.put("artifacts.jar", &[1u8; 50], OLD);
        f.manager
            .create_cache(&location(), "content", &NullProgress)
            .await
            .unwrap();
        f.remote.interrupt_next(Interrupt::FailAt(20));
        let _ = f
            .manager
            .create_cache(&location(), "artifacts", &NullProgress)
            .await;

        let entries = f.manager.cached_entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        let partial = entries.iter().find(|e| e.partial).unwrap();
        assert_eq!(partial.size_bytes, 20);
        let complete = entries.iter().find(|e| !e.partial).unwrap();
        assert_eq!(complete.size_bytes, 10);
        assert_eq!(complete.format, IndexFormat::Jar);
    }
}
