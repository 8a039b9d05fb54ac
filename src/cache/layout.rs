//! On-disk layout of the metadata cache
//!
//! ```text
//! <root>/<prefix><key>.jar|.xml                    completed caches
//! <root>/downloading/<prefix><key>.jar|.xml        interrupted partials
//! <root>/downloading/<prefix><key>.jar|.xml.resume resume markers
//! ```

use crate::location::RepositoryLocation;
use std::fmt;
use std::path::{Path, PathBuf};

/// Subdirectory holding interrupted downloads
pub const DOWNLOADING_DIR: &str = "downloading";

/// Suffix of the sidecar marker next to a partial download
pub const RESUME_SUFFIX: &str = ".resume";

/// Format of a repository index file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// Compressed index, preferred when the remote offers it
    Jar,
    /// Plain index
    Xml,
}

impl IndexFormat {
    /// Formats in preference order
    pub fn all() -> &'static [Self] {
        &[Self::Jar, Self::Xml]
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jar => ".jar",
            Self::Xml => ".xml",
        }
    }

    /// Detect the format from a file name
    pub fn of(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        Self::all()
            .iter()
            .copied()
            .find(|format| name.ends_with(format.extension()))
    }

    /// Remote index file name for a prefix (e.g. `content.jar`)
    pub fn remote_name(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.extension())
    }
}

impl fmt::Display for IndexFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jar => write!(f, "jar"),
            Self::Xml => write!(f, "xml"),
        }
    }
}

/// Path computations rooted at the cache directory
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<prefix><key><ext>`
    pub fn cache_file(
        &self,
        location: &RepositoryLocation,
        prefix: &str,
        format: IndexFormat,
    ) -> PathBuf {
        self.root.join(format!(
            "{}{}{}",
            prefix,
            location.cache_key(),
            format.extension()
        ))
    }

    /// Both candidate cache files, jar first
    pub fn cache_files(&self, location: &RepositoryLocation, prefix: &str) -> [PathBuf; 2] {
        [
            self.cache_file(location, prefix, IndexFormat::Jar),
            self.cache_file(location, prefix, IndexFormat::Xml),
        ]
    }

    /// The authoritative cache file: jar if present, else xml
    pub fn existing_cache(&self, location: &RepositoryLocation, prefix: &str) -> Option<PathBuf> {
        self.cache_files(location, prefix)
            .into_iter()
            .find(|path| path.is_file())
    }

    pub fn downloading_dir(&self) -> PathBuf {
        self.root.join(DOWNLOADING_DIR)
    }

    /// Where the partial download for `cache_file` is parked
    pub fn resume_file(&self, cache_file: &Path) -> PathBuf {
        let name = cache_file.file_name().unwrap_or_default();
        self.downloading_dir().join(name)
    }

    /// Sidecar marker describing the partial download for `cache_file`
    pub fn resume_marker(&self, cache_file: &Path) -> PathBuf {
        let mut name = cache_file.file_name().unwrap_or_default().to_os_string();
        name.push(RESUME_SUFFIX);
        self.downloading_dir().join(name)
    }
}
