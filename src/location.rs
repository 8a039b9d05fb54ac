//! Repository locations and cache keys
//!
//! A repository location is an absolute URL naming a remote metadata
//! repository. Index files are addressed relative to it, and the local cache
//! file name embeds a content hash of the location.

use crate::error::{RepoCacheError, RepoCacheResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Number of digest bytes kept in a cache key (16 hex chars)
const KEY_BYTES: usize = 8;

/// An absolute URL identifying a remote metadata repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryLocation {
    url: Url,
}

impl RepositoryLocation {
    /// Parse a location, rejecting relative or non-hierarchical URLs
    pub fn parse(input: &str) -> RepoCacheResult<Self> {
        let url = Url::parse(input.trim()).map_err(|e| RepoCacheError::InvalidLocation {
            location: input.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_url(url)
    }

    /// Wrap an already parsed URL
    pub fn from_url(url: Url) -> RepoCacheResult<Self> {
        if url.cannot_be_a_base() {
            return Err(RepoCacheError::InvalidLocation {
                location: url.to_string(),
                reason: "location must be a hierarchical URL".to_string(),
            });
        }
        Ok(Self { url })
    }

    /// The underlying URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// URL scheme (file, http, https)
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Resolve `name` inside this location, treating the location as a directory
    pub fn append(&self, name: &str) -> RepoCacheResult<Url> {
        let mut base = self.url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(name).map_err(|e| RepoCacheError::InvalidLocation {
            location: format!("{}{}", base, name),
            reason: e.to_string(),
        })
    }

    /// Deterministic, filesystem-safe key derived from the location.
    ///
    /// A trailing slash does not change the key.
    pub fn cache_key(&self) -> String {
        let canonical = self.url.as_str().trim_end_matches('/');
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..KEY_BYTES])
    }
}

impl FromStr for RepositoryLocation {
    type Err = RepoCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RepositoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
