//! Local cache of remote metadata repository indexes
//!
//! Each (repository, prefix) pair maps to one file in the cache directory:
//! `<prefix><key>.jar` or `<prefix><key>.xml`, where `<key>` is derived from
//! the repository location.
//!
//! # Layout
//!
//! | Path | Description |
//! |------|-------------|
//! | `<prefix><key>.jar` | Compressed index, preferred when the remote has one |
//! | `<prefix><key>.xml` | Plain index, used when no jar is served |
//! | `downloading/<name>` | Interrupted download waiting to be resumed |
//! | `downloading/<name>.resume` | Marker holding the remote timestamp of the partial |

pub mod cleanup;
pub mod layout;
pub mod manager;
pub mod resume;
pub mod root;

pub use cleanup::PendingDeletes;
pub use layout::{CacheLayout, IndexFormat};
pub use manager::{is_stale, CacheEntry, CacheManager, CacheOptions};
pub use resume::{NotResumable, Resume, ResumeMarker};
pub use root::{AgentDataArea, CacheRoot, FixedRoot};
