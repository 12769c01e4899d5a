/*!
# Background

The datastore holds the single authoritative configuration tree of a configuration master, along
with the history of every version ever committed.

For more detail about its usage, see [apiserver](../apiserver).

# Library

The `HistoryStore` trait defines the persistence requirements: an append-only log of committed
contents keyed by version, and a marker naming the current version.  There are basic
implementations for the filesystem and memory.

`VersionedStore` wraps a `HistoryStore` with the in-memory current snapshot.  Commits are parsed
and compressed before the store's lock is taken, then written to history, and only then made
visible to readers.  Readers never take the lock; they load the current snapshot atomically.

# Versions

Each commit gets a `Version` that compares newer than every earlier one in the same store.
Rollback is a new commit of old content, so history only grows (except for optional retention
pruning of the oldest entries).

# Current limitations

* There is one writer per store.  Nothing coordinates multiple masters.
*/

pub mod compression;
pub mod error;
pub mod filesystem;
pub mod memory;
pub mod store;
pub mod version;

pub use error::{Error, Result};
pub use filesystem::FilesystemHistory;
pub use memory::MemoryHistory;
pub use store::{summarize, Commit, IfNewer, Snapshot, VersionedStore, MAX_HISTORY_RESPONSE};
pub use version::Version;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata recorded for each commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub version: Version,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

pub trait HistoryStore {
    /// Returns the version named by the current-version marker along with its content, or None
    /// if nothing has been committed yet.
    fn load_current(&self) -> Result<Option<(Version, String)>>;

    /// Records a commit's metadata and content.  The entry must be complete before it's visible
    /// in `list_versions`.
    fn append(&mut self, entry: &HistoryEntry, content: &str) -> Result<()>;

    /// Points the current-version marker at the given version.
    fn set_current(&mut self, version: &Version) -> Result<()>;

    /// Returns the versions present in history, oldest first.
    fn list_versions(&self) -> Result<Vec<Version>>;

    /// Retrieve the metadata of a single version.
    fn get_entry(&self, version: &Version) -> Result<Option<HistoryEntry>>;

    /// Retrieve the content committed as a single version.
    fn get_content(&self, version: &Version) -> Result<Option<String>>;

    /// Removes the given version from history.  If it didn't exist, we also return Ok(()).
    fn remove(&mut self, version: &Version) -> Result<()>;
}
