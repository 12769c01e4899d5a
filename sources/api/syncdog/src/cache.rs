//! The cache file lets a restarted slave serve its last good snapshot before it can reach a
//! master.  It holds the snapshot exactly as the master sent it, in the same JSON form.

use apitypes::SnapshotResponse;
use log::debug;
use snafu::ResultExt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{self, Result};
use crate::replica::ReplicaSnapshot;
use crate::syncer::expand;

/// Loads the cached snapshot at `path`.  Returns Ok(None) if there's no cache yet.
pub fn load(path: &Path) -> Result<Option<ReplicaSnapshot>> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No cached snapshot at {}", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e).context(error::CacheReadSnafu { path }),
    };
    let cached: SnapshotResponse =
        serde_json::from_str(&data).context(error::CacheFormatSnafu { path })?;
    expand(cached.version, cached.data).map(Some)
}

/// Writes `snapshot` to `path`, replacing any earlier cache.  Snapshots without a version aren't
/// worth caching and are skipped.
pub fn store(path: &Path, snapshot: &ReplicaSnapshot) -> Result<()> {
    let version = match &snapshot.version {
        Some(version) => version.clone(),
        None => return Ok(()),
    };
    let cached = SnapshotResponse {
        version,
        data: snapshot.compressed.clone(),
    };
    let data = serde_json::to_string(&cached).context(error::CacheSerializeSnafu { path })?;

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).context(error::CacheWriteSnafu { path: dir })?;
    }
    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);
    fs::write(&tmp_path, data).context(error::CacheWriteSnafu { path: &tmp_path })?;
    fs::rename(&tmp_path, path).context(error::CacheWriteSnafu { path })
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use datastore::Version;

    #[test]
    fn missing_cache() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load(&dir.path().join("snapshot.json")).unwrap(), None);
    }

    #[test]
    fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshot.json");
        let text = "A {\n    X = 1\n}\n";
        let version = Version::next(&Version::initial(), text, Utc::now());
        let snapshot = expand(version, datastore::compression::compress(text).unwrap()).unwrap();

        store(&path, &snapshot).unwrap();
        assert_eq!(load(&path).unwrap(), Some(snapshot));
    }

    #[test]
    fn unsynced_snapshot_isnt_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        store(&path, &ReplicaSnapshot::default()).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn garbage_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            load(&path).unwrap_err(),
            error::Error::CacheFormat { .. }
        ));
    }
}
