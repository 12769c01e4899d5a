//! The versioned store: the authoritative tree and its history.

use arc_swap::ArcSwap;
use cfgtree::{diff, parse, serialize, Change, ChangeKind, ConfigNode};
use chrono::Utc;
use log::{debug, info, warn};
use snafu::{OptionExt, ResultExt};
use std::sync::{Arc, RwLock};

use super::compression;
use super::{error, HistoryEntry, HistoryStore, Result, Version};

/// The most history entries returned by one request, whatever the caller asks for.
pub const MAX_HISTORY_RESPONSE: usize = 100;

/// One committed state of the configuration, ready to be served.
#[derive(Debug)]
pub struct Snapshot {
    pub version: Version,
    pub tree: ConfigNode,
    /// The serialized tree, as stored in history.
    pub text: String,
    compressed: Vec<u8>,
}

impl Snapshot {
    fn build(version: Version, tree: ConfigNode, text: String) -> Result<Self> {
        let compressed = compression::compress(&text)?;
        Ok(Self {
            version,
            tree,
            text,
            compressed,
        })
    }

    fn initial() -> Result<Self> {
        Self::build(Version::initial(), ConfigNode::new(), String::new())
    }

    /// The gzip-compressed serialized tree.
    pub fn compressed(&self) -> &[u8] {
        &self.compressed
    }
}

/// The answer to "is there anything newer than what I have?"
#[derive(Debug, Clone)]
pub enum IfNewer {
    /// The caller is up to date; this is the newest version.
    Current(Version),
    /// The caller is behind; this is the newest snapshot.
    Newer(Arc<Snapshot>),
}

/// The result of a successful commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub version: Version,
    /// What changed relative to the tree that was current before the commit.
    pub changes: Vec<Change>,
}

/// Holds the authoritative configuration tree and records every commit to a `HistoryStore`.
///
/// Commits are serialized by the history lock.  Reads of the current version and snapshot never
/// touch that lock.
pub struct VersionedStore<H> {
    history: RwLock<H>,
    current: ArcSwap<Snapshot>,
    retention: Option<usize>,
}

impl<H: HistoryStore> VersionedStore<H> {
    /// Opens a store on the given history, loading whatever version it marks as current.
    pub fn open(history: H) -> Result<Self> {
        let snapshot = match history.load_current()? {
            Some((version, content)) => {
                let tree = parse(&content).context(error::CorruptContentSnafu {
                    version: version.as_str(),
                })?;
                info!("Loaded configuration version {}", version);
                Snapshot::build(version, tree, content)?
            }
            None => {
                info!("History is empty, starting from the initial version");
                Snapshot::initial()?
            }
        };

        Ok(Self {
            history: RwLock::new(history),
            current: ArcSwap::from_pointee(snapshot),
            retention: None,
        })
    }

    /// Keep at most `retention` versions in history; older ones are pruned after each commit.
    pub fn with_retention(mut self, retention: Option<usize>) -> Self {
        // The current version is never pruned.
        self.retention = retention.map(|r| r.max(1));
        self
    }

    pub fn version(&self) -> Version {
        self.current.load().version.clone()
    }

    /// The current snapshot.  Holding on to it doesn't block commits.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Returns the current serialized tree, optionally compressed.
    pub fn current_snapshot(&self, compressed: bool) -> Vec<u8> {
        let snapshot = self.current.load();
        if compressed {
            snapshot.compressed().to_vec()
        } else {
            snapshot.text.as_bytes().to_vec()
        }
    }

    /// Compares the caller's version with the current one.  A caller version that isn't a valid
    /// token (for example a slave that has never synced) is treated as older than everything.
    pub fn snapshot_if_newer(&self, client_version: &str) -> IfNewer {
        let snapshot = self.current.load_full();
        match client_version.parse::<Version>() {
            Ok(client) if !snapshot.version.is_newer(&client) => {
                IfNewer::Current(snapshot.version.clone())
            }
            _ => IfNewer::Newer(snapshot),
        }
    }

    /// Replaces the authoritative tree with `content`, recording the commit as `author`.
    ///
    /// Content that doesn't parse is rejected before anything changes.  A commit with content
    /// identical to the current tree still gets a new version.
    pub fn commit(&self, content: &str, author: &str) -> Result<Commit> {
        let submitted = parse(content).context(error::InvalidContentSnafu)?;
        let text = serialize(&submitted);
        // The live tree is read back from the stored text, so it always matches history.
        let tree = parse(&text).context(error::InvalidContentSnafu)?;
        let compressed = compression::compress(&text)?;

        let mut history = self.history.write().ok().context(error::HistoryLockSnafu)?;
        let previous = self.current.load_full();
        let version = Version::next(&previous.version, &text, Utc::now());
        let entry = HistoryEntry {
            version: version.clone(),
            author: author.to_string(),
            timestamp: Utc::now(),
        };

        history.append(&entry, &text)?;
        history.set_current(&version)?;
        if let Some(retention) = self.retention {
            // The commit is durable at this point; failing to prune shouldn't undo it.
            if let Err(e) = prune(&mut *history, retention) {
                warn!("Unable to prune history: {}", e);
            }
        }

        let changes = diff(&previous.tree, &tree);
        self.current.store(Arc::new(Snapshot {
            version: version.clone(),
            tree,
            text,
            compressed,
        }));
        drop(history);

        info!(
            "Committed version {} by '{}': {}",
            version,
            author,
            summarize(&changes)
        );
        Ok(Commit { version, changes })
    }

    /// Returns up to `limit` history entries, most recent first.  Never more than
    /// MAX_HISTORY_RESPONSE.
    pub fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let limit = limit.min(MAX_HISTORY_RESPONSE);
        let history = self.history.read().ok().context(error::HistoryLockSnafu)?;

        let mut entries = Vec::with_capacity(limit);
        for version in history.list_versions()?.iter().rev().take(limit) {
            match history.get_entry(version)? {
                Some(entry) => entries.push(entry),
                None => debug!("Version {} disappeared while listing history", version),
            }
        }
        Ok(entries)
    }

    /// Returns the content committed as `version`.
    pub fn version_content(&self, version: &Version) -> Result<String> {
        let history = self.history.read().ok().context(error::HistoryLockSnafu)?;
        history
            .get_content(version)?
            .context(error::VersionNotFoundSnafu {
                version: version.as_str(),
            })
    }

    /// Returns the content of each requested version, in order.  If any version is missing, the
    /// whole request fails, naming that version.
    pub fn version_contents(&self, versions: &[Version]) -> Result<Vec<String>> {
        let history = self.history.read().ok().context(error::HistoryLockSnafu)?;
        versions
            .iter()
            .map(|version| {
                history
                    .get_content(version)?
                    .context(error::VersionNotFoundSnafu {
                        version: version.as_str(),
                    })
            })
            .collect()
    }

    /// Makes the content of an earlier version current again, as a new commit.  The old version
    /// stays in history untouched.
    pub fn rollback(&self, version: &Version, author: &str) -> Result<Commit> {
        let content = self.version_content(version)?;
        info!("Rolling back to version {} for '{}'", version, author);
        self.commit(&content, author)
    }
}

/// Removes the oldest versions so at most `retention` remain.
fn prune<H: HistoryStore>(history: &mut H, retention: usize) -> Result<()> {
    let versions = history.list_versions()?;
    if versions.len() <= retention {
        return Ok(());
    }
    let excess = versions.len() - retention;
    for version in &versions[..excess] {
        debug!("Pruning version {} from history", version);
        history.remove(version)?;
    }
    Ok(())
}

/// Produces a short description of a change list for logs.
pub fn summarize(changes: &[Change]) -> String {
    if changes.is_empty() {
        return "no changes".to_string();
    }
    let count = |kind| changes.iter().filter(|c| c.kind == kind).count();
    format!(
        "{} added, {} removed, {} modified",
        count(ChangeKind::Added),
        count(ChangeKind::Removed),
        count(ChangeKind::Modified)
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Error, FilesystemHistory, MemoryHistory};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn store() -> VersionedStore<MemoryHistory> {
        VersionedStore::open(MemoryHistory::new()).unwrap()
    }

    #[test]
    fn initial_state() {
        let store = store();
        assert_eq!(store.version(), Version::initial());
        assert!(store.snapshot().tree.is_empty());
        assert!(store.current_snapshot(false).is_empty());
        assert!(store.history(10).unwrap().is_empty());
    }

    #[test]
    fn commit_and_read_back() {
        let store = store();
        let commit = store.commit("A { X = 1 }", "alice").unwrap();
        assert_ne!(commit.version, Version::initial());
        assert_eq!(store.version(), commit.version);

        let content = store.version_content(&commit.version).unwrap();
        let tree = parse(&content).unwrap();
        assert_eq!(tree.get_value("/A/X"), Some("1"));

        let history = store.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].author, "alice");
        assert_eq!(history[0].version, commit.version);
    }

    #[test]
    fn commits_are_monotonic() {
        let store = store();
        let mut last = store.version();
        for i in 0..20 {
            // Same content each time; versions still move forward.
            let commit = store.commit("A = 1", &format!("user{}", i % 2)).unwrap();
            assert!(commit.version.is_newer(&last));
            last = commit.version;
        }
    }

    #[test]
    fn failed_commit_changes_nothing() {
        let store = store();
        store.commit("A { X = 1 }", "alice").unwrap();
        let version = store.version();
        let compressed = store.current_snapshot(true);

        let err = store.commit("A { X = 1", "alice").unwrap_err();
        assert!(matches!(err, Error::InvalidContent { .. }));
        assert_eq!(store.version(), version);
        assert_eq!(store.current_snapshot(true), compressed);
        assert_eq!(store.history(10).unwrap().len(), 1);
    }

    #[test]
    fn if_newer() {
        let store = store();
        let v1 = store.commit("A = 1", "alice").unwrap().version;
        let v2 = store.commit("A = 2", "alice").unwrap().version;

        match store.snapshot_if_newer(v1.as_str()) {
            IfNewer::Newer(snapshot) => {
                assert_eq!(snapshot.version, v2);
                let text = compression::expand_maybe(snapshot.compressed()).unwrap();
                assert_eq!(parse(text).unwrap().get_value("A"), Some("2"));
            }
            IfNewer::Current(_) => panic!("expected newer data"),
        }
        assert!(matches!(
            store.snapshot_if_newer(v2.as_str()),
            IfNewer::Current(v) if v == v2
        ));
        assert!(matches!(store.snapshot_if_newer(""), IfNewer::Newer(_)));
    }

    #[test]
    fn history_is_capped() {
        let store = store();
        for i in 0..(MAX_HISTORY_RESPONSE + 5) {
            store.commit(&format!("N = {}", i), "alice").unwrap();
        }
        let history = store.history(10_000).unwrap();
        assert_eq!(history.len(), MAX_HISTORY_RESPONSE);
        assert_eq!(history[0].version, store.version());
        assert!(history[0].version.is_newer(&history[1].version));
        assert_eq!(store.history(3).unwrap().len(), 3);
    }

    #[test]
    fn rollback_is_a_new_commit() {
        let store = store();
        let v1 = store.commit("A { X = 1 }", "alice").unwrap().version;
        let original = store.version_content(&v1).unwrap();
        store.commit("A { X = 2 }", "bob").unwrap();

        let rolled = store.rollback(&v1, "carol").unwrap();
        assert!(rolled.version.is_newer(&v1));
        assert_eq!(store.version(), rolled.version);
        assert_eq!(store.snapshot().tree.get_value("/A/X"), Some("1"));
        assert_eq!(store.version_content(&v1).unwrap(), original);
        assert_eq!(store.history(10).unwrap().len(), 3);
        assert_eq!(store.history(1).unwrap()[0].author, "carol");
    }

    #[test]
    fn missing_versions() {
        let store = store();
        let v1 = store.commit("A = 1", "alice").unwrap().version;
        let missing: Version = "00000000000000000001.0123456789ab".parse().unwrap();

        assert!(matches!(
            store.rollback(&missing, "alice").unwrap_err(),
            Error::VersionNotFound { .. }
        ));
        match store.version_contents(&[v1, missing.clone()]).unwrap_err() {
            Error::VersionNotFound { version } => assert_eq!(version, missing.as_str()),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn changes_are_reported() {
        let store = store();
        store.commit("A { X = 1 }\nB = 1", "alice").unwrap();
        let commit = store.commit("A { X = 2 }\nC = 1", "alice").unwrap();
        assert_eq!(summarize(&commit.changes), "1 added, 1 removed, 1 modified");

        let same = store.commit("A { X = 2 }\nC = 1", "alice").unwrap();
        assert!(same.changes.is_empty());
        assert_eq!(summarize(&same.changes), "no changes");
    }

    #[test]
    fn retention_prunes_oldest() {
        let store = store().with_retention(Some(2));
        let v1 = store.commit("A = 1", "alice").unwrap().version;
        let v2 = store.commit("A = 2", "alice").unwrap().version;
        let v3 = store.commit("A = 3", "alice").unwrap().version;

        let versions: Vec<_> = store
            .history(10)
            .unwrap()
            .into_iter()
            .map(|e| e.version)
            .collect();
        assert_eq!(versions, vec![v3, v2]);
        assert!(matches!(
            store.version_content(&v1).unwrap_err(),
            Error::VersionNotFound { .. }
        ));
    }

    #[test]
    fn reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let version = {
            let store = VersionedStore::open(FilesystemHistory::new(dir.path())).unwrap();
            store.commit("# the answer\nA { X = 42 }", "alice").unwrap();
            store.version()
        };

        let store = VersionedStore::open(FilesystemHistory::new(dir.path())).unwrap();
        assert_eq!(store.version(), version);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.tree.get_value("/A/X"), Some("42"));
        assert_eq!(snapshot.tree.entry("A").unwrap().comment, "the answer");
        assert_eq!(store.history(10).unwrap()[0].author, "alice");
    }

    #[test]
    fn live_tree_matches_history() {
        let store = store();
        let commit = store.commit("X = \\ a\nY { Z = b\\  }", "alice").unwrap();
        let stored = parse(store.version_content(&commit.version).unwrap()).unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.tree, stored);
        assert_eq!(snapshot.tree.get_value("X"), Some(" a"));
        assert_eq!(snapshot.tree.get_value("/Y/Z"), Some("b "));
    }

    #[test]
    fn concurrent_commits() {
        const WRITERS: usize = 4;
        const COMMITS: usize = 15;
        let store = store();
        let done = AtomicBool::new(false);

        let versions: Vec<Version> = thread::scope(|s| {
            // Every commit sets A and B to the same value, so a torn read would show them apart.
            let reader = s.spawn(|| {
                let mut last = store.version();
                let mut reads = 0;
                while !done.load(Ordering::SeqCst) {
                    let snapshot = store.snapshot();
                    assert!(!last.is_newer(&snapshot.version));
                    assert_eq!(snapshot.tree.get_value("/A/N"), snapshot.tree.get_value("/B/N"));
                    assert_eq!(parse(&snapshot.text).unwrap(), snapshot.tree);
                    last = snapshot.version.clone();
                    reads += 1;
                }
                reads
            });

            let writers: Vec<_> = (0..WRITERS)
                .map(|w| {
                    let store = &store;
                    s.spawn(move || {
                        (0..COMMITS)
                            .map(|i| {
                                let n = w * COMMITS + i;
                                let content = format!("A {{ N = {} }}\nB {{ N = {} }}", n, n);
                                store.commit(&content, &format!("writer{}", w)).unwrap().version
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            let versions = writers
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect();
            done.store(true, Ordering::SeqCst);
            assert!(reader.join().unwrap() > 0);
            versions
        });

        let total = WRITERS * COMMITS;
        let distinct: HashSet<_> = versions.iter().cloned().collect();
        assert_eq!(distinct.len(), total);
        assert_eq!(Some(&store.version()), versions.iter().max());

        let history = store.history(MAX_HISTORY_RESPONSE).unwrap();
        assert_eq!(history.len(), total);
        for pair in history.windows(2) {
            assert!(pair[0].version.is_newer(&pair[1].version));
        }
    }
}
