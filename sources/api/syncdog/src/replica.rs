//! The slave's copy of the configuration, and the handle applications read it through.

use arc_swap::ArcSwap;
use cfgtree::ConfigNode;
use datastore::Version;
use std::sync::Arc;

/// One complete copy of the master's configuration, as of `version`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaSnapshot {
    /// None until something has been synced or loaded from cache.
    pub version: Option<Version>,
    pub tree: ConfigNode,
    /// The snapshot as the master sent it, so a replica endpoint can pass it on unchanged.
    pub compressed: Vec<u8>,
}

/// The latest good snapshot.  Only the sync loop replaces it, and it's replaced whole, so a
/// reader sees either the old tree or the new one.
#[derive(Debug)]
pub struct LocalReplica {
    current: ArcSwap<ReplicaSnapshot>,
}

impl Default for LocalReplica {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalReplica {
    /// An empty replica, for a slave that hasn't synced yet.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(ReplicaSnapshot::default()),
        }
    }

    pub fn load(&self) -> Arc<ReplicaSnapshot> {
        self.current.load_full()
    }

    pub fn version(&self) -> Option<Version> {
        self.current.load().version.clone()
    }

    pub(crate) fn replace(&self, snapshot: ReplicaSnapshot) {
        self.current.store(Arc::new(snapshot));
    }
}

/// Read access to a `LocalReplica` for application code.  Lookups always answer from the last
/// good snapshot, however old it is; sync failures never reach here.
#[derive(Debug, Clone)]
pub struct ConfigClient {
    replica: Arc<LocalReplica>,
}

impl ConfigClient {
    pub fn new(replica: Arc<LocalReplica>) -> Self {
        Self { replica }
    }

    /// The version being read from, if any has been synced.
    pub fn version(&self) -> Option<Version> {
        self.replica.version()
    }

    /// A consistent view of the whole tree.  Several lookups made through one snapshot can't
    /// straddle a sync.
    pub fn snapshot(&self) -> Arc<ReplicaSnapshot> {
        self.replica.load()
    }

    pub fn get_value<S: AsRef<str>>(&self, path: S) -> Option<String> {
        self.replica.load().tree.get_value(path).map(String::from)
    }

    pub fn get_list<S: AsRef<str>>(&self, path: S) -> Vec<String> {
        self.replica.load().tree.get_list(path)
    }

    pub fn get_section<S: AsRef<str>>(&self, path: S) -> Option<ConfigNode> {
        self.replica.load().tree.get_section(path).cloned()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;

    #[test]
    fn empty_replica() {
        let client = ConfigClient::new(Arc::new(LocalReplica::new()));
        assert_eq!(client.version(), None);
        assert_eq!(client.get_value("/A/X"), None);
        assert!(client.get_list("/A/L").is_empty());
        assert_eq!(client.get_section("/"), Some(ConfigNode::new()));
    }

    #[test]
    fn readers_see_replacement() {
        let replica = Arc::new(LocalReplica::new());
        let client = ConfigClient::new(replica.clone());
        let old = client.snapshot();

        let version = Version::next(&Version::initial(), "A { X = 1 }", Utc::now());
        replica.replace(ReplicaSnapshot {
            version: Some(version.clone()),
            tree: cfgtree::parse("A { X = 1\n L = a, b }").unwrap(),
            compressed: Vec::new(),
        });

        assert_eq!(client.version(), Some(version));
        assert_eq!(client.get_value("/A/X").as_deref(), Some("1"));
        assert_eq!(client.get_list("/A/L"), vec!["a", "b"]);
        assert!(client.get_section("/A").is_some());
        // A snapshot taken earlier is unaffected.
        assert!(old.tree.is_empty());
    }
}
