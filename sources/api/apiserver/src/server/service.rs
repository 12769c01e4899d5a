//! The service module holds the operations the API exposes, independent of HTTP.  A server is
//! either the `Master`, which owns the versioned store, or a `Replica`, which answers reads from
//! a synced copy and refuses writes.

use apitypes::{
    CommitResponse, HistoryEntry, IfNewerResponse, PublishRequest, SlaveHandle, SnapshotResponse,
    Version, VersionContent,
};
use datastore::{summarize, Commit, FilesystemHistory, HistoryStore, IfNewer, VersionedStore};
use log::{debug, info, warn};
use snafu::{ensure, OptionExt, ResultExt};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use syncdog::LocalReplica;
use tokio::sync::Notify;
use url::Url;

use super::error::{self, Result};
use super::registry::SlaveRegistry;
use crate::config::ServerConfig;

/// Author recorded for the seed configuration.
pub const BOOTSTRAP_AUTHOR: &str = "bootstrap";

/// Every operation the API serves.  `identity` is the caller as established by the
/// authenticating transport, if it established one.
pub trait ConfigurationService: Send + Sync {
    fn get_version(&self) -> Version;

    fn get_compressed_data(&self) -> SnapshotResponse;

    /// Data is only included if this server's version is newer than `client_version`.  Anything
    /// that isn't a valid version counts as older than every version.  Fails if this server has
    /// nothing to offer yet, so a slave moves on to its next master.
    fn get_compressed_data_if_newer(&self, client_version: &str) -> Result<IfNewerResponse>;

    fn publish_slave_server(&self, request: PublishRequest) -> Result<()>;

    fn list_slaves(&self) -> Result<Vec<SlaveHandle>>;

    fn commit_new_data(&self, content: &str, identity: Option<&str>) -> Result<CommitResponse>;

    fn write_enabled(&self) -> bool;

    fn get_commit_history(&self, limit: usize) -> Result<Vec<HistoryEntry>>;

    fn get_version_contents(&self, versions: &[Version]) -> Result<Vec<VersionContent>>;

    fn rollback_to_version(
        &self,
        version: &Version,
        identity: Option<&str>,
    ) -> Result<CommitResponse>;

    /// Asks the server to bring itself up to date as soon as possible.
    fn refresh(&self);

    /// Slaves to nudge after a write.
    fn notify_targets(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Checks a slave's URL and registers it.
fn publish(registry: &SlaveRegistry, request: PublishRequest) -> Result<()> {
    ensure!(
        !request.url.is_empty(),
        error::EmptyInputSnafu { input: "url" }
    );
    Url::parse(&request.url).context(error::InvalidUrlSnafu { url: &request.url })?;
    registry.register(request.url, request.version)
}

fn commit_response(commit: Commit) -> CommitResponse {
    CommitResponse {
        summary: summarize(&commit.changes),
        version: commit.version,
    }
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// The write-enabled server holding the authoritative configuration.
pub struct Master<H> {
    store: VersionedStore<H>,
    registry: SlaveRegistry,
    writers: Vec<String>,
    notify_slaves: bool,
}

impl<H: HistoryStore> Master<H> {
    /// `writers` lists the identities allowed to commit; if it's empty, any identity may.
    pub fn new(store: VersionedStore<H>, registry: SlaveRegistry, writers: Vec<String>) -> Self {
        Self {
            store,
            registry,
            writers,
            notify_slaves: false,
        }
    }

    /// Whether live slaves should be nudged to sync after each write.
    pub fn with_notify(mut self, notify_slaves: bool) -> Self {
        self.notify_slaves = notify_slaves;
        self
    }

    pub fn store(&self) -> &VersionedStore<H> {
        &self.store
    }

    /// Commits the contents of `path` if nothing has ever been committed.
    pub fn seed<P: AsRef<Path>>(&self, path: P) -> Result<Option<Version>> {
        let path = path.as_ref();
        if self.store.version() != Version::initial() {
            debug!("Data store has history, not seeding from {}", path.display());
            return Ok(None);
        }
        let content = fs::read_to_string(path).context(error::SeedReadSnafu { path })?;
        let commit = self
            .store
            .commit(&content, BOOTSTRAP_AUTHOR)
            .context(error::SeedSnafu { path })?;
        info!("Seeded data store from {}", path.display());
        Ok(Some(commit.version))
    }

    /// Returns the identity if it may write.
    fn authorize<'a>(&self, identity: Option<&'a str>) -> Result<&'a str> {
        let identity = identity
            .filter(|i| !i.is_empty())
            .context(error::MissingIdentitySnafu)?;
        ensure!(
            self.writers.is_empty() || self.writers.iter().any(|w| w == identity),
            error::UnauthorizedSnafu { identity }
        );
        Ok(identity)
    }
}

impl Master<FilesystemHistory> {
    /// Opens the master's data store as configured, seeding it if it's empty.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let history = FilesystemHistory::new(&config.datastore_path);
        let store = VersionedStore::open(history)
            .context(error::OpenStoreSnafu {
                path: &config.datastore_path,
            })?
            .with_retention(config.history_retention);
        let master = Master::new(
            store,
            SlaveRegistry::new(config.slave_expiry()),
            config.writers.clone(),
        )
        .with_notify(config.notify_slaves);
        if let Some(seed_path) = &config.seed_path {
            master.seed(seed_path)?;
        }
        Ok(master)
    }
}

impl<H: HistoryStore + Send + Sync> ConfigurationService for Master<H> {
    fn get_version(&self) -> Version {
        self.store.version()
    }

    fn get_compressed_data(&self) -> SnapshotResponse {
        let snapshot = self.store.snapshot();
        SnapshotResponse {
            version: snapshot.version.clone(),
            data: snapshot.compressed().to_vec(),
        }
    }

    fn get_compressed_data_if_newer(&self, client_version: &str) -> Result<IfNewerResponse> {
        Ok(match self.store.snapshot_if_newer(client_version) {
            IfNewer::Current(version) => IfNewerResponse {
                newest_version: version,
                data: None,
            },
            IfNewer::Newer(snapshot) => IfNewerResponse {
                newest_version: snapshot.version.clone(),
                data: Some(snapshot.compressed().to_vec()),
            },
        })
    }

    fn publish_slave_server(&self, request: PublishRequest) -> Result<()> {
        publish(&self.registry, request)
    }

    fn list_slaves(&self) -> Result<Vec<SlaveHandle>> {
        self.registry.list()
    }

    fn commit_new_data(&self, content: &str, identity: Option<&str>) -> Result<CommitResponse> {
        let author = self.authorize(identity)?;
        let commit = self
            .store
            .commit(content, author)
            .context(error::DataStoreSnafu)?;
        Ok(commit_response(commit))
    }

    fn write_enabled(&self) -> bool {
        true
    }

    fn get_commit_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        self.store.history(limit).context(error::DataStoreSnafu)
    }

    fn get_version_contents(&self, versions: &[Version]) -> Result<Vec<VersionContent>> {
        let contents = self
            .store
            .version_contents(versions)
            .context(error::DataStoreSnafu)?;
        Ok(versions
            .iter()
            .cloned()
            .zip(contents)
            .map(|(version, content)| VersionContent { version, content })
            .collect())
    }

    fn rollback_to_version(
        &self,
        version: &Version,
        identity: Option<&str>,
    ) -> Result<CommitResponse> {
        let author = self.authorize(identity)?;
        let commit = self
            .store
            .rollback(version, author)
            .context(error::DataStoreSnafu)?;
        Ok(commit_response(commit))
    }

    fn refresh(&self) {
        debug!("Refresh requested, but the master is always current");
    }

    fn notify_targets(&self) -> Vec<String> {
        if !self.notify_slaves {
            return Vec::new();
        }
        self.registry.live_urls().unwrap_or_else(|e| {
            warn!("Unable to list slaves to notify: {}", e);
            Vec::new()
        })
    }
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// A read-only server answering from a replica that something else keeps in sync.  Other slaves
/// can poll and register with it as they would with the master.
pub struct Replica {
    replica: Arc<LocalReplica>,
    registry: SlaveRegistry,
    wake: Arc<Notify>,
}

impl Replica {
    /// `wake` is notified when someone asks for a refresh; normally it's the syncer's waker.
    pub fn new(replica: Arc<LocalReplica>, registry: SlaveRegistry, wake: Arc<Notify>) -> Self {
        Self {
            replica,
            registry,
            wake,
        }
    }
}

impl ConfigurationService for Replica {
    fn get_version(&self) -> Version {
        self.replica.version().unwrap_or_else(Version::initial)
    }

    fn get_compressed_data(&self) -> SnapshotResponse {
        let snapshot = self.replica.load();
        SnapshotResponse {
            version: snapshot.version.clone().unwrap_or_else(Version::initial),
            data: snapshot.compressed.clone(),
        }
    }

    fn get_compressed_data_if_newer(&self, client_version: &str) -> Result<IfNewerResponse> {
        let snapshot = self.replica.load();
        let version = snapshot.version.as_ref().context(error::NotSyncedSnafu)?;
        let newer = match client_version.parse::<Version>() {
            Ok(client) => version.is_newer(&client),
            Err(_) => true,
        };
        Ok(IfNewerResponse {
            newest_version: version.clone(),
            data: newer.then(|| snapshot.compressed.clone()),
        })
    }

    fn publish_slave_server(&self, request: PublishRequest) -> Result<()> {
        publish(&self.registry, request)
    }

    fn list_slaves(&self) -> Result<Vec<SlaveHandle>> {
        self.registry.list()
    }

    fn commit_new_data(&self, _content: &str, _identity: Option<&str>) -> Result<CommitResponse> {
        error::WriteDisabledSnafu.fail()
    }

    fn write_enabled(&self) -> bool {
        false
    }

    fn get_commit_history(&self, _limit: usize) -> Result<Vec<HistoryEntry>> {
        Ok(Vec::new())
    }

    fn get_version_contents(&self, versions: &[Version]) -> Result<Vec<VersionContent>> {
        match versions.first() {
            Some(version) => Err(error::Error::DataStore {
                source: datastore::error::VersionNotFoundSnafu {
                    version: version.as_str(),
                }
                .build(),
            }),
            None => Ok(Vec::new()),
        }
    }

    fn rollback_to_version(
        &self,
        _version: &Version,
        _identity: Option<&str>,
    ) -> Result<CommitResponse> {
        error::WriteDisabledSnafu.fail()
    }

    fn refresh(&self) {
        debug!("Refresh requested, waking the syncer");
        self.wake.notify_one();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use datastore::compression::expand_maybe;
    use datastore::MemoryHistory;
    use std::time::Duration;

    fn master(writers: &[&str]) -> Master<MemoryHistory> {
        let store = VersionedStore::open(MemoryHistory::new()).unwrap();
        Master::new(
            store,
            SlaveRegistry::new(Duration::from_secs(60)),
            writers.iter().map(|w| w.to_string()).collect(),
        )
    }

    #[test]
    fn scenario_commit_and_read_back() {
        let master = master(&[]);
        let v0 = master.get_version();

        let v1 = master
            .commit_new_data("A { X = 1 }", Some("alice"))
            .unwrap()
            .version;
        assert!(v1.is_newer(&v0));
        assert_eq!(master.get_version(), v1);

        let contents = master.get_version_contents(&[v1.clone()]).unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].version, v1);
        assert_eq!(
            cfgtree::parse(&contents[0].content).unwrap(),
            cfgtree::parse("A { X = 1 }").unwrap()
        );

        let history = master.get_commit_history(10).unwrap();
        assert_eq!(history[0].author, "alice");
    }

    #[test]
    fn scenario_if_newer() {
        let master = master(&[]);
        let v1 = master
            .commit_new_data("A { X = 1 }", Some("alice"))
            .unwrap()
            .version;
        let v2 = master
            .commit_new_data("A { X = 2 }", Some("alice"))
            .unwrap()
            .version;

        let response = master.get_compressed_data_if_newer(v1.as_str()).unwrap();
        assert_eq!(response.newest_version, v2);
        let text = expand_maybe(&response.data.unwrap()).unwrap();
        assert_eq!(cfgtree::parse(text).unwrap().get_value("/A/X"), Some("2"));

        let response = master.get_compressed_data_if_newer(v2.as_str()).unwrap();
        assert_eq!(response.newest_version, v2);
        assert_eq!(response.data, None);

        // Never-synced slaves send nothing useful.
        assert!(master
            .get_compressed_data_if_newer("")
            .unwrap()
            .data
            .is_some());
    }

    #[test]
    fn full_snapshot() {
        let master = master(&[]);
        let v1 = master
            .commit_new_data("A { X = 1 }", Some("alice"))
            .unwrap()
            .version;
        let snapshot = master.get_compressed_data();
        assert_eq!(snapshot.version, v1);
        let text = expand_maybe(&snapshot.data).unwrap();
        assert_eq!(cfgtree::parse(text).unwrap().get_value("/A/X"), Some("1"));
    }

    #[test]
    fn authorization() {
        let master = master(&["alice"]);
        assert!(master.write_enabled());
        assert!(matches!(
            master.commit_new_data("A = 1", None).unwrap_err(),
            error::Error::MissingIdentity
        ));
        assert!(matches!(
            master.commit_new_data("A = 1", Some("")).unwrap_err(),
            error::Error::MissingIdentity
        ));
        assert!(matches!(
            master.commit_new_data("A = 1", Some("mallory")).unwrap_err(),
            error::Error::Unauthorized { .. }
        ));
        let v1 = master.commit_new_data("A = 1", Some("alice")).unwrap().version;
        assert!(matches!(
            master.rollback_to_version(&v1, Some("mallory")).unwrap_err(),
            error::Error::Unauthorized { .. }
        ));
        assert_eq!(master.get_version(), v1);
    }

    #[test]
    fn invalid_content_changes_nothing() {
        let master = master(&[]);
        let v1 = master.commit_new_data("A = 1", Some("alice")).unwrap().version;
        let before = master.get_compressed_data();

        let err = master
            .commit_new_data("A { X = 1", Some("alice"))
            .unwrap_err();
        assert!(matches!(
            err,
            error::Error::DataStore {
                source: datastore::Error::InvalidContent { .. }
            }
        ));
        assert_eq!(master.get_version(), v1);
        assert_eq!(master.get_compressed_data(), before);
    }

    #[test]
    fn rollback_is_forward() {
        let master = master(&[]);
        let v1 = master
            .commit_new_data("A { X = 1 }", Some("alice"))
            .unwrap()
            .version;
        master
            .commit_new_data("A { X = 2 }", Some("bob"))
            .unwrap();
        let original = master.get_version_contents(&[v1.clone()]).unwrap();

        let response = master.rollback_to_version(&v1, Some("carol")).unwrap();
        assert!(response.version.is_newer(&v1));
        assert_eq!(response.summary, "0 added, 0 removed, 1 modified");
        assert_eq!(master.get_version(), response.version);
        assert_eq!(master.get_version_contents(&[v1]).unwrap(), original);
        assert_eq!(master.get_commit_history(10).unwrap().len(), 3);
    }

    #[test]
    fn missing_versions_fail_whole_request() {
        let master = master(&[]);
        let v1 = master.commit_new_data("A = 1", Some("alice")).unwrap().version;
        let missing = Version::next(&v1, "A = 9", chrono::Utc::now());

        let err = master
            .get_version_contents(&[v1, missing.clone()])
            .unwrap_err();
        assert!(err.to_string().contains(missing.as_str()));
    }

    #[test]
    fn publish_validates_url() {
        let master = master(&[]);
        assert!(matches!(
            master
                .publish_slave_server(PublishRequest {
                    url: "not a url".to_string(),
                    version: None,
                })
                .unwrap_err(),
            error::Error::InvalidUrl { .. }
        ));
        master
            .publish_slave_server(PublishRequest {
                url: "http://10.0.1.7:9135".to_string(),
                version: None,
            })
            .unwrap();
        assert_eq!(master.list_slaves().unwrap().len(), 1);
    }

    #[test]
    fn notify_targets_need_opt_in() {
        let master = master(&[]);
        master
            .publish_slave_server(PublishRequest {
                url: "http://10.0.1.7:9135".to_string(),
                version: None,
            })
            .unwrap();
        assert!(master.notify_targets().is_empty());

        let master = master.with_notify(true);
        assert_eq!(master.notify_targets(), vec!["http://10.0.1.7:9135"]);
    }

    #[test]
    fn seed_only_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path().join("seed.cfg");
        fs::write(&seed, "A { X = 1 }").unwrap();

        let master = master(&[]);
        let seeded = master.seed(&seed).unwrap().unwrap();
        assert_eq!(master.get_version(), seeded);
        assert_eq!(
            master.get_commit_history(1).unwrap()[0].author,
            BOOTSTRAP_AUTHOR
        );

        assert_eq!(master.seed(&seed).unwrap(), None);
        assert_eq!(master.get_version(), seeded);
    }

    #[test]
    fn from_config_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path().join("seed.cfg");
        fs::write(&seed, "A { X = 1 }").unwrap();
        let config = ServerConfig {
            datastore_path: dir.path().join("datastore"),
            seed_path: Some(seed),
            ..Default::default()
        };

        let first = Master::from_config(&config).unwrap();
        let v2 = first
            .commit_new_data("A { X = 2 }", Some("alice"))
            .unwrap()
            .version;
        drop(first);

        // The seed isn't applied again over existing history.
        let second = Master::from_config(&config).unwrap();
        assert_eq!(second.get_version(), v2);
        assert_eq!(second.get_commit_history(10).unwrap().len(), 2);
    }

    #[test]
    fn replica_reads_and_refuses_writes() {
        let local = Arc::new(LocalReplica::new());
        let wake = Arc::new(Notify::new());
        let replica = Replica::new(
            local,
            SlaveRegistry::new(Duration::from_secs(60)),
            wake.clone(),
        );

        assert!(!replica.write_enabled());
        assert_eq!(replica.get_version(), Version::initial());
        // An unsynced replica refuses, so slaves polling it move on to a real master.
        assert!(matches!(
            replica.get_compressed_data_if_newer("").unwrap_err(),
            error::Error::NotSynced
        ));

        assert!(matches!(
            replica.commit_new_data("A = 1", Some("alice")).unwrap_err(),
            error::Error::WriteDisabled
        ));
        assert!(matches!(
            replica
                .rollback_to_version(&Version::initial(), Some("alice"))
                .unwrap_err(),
            error::Error::WriteDisabled
        ));
        assert!(replica.get_commit_history(10).unwrap().is_empty());
        assert!(matches!(
            replica
                .get_version_contents(&[Version::initial()])
                .unwrap_err(),
            error::Error::DataStore {
                source: datastore::Error::VersionNotFound { .. }
            }
        ));
        assert!(replica.get_version_contents(&[]).unwrap().is_empty());
    }
}
