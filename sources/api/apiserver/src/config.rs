//! Settings for the `apiserver` binary, read from a TOML file.

use serde::Deserialize;
use snafu::{OptionExt, ResultExt};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use syncdog::SyncSettings;

mod error {
    use snafu::Snafu;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum Error {
        #[snafu(display("Failed to read config file {}: {}", path.display(), source))]
        ConfigRead {
            path: PathBuf,
            source: std::io::Error,
        },

        #[snafu(display("Failed to parse config file {}: {}", path.display(), source))]
        ConfigParse {
            path: PathBuf,
            source: toml::de::Error,
        },

        #[snafu(display("Replica role needs a [sync] table naming its masters"))]
        MissingSyncSettings,

        #[snafu(display("Invalid [sync] table: {}", source))]
        SyncSettings { source: syncdog::Error },
    }
}
pub use error::Error;
pub type Result<T> = std::result::Result<T, error::Error>;

/// Whether this server holds the authoritative configuration or follows another server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Master,
    Replica,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    #[serde(default)]
    pub role: Role,

    #[serde(default = "default_datastore_path")]
    pub datastore_path: PathBuf,

    /// Committed by "bootstrap" if the data store is empty at start.
    #[serde(default)]
    pub seed_path: Option<PathBuf>,

    /// Identities allowed to commit; empty means any authenticated identity.
    #[serde(default)]
    pub writers: Vec<String>,

    #[serde(default)]
    pub history_retention: Option<usize>,

    #[serde(default = "default_slave_expiry")]
    pub slave_expiry_secs: u64,

    #[serde(default)]
    pub notify_slaves: bool,

    #[serde(default = "default_threads")]
    pub threads: usize,

    #[serde(default)]
    pub sync: Option<SyncSettings>,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9135))
}

fn default_datastore_path() -> PathBuf {
    PathBuf::from(constants::DATASTORE_PATH)
}

fn default_slave_expiry() -> u64 {
    constants::SLAVE_EXPIRY_SECS
}

fn default_threads() -> usize {
    2
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            role: Role::default(),
            datastore_path: default_datastore_path(),
            seed_path: None,
            writers: Vec::new(),
            history_retention: None,
            slave_expiry_secs: default_slave_expiry(),
            notify_slaves: false,
            threads: default_threads(),
            sync: None,
        }
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).context(error::ConfigReadSnafu { path })?;
        let config: ServerConfig = toml::from_str(&s).context(error::ConfigParseSnafu { path })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.role == Role::Replica {
            self.sync_settings()?
                .validate()
                .context(error::SyncSettingsSnafu)?;
        }
        Ok(())
    }

    /// The `[sync]` table, which the replica role requires.
    pub fn sync_settings(&self) -> Result<&SyncSettings> {
        self.sync.as_ref().context(error::MissingSyncSettingsSnafu)
    }

    pub fn slave_expiry(&self) -> Duration {
        Duration::from_secs(self.slave_expiry_secs)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    const MASTER_CONFIG: &str = r#"
    listen = "0.0.0.0:9135"
    role = "master"
    datastore_path = "/srv/cfg"
    seed_path = "/etc/cfgservice/seed.cfg"
    writers = ["alice", "deploy-bot"]
    history_retention = 500
    notify_slaves = true
    threads = 4
    "#;

    const REPLICA_CONFIG: &str = r#"
    role = "replica"

    [sync]
    masters = ["http://10.0.0.1:9135"]
    self_url = "http://10.0.1.7:9135"
    "#;

    fn write(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("apiserver.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn master_config() {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig::from_file(write(&dir, MASTER_CONFIG)).unwrap();
        assert_eq!(config.listen, "0.0.0.0:9135".parse().unwrap());
        assert_eq!(config.role, Role::Master);
        assert_eq!(config.datastore_path, PathBuf::from("/srv/cfg"));
        assert_eq!(
            config.seed_path,
            Some(PathBuf::from("/etc/cfgservice/seed.cfg"))
        );
        assert_eq!(config.writers, vec!["alice", "deploy-bot"]);
        assert_eq!(config.history_retention, Some(500));
        assert_eq!(config.slave_expiry(), Duration::from_secs(constants::SLAVE_EXPIRY_SECS));
        assert!(config.notify_slaves);
        assert_eq!(config.threads, 4);
        assert_eq!(config.sync, None);
    }

    #[test]
    fn replica_config() {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig::from_file(write(&dir, REPLICA_CONFIG)).unwrap();
        assert_eq!(config.role, Role::Replica);
        let sync = config.sync.unwrap();
        assert_eq!(sync.masters, vec!["http://10.0.0.1:9135"]);
        assert_eq!(sync.self_url.as_deref(), Some("http://10.0.1.7:9135"));
    }

    #[test]
    fn empty_config_is_default_master() {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig::from_file(write(&dir, "")).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.listen.to_string(), constants::API_LISTEN_ADDR);
    }

    #[test]
    fn replica_needs_sync() {
        let dir = TempDir::new().unwrap();
        let err = ServerConfig::from_file(write(&dir, r#"role = "replica""#)).unwrap_err();
        assert!(matches!(err, Error::MissingSyncSettings));
    }

    #[test]
    fn bad_role() {
        let dir = TempDir::new().unwrap();
        let err = ServerConfig::from_file(write(&dir, r#"role = "leader""#)).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }
}
