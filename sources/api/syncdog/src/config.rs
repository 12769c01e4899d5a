use crate::error::{self, Result};
use serde::Deserialize;
use snafu::{ensure, ResultExt};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a slave finds and polls its masters.  Shared by `syncdog` and the replica role of
/// `apiserver`, where it appears as the `[sync]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSettings {
    /// Master URLs, tried in order on each tick until one answers.
    pub masters: Vec<String>,

    /// Where this slave can be reached, if it should register itself with the master.
    #[serde(default)]
    pub self_url: Option<String>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_min_delay")]
    pub min_delay_secs: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_publish_every")]
    pub publish_every: u32,

    #[serde(default)]
    pub cache_path: Option<PathBuf>,
}

fn default_poll_interval() -> u64 {
    constants::POLL_INTERVAL_SECS
}

fn default_min_delay() -> u64 {
    constants::MIN_DELAY_SECS
}

fn default_max_delay() -> u64 {
    constants::MAX_DELAY_SECS
}

fn default_request_timeout() -> u64 {
    constants::REQUEST_TIMEOUT_SECS
}

fn default_publish_every() -> u32 {
    constants::PUBLISH_EVERY
}

impl SyncSettings {
    /// Settings for polling the given masters, with every timing left at its default.
    pub fn for_masters<I, S>(masters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            masters: masters.into_iter().map(Into::into).collect(),
            self_url: None,
            poll_interval_secs: default_poll_interval(),
            min_delay_secs: default_min_delay(),
            max_delay_secs: default_max_delay(),
            request_timeout_secs: default_request_timeout(),
            publish_every: default_publish_every(),
            cache_path: None,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).context(error::ConfigReadSnafu { path })?;
        let settings: SyncSettings =
            toml::from_str(&s).context(error::ConfigParseSnafu { path })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.masters.is_empty(), error::NoMastersSnafu);
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    const FULL_CONFIG: &str = r#"
    masters = ["http://10.0.0.1:9135", "http://10.0.0.2:9135"]
    self_url = "http://10.0.1.7:9135"
    poll_interval_secs = 15
    min_delay_secs = 2
    max_delay_secs = 120
    request_timeout_secs = 3
    publish_every = 4
    cache_path = "/var/cache/syncdog/snapshot.json"
    "#;

    #[test]
    fn full_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("syncdog.toml");
        std::fs::write(&path, FULL_CONFIG).unwrap();
        let settings = SyncSettings::from_file(&path).unwrap();
        assert_eq!(settings.masters.len(), 2);
        assert_eq!(settings.masters[1], "http://10.0.0.2:9135");
        assert_eq!(settings.self_url.as_deref(), Some("http://10.0.1.7:9135"));
        assert_eq!(settings.poll_interval_secs, 15);
        assert_eq!(settings.min_delay_secs, 2);
        assert_eq!(settings.max_delay_secs, 120);
        assert_eq!(settings.request_timeout(), Duration::from_secs(3));
        assert_eq!(settings.publish_every, 4);
        assert_eq!(
            settings.cache_path,
            Some(PathBuf::from("/var/cache/syncdog/snapshot.json"))
        );
    }

    #[test]
    fn defaults() {
        let settings: SyncSettings = toml::from_str(r#"masters = ["http://m:9135"]"#).unwrap();
        assert_eq!(settings, SyncSettings::for_masters(["http://m:9135"]));
    }

    #[test]
    fn no_masters() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("syncdog.toml");
        std::fs::write(&path, "masters = []").unwrap();
        assert!(matches!(
            SyncSettings::from_file(&path).unwrap_err(),
            error::Error::NoMasters
        ));
    }

    #[test]
    fn unknown_field() {
        assert!(toml::from_str::<SyncSettings>(
            r#"
            masters = ["http://m:9135"]
            poll_interval = 5
            "#
        )
        .is_err());
    }
}
