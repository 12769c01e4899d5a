//! The slave registry records which slaves have announced themselves, so an operator can see who
//! is following this server and so commits can be pushed to them early.  It has its own lock,
//! unrelated to the data store's.

use apitypes::{SlaveHandle, Version};
use chrono::{DateTime, Utc};
use log::{debug, info};
use snafu::OptionExt;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use super::error::{self, Result};

#[derive(Debug)]
pub struct SlaveRegistry {
    slaves: RwLock<HashMap<String, SlaveHandle>>,
    expiry: Duration,
}

impl SlaveRegistry {
    /// Slaves silent for longer than `expiry` are forgotten.
    pub fn new(expiry: Duration) -> Self {
        Self {
            slaves: RwLock::new(HashMap::new()),
            expiry,
        }
    }

    /// Adds the slave at `url`, or refreshes it if it's already known.
    pub fn register(&self, url: String, version: Option<Version>) -> Result<()> {
        self.register_at(url, version, Utc::now())
    }

    /// Known slaves, ordered by URL.
    pub fn list(&self) -> Result<Vec<SlaveHandle>> {
        self.list_at(Utc::now())
    }

    /// URLs of the slaves that haven't expired.
    pub fn live_urls(&self) -> Result<Vec<String>> {
        Ok(self.list()?.into_iter().map(|h| h.url).collect())
    }

    fn register_at(&self, url: String, version: Option<Version>, now: DateTime<Utc>) -> Result<()> {
        let mut slaves = self.slaves.write().ok().context(error::RegistryLockSnafu)?;
        self.prune(&mut slaves, now);
        match slaves.get_mut(&url) {
            Some(handle) => {
                debug!("Slave {} checked in", url);
                handle.last_seen = now;
                handle.version = version;
            }
            None => {
                info!("Slave {} registered", url);
                slaves.insert(
                    url.clone(),
                    SlaveHandle {
                        url,
                        last_seen: now,
                        version,
                    },
                );
            }
        }
        Ok(())
    }

    fn list_at(&self, now: DateTime<Utc>) -> Result<Vec<SlaveHandle>> {
        let mut slaves = self.slaves.write().ok().context(error::RegistryLockSnafu)?;
        self.prune(&mut slaves, now);

        let mut handles: Vec<_> = slaves.values().cloned().collect();
        handles.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(handles)
    }

    fn prune(&self, slaves: &mut HashMap<String, SlaveHandle>, now: DateTime<Utc>) {
        slaves.retain(|url, handle| {
            // A last-seen time in the future means the clock moved back; keep those.
            let expired = (now - handle.last_seen)
                .to_std()
                .map(|age| age > self.expiry)
                .unwrap_or(false);
            if expired {
                info!("Slave {} expired", url);
            }
            !expired
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn version(text: &str) -> Version {
        Version::next(&Version::initial(), text, Utc::now())
    }

    #[test]
    fn register_is_idempotent() {
        let registry = SlaveRegistry::new(Duration::from_secs(60));
        let v1 = version("A = 1");
        registry.register("http://b".to_string(), None).unwrap();
        registry
            .register("http://a".to_string(), Some(v1.clone()))
            .unwrap();
        registry
            .register("http://a".to_string(), Some(v1.clone()))
            .unwrap();

        let slaves = registry.list().unwrap();
        assert_eq!(slaves.len(), 2);
        assert_eq!(slaves[0].url, "http://a");
        assert_eq!(slaves[0].version, Some(v1));
        assert_eq!(slaves[1].url, "http://b");
        assert_eq!(slaves[1].version, None);
    }

    #[test]
    fn refresh_updates_version_and_time() {
        let registry = SlaveRegistry::new(Duration::from_secs(60));
        let start = Utc::now();
        let later = start + chrono::Duration::seconds(30);
        let v2 = version("A = 2");
        registry
            .register_at("http://a".to_string(), None, start)
            .unwrap();
        registry
            .register_at("http://a".to_string(), Some(v2.clone()), later)
            .unwrap();

        let slaves = registry.list_at(later).unwrap();
        assert_eq!(slaves[0].last_seen, later);
        assert_eq!(slaves[0].version, Some(v2));
    }

    #[test]
    fn expiry() {
        let registry = SlaveRegistry::new(Duration::from_secs(60));
        let start = Utc::now();
        registry
            .register_at("http://old".to_string(), None, start)
            .unwrap();
        registry
            .register_at(
                "http://new".to_string(),
                None,
                start + chrono::Duration::seconds(50),
            )
            .unwrap();

        let check = start + chrono::Duration::seconds(90);
        let urls: Vec<_> = registry
            .list_at(check)
            .unwrap()
            .into_iter()
            .map(|h| h.url)
            .collect();
        assert_eq!(urls, vec!["http://new"]);

        // Expired slaves come back when they check in again.
        registry
            .register_at("http://old".to_string(), None, check)
            .unwrap();
        assert_eq!(registry.list_at(check).unwrap().len(), 2);
    }

    #[test]
    fn registering_prunes_expired() {
        let registry = SlaveRegistry::new(Duration::from_secs(60));
        let start = Utc::now();
        for i in 0..50 {
            registry
                .register_at(format!("http://old-{}", i), None, start)
                .unwrap();
        }
        registry
            .register_at(
                "http://new".to_string(),
                None,
                start + chrono::Duration::seconds(90),
            )
            .unwrap();
        assert_eq!(registry.slaves.read().unwrap().len(), 1);
    }
}
