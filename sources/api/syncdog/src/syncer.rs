//! The sync loop.  Each tick asks the masters, in order, for anything newer than the local
//! replica, and swaps in what comes back once it has decompressed and parsed cleanly.

use cfgtree::parse;
use datastore::compression::expand_maybe;
use datastore::Version;
use log::{debug, error, info, trace, warn};
use snafu::{OptionExt, ResultExt};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{sleep, sleep_until, timeout, Instant};

use crate::backoff::Backoff;
use crate::cache;
use crate::config::SyncSettings;
use crate::connection::{HttpMaster, MasterConnection};
use crate::error::{self, Result};
use crate::replica::{LocalReplica, ReplicaSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No tick has run yet.
    Uninitialized,
    /// A tick is in progress.
    Syncing,
    /// The last tick reached a master and the replica matches it.
    Synced,
    /// The last tick failed; the replica holds the last good snapshot, if any.
    Stale,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Uninitialized => "uninitialized",
            SyncState::Syncing => "syncing",
            SyncState::Synced => "synced",
            SyncState::Stale => "stale",
        };
        f.write_str(name)
    }
}

/// Keeps a `LocalReplica` up to date with a master.  Only one tick runs at a time because
/// `tick` takes `&mut self`.
pub struct Syncer {
    masters: Vec<Arc<dyn MasterConnection>>,
    replica: Arc<LocalReplica>,
    backoff: Backoff,
    request_timeout: Duration,
    self_url: Option<String>,
    publish_every: u64,
    cache_path: Option<PathBuf>,
    state: watch::Sender<SyncState>,
    wake: Arc<Notify>,
    failures: u32,
    ticks: u64,
}

impl Syncer {
    pub fn new(
        settings: &SyncSettings,
        masters: Vec<Arc<dyn MasterConnection>>,
        replica: Arc<LocalReplica>,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Uninitialized);
        Self {
            masters,
            replica,
            backoff: Backoff::from_settings(settings),
            request_timeout: settings.request_timeout(),
            self_url: settings.self_url.clone(),
            publish_every: u64::from(settings.publish_every.max(1)),
            cache_path: settings.cache_path.clone(),
            state,
            wake: Arc::new(Notify::new()),
            failures: 0,
            ticks: 0,
        }
    }

    /// Creates a syncer that talks to the configured masters over HTTP, and seeds the replica
    /// from the cache file if there is one.
    pub fn connect(settings: &SyncSettings, replica: Arc<LocalReplica>) -> Result<Self> {
        settings.validate()?;
        let masters = settings
            .masters
            .iter()
            .map(|url| {
                HttpMaster::new(url, settings.request_timeout())
                    .map(|m| Arc::new(m) as Arc<dyn MasterConnection>)
            })
            .collect::<Result<Vec<_>>>()?;
        let syncer = Self::new(settings, masters, replica);
        syncer.restore_from_cache();
        Ok(syncer)
    }

    /// Loads the cached snapshot into the replica, unless the replica already has a version.
    /// A missing or unreadable cache leaves the replica empty.
    pub fn restore_from_cache(&self) {
        let path = match &self.cache_path {
            Some(path) => path,
            None => return,
        };
        if self.replica.version().is_some() {
            return;
        }
        match cache::load(path) {
            Ok(Some(snapshot)) => {
                info!(
                    "Serving cached version {} until the first sync",
                    snapshot.version.as_ref().map(Version::as_str).unwrap_or("-")
                );
                self.replica.replace(snapshot);
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring cached snapshot: {}", e),
        }
    }

    pub fn replica(&self) -> Arc<LocalReplica> {
        self.replica.clone()
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Watches state changes; useful for health checks.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Notifying the returned handle makes `run` poll early instead of waiting out the current
    /// delay.  Polls are still never closer together than the backoff floor, and while the
    /// masters are failing a wake-up doesn't shorten the backoff delay at all.
    pub fn waker(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    /// How long `run` waits after the latest tick.
    pub fn next_delay(&self) -> Duration {
        self.backoff.delay(self.failures)
    }

    /// The shortest time after the latest tick that a wake-up may start the next one.
    pub fn min_wake_delay(&self) -> Duration {
        if self.failures > 0 {
            self.next_delay()
        } else {
            self.backoff.floor()
        }
    }

    /// Runs one poll against the masters and returns the resulting state, `Synced` or `Stale`.
    pub async fn tick(&mut self) -> SyncState {
        let previous = self.state();
        self.state.send_replace(SyncState::Syncing);
        self.ticks += 1;

        let answered = match self.pull().await {
            Ok(index) => {
                self.failures = 0;
                Some(index)
            }
            Err(e) => {
                self.failures = self.failures.saturating_add(1);
                warn!(
                    "Sync failed ({} in a row), keeping version {}: {}",
                    self.failures,
                    self.replica
                        .version()
                        .as_ref()
                        .map(Version::as_str)
                        .unwrap_or("-"),
                    e
                );
                None
            }
        };
        let state = if answered.is_some() {
            SyncState::Synced
        } else {
            SyncState::Stale
        };
        if state != previous {
            info!("Sync state {} -> {}", previous, state);
        }
        self.state.send_replace(state);

        if self.self_url.is_some() && (self.ticks - 1) % self.publish_every == 0 {
            self.publish(answered.unwrap_or(0)).await;
        }
        state
    }

    /// Polls forever, sleeping between ticks as the backoff policy says.
    pub async fn run(mut self) {
        let wake = self.wake.clone();
        loop {
            self.tick().await;
            let finished = Instant::now();
            let delay = self.next_delay();
            debug!("Next poll in {}s", delay.as_secs());
            tokio::select! {
                _ = sleep(delay) => {}
                _ = wake.notified() => {
                    let earliest = finished + self.min_wake_delay();
                    debug!(
                        "Woken for an early poll, starting in {}s",
                        earliest.saturating_duration_since(Instant::now()).as_secs()
                    );
                    sleep_until(earliest).await;
                }
            }
        }
    }

    /// Tries each master in order; returns the index of the one that answered.
    async fn pull(&self) -> Result<usize> {
        let local = self.replica.version();
        let mut last_error = None;
        for (index, master) in self.masters.iter().enumerate() {
            match self.pull_from(master.as_ref(), local.as_ref()).await {
                Ok(()) => return Ok(index),
                Err(e) if e.is_transient() => {
                    debug!("Master {} failed: {}", master.url(), e);
                    last_error = Some(e);
                }
                Err(e) => {
                    match e.status() {
                        Some(status) => error!(
                            "Master {} refused to sync ({}), trying the next one: {}",
                            master.url(),
                            status,
                            e
                        ),
                        None => error!(
                            "Master {} sent unusable data, trying the next one: {}",
                            master.url(),
                            e
                        ),
                    }
                    last_error = Some(e);
                }
            }
        }
        error::AllMastersFailedSnafu {
            count: self.masters.len(),
            last: last_error.map(|e| e.to_string()).unwrap_or_default(),
        }
        .fail()
    }

    async fn pull_from(
        &self,
        master: &dyn MasterConnection,
        local: Option<&Version>,
    ) -> Result<()> {
        let response = timeout(self.request_timeout, master.data_if_newer(local))
            .await
            .ok()
            .context(error::TimeoutSnafu {
                url: master.url(),
                secs: self.request_timeout.as_secs(),
            })??;

        let data = match response.data {
            Some(data) => data,
            None => {
                trace!("Already at version {}", response.newest_version);
                return Ok(());
            }
        };
        if let Some(local) = local {
            if !response.newest_version.is_newer(local) {
                debug!(
                    "Ignoring version {} from {}, not newer than {}",
                    response.newest_version,
                    master.url(),
                    local
                );
                return Ok(());
            }
        }

        let snapshot = expand(response.newest_version, data)?;
        if let Some(path) = &self.cache_path {
            if let Err(e) = cache::store(path, &snapshot) {
                warn!("Unable to update cached snapshot: {}", e);
            }
        }
        info!(
            "Synced version {} from {}",
            snapshot.version.as_ref().map(Version::as_str).unwrap_or("-"),
            master.url()
        );
        self.replica.replace(snapshot);
        Ok(())
    }

    async fn publish(&self, index: usize) {
        let (self_url, master) = match (&self.self_url, self.masters.get(index)) {
            (Some(self_url), Some(master)) => (self_url, master),
            _ => return,
        };
        let version = self.replica.version();
        match timeout(self.request_timeout, master.publish(self_url, version)).await {
            Ok(Ok(())) => debug!("Published {} to {}", self_url, master.url()),
            Ok(Err(e)) => warn!("Failed to publish {} to {}: {}", self_url, master.url(), e),
            Err(_) => warn!("Timed out publishing {} to {}", self_url, master.url()),
        }
    }
}

/// Turns a snapshot as received from a master into a replica snapshot.  Fails without side
/// effects if the data doesn't decompress or parse.
pub(crate) fn expand(version: Version, compressed: Vec<u8>) -> Result<ReplicaSnapshot> {
    let text = expand_maybe(&compressed).context(error::ExpandSnafu {
        version: version.as_str(),
    })?;
    let tree = parse(&text).context(error::ParseSnafu {
        version: version.as_str(),
    })?;
    Ok(ReplicaSnapshot {
        version: Some(version),
        tree,
        compressed,
    })
}
