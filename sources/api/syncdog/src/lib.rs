/*!
# Introduction

syncdog keeps a slave's copy of the configuration in step with a master.

A `Syncer` polls the master with "anything newer than my version?".  When the master is ahead
it sends the full compressed snapshot, which is decompressed and parsed before it replaces the
`LocalReplica`.  Anything that goes wrong along the way, from an unreachable master to a
truncated transfer, leaves the replica as it was and marks the syncer `Stale`; the next tick
tries again, backing off while failures continue.

Applications read through a `ConfigClient`, which always answers from the last good snapshot.

Masters are tried in the order they're configured.  If `self_url` is set, the slave also
registers itself with the master every few ticks so it can be nudged to poll early after a
commit.

# Configuration

The `syncdog` binary reads a TOML file (by default `/etc/cfgservice/syncdog.toml`):

```toml
masters = ["http://10.0.0.1:9135", "http://10.0.0.2:9135"]
poll_interval_secs = 30
cache_path = "/var/cache/syncdog/snapshot.json"
```
*/

mod backoff;
mod cache;
pub mod config;
mod connection;
mod error;
mod replica;
mod syncer;

pub use backoff::Backoff;
pub use config::SyncSettings;
pub use connection::{HttpMaster, MasterConnection};
pub use error::{Error, Result};
pub use replica::{ConfigClient, LocalReplica, ReplicaSnapshot};
pub use syncer::{SyncState, Syncer};
