use snafu::Snafu;
use std::path::PathBuf;

/// Possible errors from synchronizing with a master.  None of these are ever shown to readers of
/// the local replica; they're absorbed into the `Stale` state and logged.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
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

    #[snafu(display("No masters configured"))]
    NoMasters,

    #[snafu(display("Unable to create client for master {}: {}", url, source))]
    ClientSetup {
        url: String,
        source: apiclient::Error,
    },

    #[snafu(display("Request to master {} failed: {}", url, source))]
    Transport {
        url: String,
        source: apiclient::Error,
    },

    #[snafu(display("Master {} didn't answer within {} seconds", url, secs))]
    Timeout { url: String, secs: u64 },

    #[snafu(display("All {} masters failed, last error: {}", count, last))]
    AllMastersFailed { count: usize, last: String },

    #[snafu(display("Unable to decompress version {}: {}", version, source))]
    Expand {
        version: String,
        source: datastore::Error,
    },

    #[snafu(display("Version {} doesn't parse: {}", version, source))]
    Parse {
        version: String,
        source: cfgtree::Error,
    },

    #[snafu(display("Failed to read cache file {}: {}", path.display(), source))]
    CacheRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to write cache file {}: {}", path.display(), source))]
    CacheWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Cache file {} is invalid: {}", path.display(), source))]
    CacheFormat {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Unable to serialize cache for {}: {}", path.display(), source))]
    CacheSerialize {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl Error {
    /// Whether asking the same master again later could succeed.  A master that rejects the
    /// request, or sends data that doesn't decompress or parse, needs an operator instead.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout { .. } | Error::AllMastersFailed { .. } => true,
            Error::Transport { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// The HTTP status a master answered with, if it answered.
    pub fn status(&self) -> Option<apiclient::StatusCode> {
        match self {
            Error::Transport { source, .. } => source.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
