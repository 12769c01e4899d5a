use snafu::Snafu;
use std::io;
use std::path::PathBuf;

/// Possible errors from datastore operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Invalid configuration content: {}", source))]
    InvalidContent { source: cfgtree::Error },

    #[snafu(display("Version '{}' not found in history", version))]
    VersionNotFound { version: String },

    #[snafu(display("Commit conflicts with concurrent change: {}", msg))]
    CommitConflict { msg: String },

    #[snafu(display("Version '{}' is invalid: {}", given, msg))]
    InvalidVersion { given: String, msg: String },

    #[snafu(display("Version would traverse outside data store: {}", name))]
    PathTraversal { name: String },

    #[snafu(display("IO error on '{}': {}", path.display(), source))]
    Io { path: PathBuf, source: io::Error },

    #[snafu(display("Unable to serialize history entry for {}: {}", version, source))]
    EntrySerialize {
        version: String,
        source: serde_json::Error,
    },

    #[snafu(display("Unable to parse history entry at {}: {}", path.display(), source))]
    EntryParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Data store integrity violation at {}: {}", path.display(), msg))]
    Corruption { msg: String, path: PathBuf },

    #[snafu(display("Stored content for version {} no longer parses: {}", version, source))]
    CorruptContent {
        version: String,
        source: cfgtree::Error,
    },

    #[snafu(display("Unable to compress snapshot: {}", source))]
    Compress { source: io::Error },

    #[snafu(display("Unable to decompress snapshot: {}", source))]
    Decompress { source: io::Error },

    #[snafu(display("Snapshot is not valid UTF-8: {}", source))]
    NonUnicodeSnapshot { source: std::string::FromUtf8Error },

    #[snafu(display("History lock poisoned"))]
    HistoryLock,
}

pub type Result<T> = std::result::Result<T, Error>;
