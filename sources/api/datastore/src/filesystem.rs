//! This implementation of the HistoryStore trait relies on the filesystem.
//!
//! Each committed version is kept as two files under `history/`: `<version>.cfg` holds the
//! content and `<version>.json` the author and timestamp.  The `.json` file is written last, so a
//! version is only listed once its content is in place.  A `current` file next to `history/`
//! names the current version; it's replaced with a rename so it's never seen half-written.

use log::{debug, trace, warn};
use snafu::{ensure, OptionExt, ResultExt};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{error, HistoryEntry, HistoryStore, Result, Version};

const HISTORY_DIR: &str = "history";
const CURRENT_MARKER: &str = "current";
const CONTENT_EXTENSION: &str = "cfg";
const ENTRY_EXTENSION: &str = "json";

#[derive(Debug)]
pub struct FilesystemHistory {
    history_path: PathBuf,
    marker_path: PathBuf,
}

impl FilesystemHistory {
    pub fn new<P: AsRef<Path>>(base_path: P) -> FilesystemHistory {
        FilesystemHistory {
            history_path: base_path.as_ref().join(HISTORY_DIR),
            marker_path: base_path.as_ref().join(CURRENT_MARKER),
        }
    }

    /// Returns the path on the filesystem for one of a version's files.
    fn version_path(&self, version: &Version, extension: &str) -> Result<PathBuf> {
        let path = self
            .history_path
            .join(format!("{}.{}", version.as_str(), extension));

        // Confirm no path traversal outside of the history directory
        ensure!(
            path.parent() == Some(self.history_path.as_path()),
            error::PathTraversalSnafu {
                name: version.as_str()
            }
        );

        Ok(path)
    }
}

/// Helper for reading a file.  Returns Ok(None) if the file doesn't exist rather than erroring.
fn read_file_maybe(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).context(error::IoSnafu { path }),
    }
}

/// Helper for writing a file that makes the parent directory beforehand.  The data is written to
/// a temporary name and renamed into place.
fn write_file_atomic<S: AsRef<[u8]>>(path: &Path, data: S) -> Result<()> {
    let dirname = path.parent().context(error::CorruptionSnafu {
        msg: "path to write has no parent directory",
        path,
    })?;
    fs::create_dir_all(dirname).context(error::IoSnafu { path: dirname })?;

    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);
    fs::write(&tmp_path, data).context(error::IoSnafu { path: &tmp_path })?;
    fs::rename(&tmp_path, path).context(error::IoSnafu { path })
}

fn remove_file_maybe(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).context(error::IoSnafu { path }),
    }
}

impl HistoryStore for FilesystemHistory {
    fn load_current(&self) -> Result<Option<(Version, String)>> {
        let marker = match read_file_maybe(&self.marker_path)? {
            Some(marker) => marker,
            None => {
                debug!(
                    "No current-version marker at {}, history is empty",
                    self.marker_path.display()
                );
                return Ok(None);
            }
        };
        let version: Version = marker
            .trim()
            .parse()
            .map_err(|e: error::Error| error::Error::Corruption {
                msg: e.to_string(),
                path: self.marker_path.clone(),
            })?;

        let content_path = self.version_path(&version, CONTENT_EXTENSION)?;
        let content = read_file_maybe(&content_path)?.context(error::CorruptionSnafu {
            msg: format!("current version {} has no content", version),
            path: &content_path,
        })?;
        Ok(Some((version, content)))
    }

    fn append(&mut self, entry: &HistoryEntry, content: &str) -> Result<()> {
        let content_path = self.version_path(&entry.version, CONTENT_EXTENSION)?;
        let entry_path = self.version_path(&entry.version, ENTRY_EXTENSION)?;
        let serialized = serde_json::to_string(entry).context(error::EntrySerializeSnafu {
            version: entry.version.as_str(),
        })?;

        trace!("Writing history content to {}", content_path.display());
        write_file_atomic(&content_path, content)?;
        write_file_atomic(&entry_path, serialized)
    }

    fn set_current(&mut self, version: &Version) -> Result<()> {
        write_file_atomic(&self.marker_path, version.as_str())
    }

    fn list_versions(&self) -> Result<Vec<Version>> {
        let dir = match fs::read_dir(&self.history_path) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).context(error::IoSnafu {
                    path: &self.history_path,
                })
            }
        };

        let mut versions = Vec::new();
        for entry in dir {
            let entry = entry.context(error::IoSnafu {
                path: &self.history_path,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let stem = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem,
                None => {
                    warn!("Skipping non-Unicode history file {}", path.display());
                    continue;
                }
            };
            match stem.parse::<Version>() {
                Ok(version) => versions.push(version),
                Err(e) => warn!("Skipping unexpected history file {}: {}", path.display(), e),
            }
        }
        versions.sort();
        Ok(versions)
    }

    fn get_entry(&self, version: &Version) -> Result<Option<HistoryEntry>> {
        let path = self.version_path(version, ENTRY_EXTENSION)?;
        match read_file_maybe(&path)? {
            Some(data) => serde_json::from_str(&data)
                .map(Some)
                .context(error::EntryParseSnafu { path }),
            None => Ok(None),
        }
    }

    fn get_content(&self, version: &Version) -> Result<Option<String>> {
        // A version whose entry is gone has been pruned, even if removing its content failed.
        let entry_path = self.version_path(version, ENTRY_EXTENSION)?;
        if !entry_path.exists() {
            return Ok(None);
        }
        read_file_maybe(&self.version_path(version, CONTENT_EXTENSION)?)
    }

    fn remove(&mut self, version: &Version) -> Result<()> {
        // Entry first, so a half-removed version is no longer listed.
        remove_file_maybe(&self.version_path(version, ENTRY_EXTENSION)?)?;
        remove_file_maybe(&self.version_path(version, CONTENT_EXTENSION)?)
    }
}
