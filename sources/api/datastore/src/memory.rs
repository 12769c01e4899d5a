//! In-memory history for use in testing other modules, and for stores that don't need to survive
//! a restart.

use std::collections::BTreeMap;

use super::{HistoryEntry, HistoryStore, Result, Version};

#[derive(Debug, Default)]
pub struct MemoryHistory {
    // Version -> (metadata, content); BTreeMap keeps versions in commit order.
    entries: BTreeMap<Version, (HistoryEntry, String)>,
    current: Option<Version>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Default::default()
    }
}

impl HistoryStore for MemoryHistory {
    fn load_current(&self) -> Result<Option<(Version, String)>> {
        Ok(self.current.as_ref().and_then(|version| {
            self.entries
                .get(version)
                .map(|(_, content)| (version.clone(), content.clone()))
        }))
    }

    fn append(&mut self, entry: &HistoryEntry, content: &str) -> Result<()> {
        self.entries.insert(
            entry.version.clone(),
            (entry.clone(), content.to_string()),
        );
        Ok(())
    }

    fn set_current(&mut self, version: &Version) -> Result<()> {
        self.current = Some(version.clone());
        Ok(())
    }

    fn list_versions(&self) -> Result<Vec<Version>> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn get_entry(&self, version: &Version) -> Result<Option<HistoryEntry>> {
        Ok(self.entries.get(version).map(|(entry, _)| entry.clone()))
    }

    fn get_content(&self, version: &Version) -> Result<Option<String>> {
        Ok(self
            .entries
            .get(version)
            .map(|(_, content)| content.clone()))
    }

    fn remove(&mut self, version: &Version) -> Result<()> {
        self.entries.remove(version);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;

    #[test]
    fn append_and_read() {
        let mut h = MemoryHistory::new();
        assert_eq!(h.load_current().unwrap(), None);

        let version = Version::next(&Version::initial(), "A = 1", Utc::now());
        let entry = HistoryEntry {
            version: version.clone(),
            author: "alice".into(),
            timestamp: Utc::now(),
        };
        h.append(&entry, "A = 1").unwrap();
        // Not current until the marker moves.
        assert_eq!(h.load_current().unwrap(), None);
        h.set_current(&version).unwrap();

        assert_eq!(
            h.load_current().unwrap(),
            Some((version.clone(), "A = 1".to_string()))
        );
        assert_eq!(h.get_entry(&version).unwrap(), Some(entry));
        assert_eq!(h.list_versions().unwrap(), vec![version.clone()]);

        h.remove(&version).unwrap();
        h.remove(&version).unwrap();
        assert_eq!(h.get_content(&version).unwrap(), None);
    }
}
