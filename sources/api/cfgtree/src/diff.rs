//! Structural comparison of two trees.  Comments and ordering aren't considered; only which
//! paths exist and what values they hold.

use super::{join_path, ConfigNode, Item};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// One difference between two trees.  An added or removed section is reported once, at the
/// section's path, rather than once per entry inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Change {
    pub kind: ChangeKind,
    pub path: String,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.kind {
            ChangeKind::Added => '+',
            ChangeKind::Removed => '-',
            ChangeKind::Modified => '~',
        };
        write!(f, "{} {}", marker, self.path)
    }
}

/// Lists the differences from `old` to `new`.  Entries are visited in `old`'s order, followed by
/// entries that only exist in `new`.
pub fn diff(old: &ConfigNode, new: &ConfigNode) -> Vec<Change> {
    let mut changes = Vec::new();
    diff_section("", old, new, &mut changes);
    changes
}

fn diff_section(prefix: &str, old: &ConfigNode, new: &ConfigNode, changes: &mut Vec<Change>) {
    let mut push = |kind, path| changes.push(Change { kind, path });
    let mut nested = Vec::new();

    for (name, old_entry) in old.entries() {
        let path = join_path(prefix, name);
        match (new.entry(name).map(|e| &e.item), &old_entry.item) {
            (None, _) => push(ChangeKind::Removed, path),
            (Some(Item::Section(new_section)), Item::Section(old_section)) => {
                nested.push((path, old_section, new_section));
            }
            (Some(Item::Value(new_value)), Item::Value(old_value)) => {
                if new_value != old_value {
                    push(ChangeKind::Modified, path);
                }
            }
            (Some(_), _) => push(ChangeKind::Modified, path),
        }
    }
    for (name, _) in new.entries() {
        if old.entry(name).is_none() {
            push(ChangeKind::Added, join_path(prefix, name));
        }
    }

    for (path, old_section, new_section) in nested {
        diff_section(&path, old_section, new_section, changes);
    }
}
