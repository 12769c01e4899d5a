/*!
# Background

A CFG is the hierarchical, human-editable configuration format served by the configuration
server.  It's a tree of named sections, each holding options (`key = value`) and nested
sections, written with braces:

```text
# Comments attach to the entry that follows them
Systems
{
  Hosts = alpha, beta
  Database
  {
    Port = 3306
  }
}
```

# Library

[`ConfigNode`] is a section; its children are [`Item`]s, either a string value or another
section.  Insertion order is kept so that serialization is deterministic.  Option values are
plain strings; list-valued options are comma-separated strings, read back with
[`ConfigNode::get_list`].

The [`parse`] and [`serialize`] functions convert between text and trees, and
`parse(&serialize(&tree))` is always equal to `tree` for well-formed trees (names passing
[`validate_name`], values without line breaks, comment lines without surrounding whitespace).

[`merge`] overlays one tree onto another, and [`diff`] lists the paths that differ between
two trees.

Paths name entries from the root with `/` separators, like `/Systems/Database/Port`; the leading
slash is optional.
*/

mod diff;
pub mod error;
mod merge;
mod parse;
mod serialize;

pub use diff::{diff, Change, ChangeKind};
pub use error::{Error, Result};
pub use merge::merge;
pub use parse::parse;
pub use serialize::serialize;

use indexmap::IndexMap;
use snafu::{ensure, OptionExt};

pub const PATH_SEPARATOR: char = '/';

/// A child of a section: either an option's value, or a nested section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Value(String),
    Section(ConfigNode),
}

/// A named child of a section, along with the comment written above it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Comment lines, joined with newlines; empty if there is no comment.  The parser trims each
    /// line, so only comments without leading or trailing whitespace on any line survive a
    /// serialize/parse round trip unchanged.
    pub comment: String,
    pub item: Item,
}

impl Entry {
    fn new(item: Item) -> Self {
        Self {
            comment: String::new(),
            item,
        }
    }
}

/// A section of the configuration tree.  The root of a parsed CFG is a `ConfigNode` too.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigNode {
    entries: IndexMap<String, Entry>,
}

impl ConfigNode {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over the direct children of this section, in order.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Entry)> {
        self.entries.iter()
    }

    /// Returns the direct child with the given name.
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    /// Names of the direct child sections.
    pub fn sections(&self) -> impl Iterator<Item = &String> {
        self.entries
            .iter()
            .filter(|(_, e)| matches!(e.item, Item::Section(_)))
            .map(|(name, _)| name)
    }

    /// Names of the direct child options.
    pub fn options(&self) -> impl Iterator<Item = &String> {
        self.entries
            .iter()
            .filter(|(_, e)| matches!(e.item, Item::Value(_)))
            .map(|(name, _)| name)
    }

    /// Returns the item at the given path, if any.
    pub fn get<S: AsRef<str>>(&self, path: S) -> Option<&Item> {
        let segments = split_path(path.as_ref());
        let (last, parents) = segments.split_last()?;
        let mut section = self;
        for segment in parents {
            match &section.entries.get(*segment)?.item {
                Item::Section(s) => section = s,
                Item::Value(_) => return None,
            }
        }
        section.entries.get(*last).map(|e| &e.item)
    }

    /// Returns the value of the option at the given path.  Returns None if the path is missing
    /// or names a section.
    pub fn get_value<S: AsRef<str>>(&self, path: S) -> Option<&str> {
        match self.get(path)? {
            Item::Value(v) => Some(v),
            Item::Section(_) => None,
        }
    }

    /// Returns the option at the given path split into a list on commas, with whitespace trimmed
    /// and empty items dropped.  A missing option is an empty list.
    pub fn get_list<S: AsRef<str>>(&self, path: S) -> Vec<String> {
        self.get_value(path)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the section at the given path; the empty path is this section.
    pub fn get_section<S: AsRef<str>>(&self, path: S) -> Option<&ConfigNode> {
        if split_path(path.as_ref()).is_empty() {
            return Some(self);
        }
        match self.get(path)? {
            Item::Section(s) => Some(s),
            Item::Value(_) => None,
        }
    }

    /// Sets the option at the given path, creating any missing parent sections.  An existing
    /// entry at the path, option or section, is replaced, keeping its position and comment.
    pub fn set_value<S1, S2>(&mut self, path: S1, value: S2) -> Result<()>
    where
        S1: AsRef<str>,
        S2: AsRef<str>,
    {
        let path = path.as_ref();
        let value = check_value(path, value.as_ref())?;
        let (parent, name) = self.parent_for(path)?;
        match parent.entries.get_mut(name) {
            Some(entry) => entry.item = Item::Value(value),
            None => {
                parent
                    .entries
                    .insert(name.to_string(), Entry::new(Item::Value(value)));
            }
        }
        Ok(())
    }

    /// Sets the option at the given path to the comma-joined list of values.
    pub fn set_list<S1, S2>(&mut self, path: S1, values: &[S2]) -> Result<()>
    where
        S1: AsRef<str>,
        S2: AsRef<str>,
    {
        let joined = values
            .iter()
            .map(|v| v.as_ref().trim())
            .collect::<Vec<_>>()
            .join(", ");
        self.set_value(path, joined)
    }

    /// Adds a value to the end of the list option at the given path, creating it if needed.
    /// A section at the path is replaced by the option.
    pub fn append_value<S1, S2>(&mut self, path: S1, value: S2) -> Result<()>
    where
        S1: AsRef<str>,
        S2: AsRef<str>,
    {
        let path = path.as_ref();
        let value = check_value(path, value.as_ref())?;
        let (parent, name) = self.parent_for(path)?;
        parent.append_child(name, value);
        Ok(())
    }

    /// Returns the section at the given path, creating it and any missing parents.  An option
    /// in the way is an error.
    pub fn create_section<S: AsRef<str>>(&mut self, path: S) -> Result<&mut ConfigNode> {
        let path = path.as_ref();
        let segments = split_path(path);
        ensure!(!segments.is_empty(), error::EmptyPathSnafu);
        let mut section = self;
        for segment in segments {
            validate_name(segment)?;
            let entry = section
                .entries
                .entry(segment.to_string())
                .or_insert_with(|| Entry::new(Item::Section(ConfigNode::new())));
            section = match &mut entry.item {
                Item::Section(s) => s,
                Item::Value(_) => {
                    return error::PathConflictSnafu {
                        path,
                        option: segment,
                    }
                    .fail()
                }
            };
        }
        Ok(section)
    }

    /// Removes and returns the item at the given path.  Later siblings keep their order.
    pub fn remove<S: AsRef<str>>(&mut self, path: S) -> Option<Item> {
        let segments = split_path(path.as_ref());
        let (last, parents) = segments.split_last()?;
        let mut section = self;
        for segment in parents {
            match &mut section.entries.get_mut(*segment)?.item {
                Item::Section(s) => section = s,
                Item::Value(_) => return None,
            }
        }
        section.entries.shift_remove(*last).map(|e| e.item)
    }

    /// Sets the comment shown above the entry at the given path.
    pub fn set_comment<S1, S2>(&mut self, path: S1, comment: S2) -> Result<()>
    where
        S1: AsRef<str>,
        S2: AsRef<str>,
    {
        let path = path.as_ref();
        let segments = split_path(path);
        let (last, parents) = segments.split_last().context(error::EmptyPathSnafu)?;
        let mut section: &mut ConfigNode = self;
        for segment in parents {
            section = match section.entries.get_mut(*segment).map(|e| &mut e.item) {
                Some(Item::Section(s)) => s,
                Some(Item::Value(_)) => {
                    return error::PathConflictSnafu {
                        path,
                        option: *segment,
                    }
                    .fail()
                }
                None => return error::MissingPathSnafu { path }.fail(),
            };
        }
        let entry = section
            .entries
            .get_mut(*last)
            .context(error::MissingPathSnafu { path })?;
        entry.comment = comment
            .as_ref()
            .trim()
            .lines()
            .map(str::trim)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(())
    }

    /// Finds the section that holds the last segment of `path`, creating parents as needed, and
    /// returns it with the validated final name.
    fn parent_for<'a>(&mut self, path: &'a str) -> Result<(&mut ConfigNode, &'a str)> {
        let segments = split_path(path);
        let (last, parents) = segments.split_last().context(error::EmptyPathSnafu)?;
        let name: &'a str = *last;
        validate_name(name)?;
        let parent = if parents.is_empty() {
            self
        } else {
            self.create_section(parents.join("/"))?
        };
        Ok((parent, name))
    }

    // Child-level helpers shared with the parser and merge.

    pub(crate) fn insert_entry(&mut self, name: String, entry: Entry) {
        self.entries.insert(name, entry);
    }

    pub(crate) fn entry_mut(&mut self, name: &str) -> Option<&mut Entry> {
        self.entries.get_mut(name)
    }

    /// Appends to the named child option; returns whether an existing option was extended.
    pub(crate) fn append_child(&mut self, name: &str, value: String) -> bool {
        match self.entries.get_mut(name) {
            Some(Entry {
                item: Item::Value(existing),
                ..
            }) => {
                if existing.is_empty() {
                    *existing = value;
                } else if !value.is_empty() {
                    existing.push_str(", ");
                    existing.push_str(&value);
                }
                true
            }
            Some(entry) => {
                entry.item = Item::Value(value);
                false
            }
            None => {
                self.entries
                    .insert(name.to_string(), Entry::new(Item::Value(value)));
                false
            }
        }
    }
}

/// Splits a path into its non-empty segments, so "/a/b", "a/b" and "a//b/" are the same.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split(PATH_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Joins a parent path and a child name.
pub(crate) fn join_path(parent: &str, name: &str) -> String {
    format!("{}{}{}", parent, PATH_SEPARATOR, name)
}

/// Checks that a section or option name can be written to and read back from CFG text.
pub fn validate_name(name: &str) -> Result<()> {
    let fail = |msg: &str| {
        error::InvalidNameSnafu {
            name,
            msg: msg.to_string(),
        }
        .fail()
    };
    if name.is_empty() {
        return fail("names cannot be empty");
    }
    if name.trim() != name {
        return fail("names cannot start or end with whitespace");
    }
    if let Some(c) = name
        .chars()
        .find(|c| matches!(*c, '/' | '=' | '{' | '}' | '\\') || c.is_control())
    {
        return fail(&format!("names cannot contain {:?}", c));
    }
    if name.starts_with('#') || name.starts_with("//") {
        return fail("names cannot start with a comment marker");
    }
    if name.ends_with('+') {
        return fail("names cannot end with '+'");
    }
    Ok(())
}

fn check_value(path: &str, value: &str) -> Result<String> {
    ensure!(
        !value.contains(['\n', '\r']),
        error::InvalidValueSnafu {
            path,
            msg: "values cannot span lines",
        }
    );
    Ok(value.trim().to_string())
}
