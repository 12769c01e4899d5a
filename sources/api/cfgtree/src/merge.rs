//! Merging overlays one tree onto another.  Sections merge recursively, options from the overlay
//! replace options of the same name, and nothing from the base is dropped unless the overlay
//! replaces it.

use super::{ConfigNode, Item};

/// Returns a new tree with `overlay` merged into a copy of `base`.
pub fn merge(base: &ConfigNode, overlay: &ConfigNode) -> ConfigNode {
    let mut merged = base.clone();
    merged.merge_from(overlay);
    merged
}

impl ConfigNode {
    /// Merges `overlay` into this tree in place.  New entries are added after existing ones;
    /// an entry whose kind changes (option to section or back) is replaced by the overlay's.
    pub fn merge_from(&mut self, overlay: &ConfigNode) {
        for (name, theirs) in overlay.entries() {
            let Some(ours) = self.entry_mut(name) else {
                self.insert_entry(name.clone(), theirs.clone());
                continue;
            };
            if !theirs.comment.is_empty() {
                ours.comment = theirs.comment.clone();
            }
            match (&mut ours.item, &theirs.item) {
                (Item::Section(our_section), Item::Section(their_section)) => {
                    our_section.merge_from(their_section);
                }
                (ours_item, theirs_item) => *ours_item = theirs_item.clone(),
            }
        }
    }
}
