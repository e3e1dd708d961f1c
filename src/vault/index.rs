//! Session-local index of entry ids, kinds and versions.
//!
//! Rebuilt from the store's metadata whenever a session opens.  It
//! answers `ls` and the duplicate check in `add` without decrypting
//! anything, but it is never trusted for content integrity: `get`
//! cross-checks it against the envelope it fetches.

use std::collections::BTreeMap;

use super::entry::{EntryKind, EntryMeta};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultIndex {
    entries: BTreeMap<String, EntryMeta>,
}

impl VaultIndex {
    pub fn from_meta(entries: BTreeMap<String, EntryMeta>) -> Self {
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<EntryMeta> {
        self.entries.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn insert(&mut self, id: &str, meta: EntryMeta) {
        self.entries.insert(id.to_string(), meta);
    }

    pub fn remove(&mut self, id: &str) -> Option<EntryMeta> {
        self.entries.remove(id)
    }

    /// Entries sorted by id, optionally restricted to one kind.
    pub fn list(&self, kind: Option<EntryKind>) -> Vec<(String, EntryMeta)> {
        self.entries
            .iter()
            .filter(|(_, meta)| kind.map_or(true, |k| meta.kind == k))
            .map(|(id, meta)| (id.clone(), *meta))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
