//! Resume state: which remote items are already fully present on disk.
//!
//! The store is plain data. It performs no I/O of its own; the app crate
//! verifies files before inserting and persists snapshots between runs.
//! Entries are only added during a run, never removed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Mapping of item identifier → local path of a verified download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintStore {
    entries: BTreeMap<String, PathBuf>,
}

impl FingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a verified download. Returns `false` if the id was already known.
    pub fn insert(&mut self, id: impl Into<String>, path: impl Into<PathBuf>) -> bool {
        let id = id.into();
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, path.into());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Path> {
        self.entries.get(id).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .iter()
            .map(|(id, path)| (id.as_str(), path.as_path()))
    }

    /// Keep only the entries accepted by `keep`.
    ///
    /// Used when a persisted snapshot is reloaded and checked against disk,
    /// before the run starts.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Path) -> bool) {
        self.entries.retain(|id, path| keep(id, path));
    }
}
