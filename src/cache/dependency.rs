//! Persistent dependency snapshot store.
//!
//! The store holds the last committed pointer → hash table in a single
//! `snapshot.json`. `evaluate` diffs a freshly computed snapshot against
//! the stored one without persisting; `commit` atomically replaces the
//! file. A failed build therefore leaves the previous snapshot intact and
//! the next build re-considers all changes.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{cache::write_atomic, digest::TokenDigest, errors::Result, pointer::TokenPointer};

const SNAPSHOT_VERSION: u32 = 1;

/// The pointer → hash table produced by one run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DependencySnapshot {
    pub version: u32,
    pub resolved_at: DateTime<Utc>,
    pub entries: Vec<DependencyEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEntry {
    pub pointer: TokenPointer,
    pub hash: TokenDigest,
}

impl DependencySnapshot {
    pub fn new(entries: Vec<DependencyEntry>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            resolved_at: Utc::now(),
            entries,
        }
    }

    fn as_map(&self) -> BTreeMap<&TokenPointer, &TokenDigest> {
        self.entries.iter().map(|e| (&e.pointer, &e.hash)).collect()
    }
}

/// Pointer sets distinguishing changed and removed tokens between runs.
///
/// `changed` contains new, modified and removed pointers alike; removal
/// also invalidates downstream consumers, so removed pointers appear in
/// both sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyDiff {
    pub changed: BTreeSet<TokenPointer>,
    pub removed: BTreeSet<TokenPointer>,
}

impl DependencyDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Store for the committed dependency snapshot.
pub struct DependencyStore {
    path: PathBuf,
}

impl DependencyStore {
    /// `dir` is usually `<config>/.dtifx-cache/dependencies`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join("snapshot.json"),
        }
    }

    /// Load the committed snapshot; absent or corrupt files read as empty.
    pub fn load(&self) -> Option<DependencySnapshot> {
        let bytes = std::fs::read(&self.path).ok()?;
        match serde_json::from_slice::<DependencySnapshot>(&bytes) {
            Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => Some(snapshot),
            Ok(_) => None,
            Err(err) => {
                debug!("dependency snapshot {} unreadable: {err}", self.path.display());
                None
            }
        }
    }

    /// Diff a new snapshot against the committed one. Does not persist.
    pub fn evaluate(&self, new: &DependencySnapshot) -> DependencyDiff {
        let previous = self.load();
        let previous_map = previous
            .as_ref()
            .map(DependencySnapshot::as_map)
            .unwrap_or_default();
        let new_map = new.as_map();

        let mut diff = DependencyDiff::default();
        for (pointer, hash) in &new_map {
            if previous_map.get(pointer) != Some(hash) {
                diff.changed.insert((*pointer).clone());
            }
        }
        for pointer in previous_map.keys() {
            if !new_map.contains_key(*pointer) {
                diff.removed.insert((*pointer).clone());
                diff.changed.insert((*pointer).clone());
            }
        }
        diff
    }

    /// Atomically replace the committed snapshot.
    pub fn commit(&self, snapshot: &DependencySnapshot) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }

    /// Whether a committed snapshot file exists on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::{DependencyEntry, DependencySnapshot, DependencyStore};
    use crate::{digest::TokenDigest, pointer::TokenPointer};

    fn entry(pointer: &str, payload: &[u8]) -> DependencyEntry {
        DependencyEntry {
            pointer: TokenPointer::new(pointer),
            hash: TokenDigest::new(payload),
        }
    }

    /// With no committed snapshot, every pointer is changed and none removed.
    #[test]
    fn first_run_marks_everything_changed() {
        let dir = tempfile::tempdir().unwrap();
        let store = DependencyStore::new(dir.path());
        let snapshot = DependencySnapshot::new(vec![entry("#/a", b"1"), entry("#/b", b"2")]);
        let diff = store.evaluate(&snapshot);
        assert_eq!(diff.changed.len(), 2);
        assert!(diff.removed.is_empty());
    }

    /// evaluate never persists; commit does.
    #[test]
    fn evaluate_does_not_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = DependencyStore::new(dir.path());
        let snapshot = DependencySnapshot::new(vec![entry("#/a", b"1")]);
        store.evaluate(&snapshot);
        assert!(!store.exists());
        store.commit(&snapshot).unwrap();
        assert!(store.exists());
        assert!(store.evaluate(&snapshot).is_empty());
    }

    /// Removed pointers show up in both `removed` and `changed`.
    #[test]
    fn removal_also_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let store = DependencyStore::new(dir.path());
        store
            .commit(&DependencySnapshot::new(vec![
                entry("#/a", b"1"),
                entry("#/b", b"2"),
            ]))
            .unwrap();

        let next = DependencySnapshot::new(vec![entry("#/a", b"1")]);
        let diff = store.evaluate(&next);
        assert!(diff.removed.contains(&TokenPointer::new("#/b")));
        assert!(diff.changed.contains(&TokenPointer::new("#/b")));
        assert!(!diff.changed.contains(&TokenPointer::new("#/a")));
    }

    /// Hash changes mark only the affected pointer.
    #[test]
    fn modification_is_targeted() {
        let dir = tempfile::tempdir().unwrap();
        let store = DependencyStore::new(dir.path());
        store
            .commit(&DependencySnapshot::new(vec![
                entry("#/a", b"1"),
                entry("#/b", b"2"),
            ]))
            .unwrap();

        let next = DependencySnapshot::new(vec![entry("#/a", b"1"), entry("#/b", b"changed")]);
        let diff = store.evaluate(&next);
        assert_eq!(diff.changed.len(), 1);
        assert!(diff.changed.contains(&TokenPointer::new("#/b")));
    }

    /// A corrupt snapshot file behaves like an empty store.
    #[test]
    fn corrupt_snapshot_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("snapshot.json"), b"not json").unwrap();
        let store = DependencyStore::new(dir.path());
        assert!(store.load().is_none());
        let diff = store.evaluate(&DependencySnapshot::new(vec![entry("#/a", b"1")]));
        assert_eq!(diff.changed.len(), 1);
    }
}
