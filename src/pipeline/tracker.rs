//! Dependency tracker: stable per-token hashing and change detection
//! between runs.
//!
//! The hash covers the resolved value plus the metadata fields that affect
//! downstream artifacts (type, deprecation, `$hash`, extensions,
//! description), both in canonical JSON. Identical inputs therefore always
//! produce identical hashes, which is what makes the transform cache and
//! incremental rebuilds sound.

use std::{sync::Arc, time::Instant};

use crate::{
    cache::dependency::{
        DependencyDiff, DependencyEntry, DependencySnapshot, DependencyStore,
    },
    digest::{TokenDigest, canonical_json},
    errors::Result,
    model::TokenSnapshot,
};

/// Stable digest of one snapshot's artifact-relevant content.
pub fn snapshot_digest(snapshot: &TokenSnapshot) -> TokenDigest {
    let mut metadata_subset = snapshot
        .metadata
        .as_ref()
        .map(|m| m.dependency_subset())
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
    if let serde_json::Value::Object(map) = &mut metadata_subset {
        map.insert(
            "type".into(),
            serde_json::Value::String(snapshot.token.token_type.to_string()),
        );
    }
    TokenDigest::from_sections(&[
        canonical_json(&snapshot.resolution.value).as_bytes(),
        canonical_json(&metadata_subset).as_bytes(),
    ])
}

/// Outcome of the dependency-evaluate stage.
#[derive(Debug)]
pub struct DependencyEvaluation {
    pub snapshot: DependencySnapshot,
    pub diff: DependencyDiff,
    pub duration_ms: u64,
}

/// Computes dependency snapshots and diffs them against the store.
pub struct DependencyTracker {
    store: Arc<DependencyStore>,
}

impl DependencyTracker {
    pub fn new(store: Arc<DependencyStore>) -> Self {
        Self { store }
    }

    /// Hash the resolved set and diff it against the committed snapshot.
    /// Never persists; `commit` is the orchestrator's call after all
    /// downstream stages succeed.
    pub fn evaluate(&self, snapshots: &[TokenSnapshot]) -> DependencyEvaluation {
        let started = Instant::now();
        let entries: Vec<DependencyEntry> = snapshots
            .iter()
            .map(|snapshot| DependencyEntry {
                pointer: snapshot.pointer.clone(),
                hash: snapshot_digest(snapshot),
            })
            .collect();
        let snapshot = DependencySnapshot::new(entries);
        let diff = self.store.evaluate(&snapshot);
        DependencyEvaluation {
            snapshot,
            diff,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Atomically persist the snapshot of a fully successful run.
    pub fn commit(&self, snapshot: &DependencySnapshot) -> Result<()> {
        self.store.commit(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{DependencyTracker, snapshot_digest};
    use crate::{
        cache::dependency::DependencyStore,
        model::{Deprecation, TokenMetadata},
        pointer::TokenPointer,
        testutil::{sample_snapshot, with_metadata},
    };

    /// Value changes change the digest; provenance does not participate.
    #[test]
    fn digest_tracks_value() {
        let a = sample_snapshot("#/color/a", json!("#111111"));
        let b = sample_snapshot("#/color/a", json!("#222222"));
        assert_ne!(snapshot_digest(&a), snapshot_digest(&b));

        let mut moved = a.clone();
        moved.provenance.uri = "file:///elsewhere.json".into();
        assert_eq!(snapshot_digest(&a), snapshot_digest(&moved));
    }

    /// Hash-relevant metadata participates; tags and author do not.
    #[test]
    fn digest_tracks_metadata_subset() {
        let plain = sample_snapshot("#/color/a", json!("#111111"));
        let described = with_metadata(
            plain.clone(),
            TokenMetadata {
                description: Some("brand".into()),
                ..Default::default()
            },
        );
        let deprecated = with_metadata(
            plain.clone(),
            TokenMetadata {
                deprecated: Some(Deprecation::default()),
                ..Default::default()
            },
        );
        let tagged = with_metadata(
            plain.clone(),
            TokenMetadata {
                tags: vec!["core".into()],
                ..Default::default()
            },
        );
        assert_ne!(snapshot_digest(&plain), snapshot_digest(&described));
        assert_ne!(snapshot_digest(&plain), snapshot_digest(&deprecated));
        assert_eq!(snapshot_digest(&plain), snapshot_digest(&tagged));
    }

    /// evaluate diffs without committing; a later commit settles the diff.
    #[test]
    fn evaluate_then_commit() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = DependencyTracker::new(Arc::new(DependencyStore::new(dir.path())));
        let snapshots = vec![
            sample_snapshot("#/color/a", json!("#111111")),
            sample_snapshot("#/color/b", json!("#222222")),
        ];

        let first = tracker.evaluate(&snapshots);
        assert_eq!(first.diff.changed.len(), 2);

        // Not committed yet: evaluating again still reports changes.
        let again = tracker.evaluate(&snapshots);
        assert_eq!(again.diff.changed.len(), 2);

        tracker.commit(&first.snapshot).unwrap();
        let after_commit = tracker.evaluate(&snapshots);
        assert!(after_commit.diff.is_empty());

        // One mutated token produces a targeted diff.
        let mut mutated = snapshots.clone();
        mutated[1] = sample_snapshot("#/color/b", json!("#333333"));
        let diff = tracker.evaluate(&mutated).diff;
        assert_eq!(diff.changed.len(), 1);
        assert!(diff.changed.contains(&TokenPointer::new("#/color/b")));
    }
}
