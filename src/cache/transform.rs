//! Content-addressed cache for transform outputs.
//!
//! The key is `sha256(transformId ‖ pointer ‖ inputHash ‖ optionsHash)`, so
//! any change to a token's resolved value, the transform's identity, or its
//! options produces a fresh key. Entries are immutable once written;
//! concurrent builds can only re-write identical bytes.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{cache::write_atomic, digest::TokenDigest};

const TRANSFORM_CACHE_VERSION: u32 = 1;

/// On-disk envelope around one transform output.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct TransformCacheEntry {
    version: u32,
    written_at: DateTime<Utc>,
    output: serde_json::Value,
}

/// Transform output cache: an in-memory map in front of an optional
/// one-file-per-key directory under `.dtifx-cache/transforms/`.
pub struct TransformCache {
    dir: Option<PathBuf>,
    memory: DashMap<TokenDigest, serde_json::Value>,
}

impl TransformCache {
    /// Purely in-memory cache (tests, ephemeral builds).
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            memory: DashMap::new(),
        }
    }

    /// Cache persisted under `dir`, usually `<config>/.dtifx-cache/transforms`.
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            memory: DashMap::new(),
        }
    }

    /// Compute the content address for one (transform, snapshot) pairing.
    pub fn key(
        transform_id: &str,
        pointer: &str,
        input_hash: &TokenDigest,
        options_hash: &TokenDigest,
    ) -> TokenDigest {
        TokenDigest::from_sections(&[
            transform_id.as_bytes(),
            pointer.as_bytes(),
            input_hash.as_ref(),
            options_hash.as_ref(),
        ])
    }

    /// Look up an output. Corrupt persisted entries are misses.
    pub fn get(&self, key: &TokenDigest) -> Option<serde_json::Value> {
        if let Some(found) = self.memory.get(key) {
            return Some(found.clone());
        }
        let dir = self.dir.as_ref()?;
        let path = dir.join(format!("{key}.json"));
        let bytes = std::fs::read(&path).ok()?;
        match serde_json::from_slice::<TransformCacheEntry>(&bytes) {
            Ok(entry) if entry.version == TRANSFORM_CACHE_VERSION => {
                self.memory.insert(*key, entry.output.clone());
                Some(entry.output)
            }
            Ok(_) => None,
            Err(err) => {
                debug!("transform cache entry {} unreadable: {err}", path.display());
                None
            }
        }
    }

    /// Store an output under its key. Failures to persist are downgraded to
    /// a debug log; the in-memory layer still serves the entry.
    pub fn put(&self, key: TokenDigest, output: serde_json::Value) {
        self.memory.insert(key, output.clone());
        if let Some(dir) = &self.dir {
            let entry = TransformCacheEntry {
                version: TRANSFORM_CACHE_VERSION,
                written_at: Utc::now(),
                output,
            };
            match serde_json::to_vec(&entry) {
                Ok(bytes) => {
                    if let Err(err) = write_atomic(&dir.join(format!("{key}.json")), &bytes) {
                        debug!("transform cache write failed for {key}: {err}");
                    }
                }
                Err(err) => debug!("transform cache serialise failed for {key}: {err}"),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::TransformCache;
    use crate::digest::TokenDigest;

    fn key() -> TokenDigest {
        TransformCache::key(
            "css.color",
            "#/color/primary",
            &TokenDigest::new(b"input"),
            &TokenDigest::new(b"{}"),
        )
    }

    /// Keys differ when any component differs.
    #[test]
    fn key_components_matter() {
        let base = key();
        let other_transform = TransformCache::key(
            "swift.color",
            "#/color/primary",
            &TokenDigest::new(b"input"),
            &TokenDigest::new(b"{}"),
        );
        let other_options = TransformCache::key(
            "css.color",
            "#/color/primary",
            &TokenDigest::new(b"input"),
            &TokenDigest::new(b"{\"alpha\":true}"),
        );
        assert_ne!(base, other_transform);
        assert_ne!(base, other_options);
    }

    /// Persisted entries survive a fresh cache instance over the same dir.
    #[test]
    fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TransformCache::persistent(dir.path());
        cache.put(key(), json!({"css": "--color-primary: #123456;"}));

        let reopened = TransformCache::persistent(dir.path());
        let value = reopened.get(&key()).unwrap();
        assert_eq!(value["css"], "--color-primary: #123456;");
    }

    /// Corrupt persisted entries read as misses.
    #[test]
    fn corrupt_entry_is_a_miss() {
        crate::testutil::init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let cache = TransformCache::persistent(dir.path());
        std::fs::write(dir.path().join(format!("{}.json", key())), b"]]").unwrap();
        assert!(cache.get(&key()).is_none());
    }

    /// In-memory mode works without a directory.
    #[test]
    fn in_memory_round_trip() {
        let cache = TransformCache::in_memory();
        assert!(cache.get(&key()).is_none());
        cache.put(key(), json!(1));
        assert_eq!(cache.get(&key()), Some(json!(1)));
        assert_eq!(cache.len(), 1);
    }
}
