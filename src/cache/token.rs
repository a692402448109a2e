//! Filesystem cache for resolver output, keyed by source URI and content
//! hash.
//!
//! Entries live under `.dtifx-cache/parser/` with one JSON file per
//! `{uri, contentHash}` pair. An entry written for stale content simply
//! never matches again; the cache grows with distinct document revisions.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{cache::write_atomic, digest::TokenDigest, model::TokenSnapshot};

/// Bump when the entry layout changes; mismatched entries read as misses.
const TOKEN_CACHE_VERSION: u32 = 2;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenCacheEntry {
    version: u32,
    uri: String,
    content_hash: TokenDigest,
    written_at: DateTime<Utc>,
    snapshots: Vec<TokenSnapshot>,
}

/// Persistent store for per-document token snapshots.
pub struct TokenCacheStore {
    dir: PathBuf,
}

impl TokenCacheStore {
    /// `dir` is usually `<config>/.dtifx-cache/parser`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, uri: &str, content_hash: &TokenDigest) -> PathBuf {
        let key = TokenDigest::from_sections(&[uri.as_bytes(), content_hash.as_ref()]);
        self.dir.join(format!("{key}.json"))
    }

    /// Load cached snapshots; corrupt or mismatched entries are misses.
    pub fn load(&self, uri: &str, content_hash: &TokenDigest) -> Option<Vec<TokenSnapshot>> {
        let path = self.entry_path(uri, content_hash);
        let bytes = std::fs::read(&path).ok()?;
        let entry: TokenCacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                debug!("token cache entry {} unreadable: {err}", path.display());
                return None;
            }
        };
        if entry.version != TOKEN_CACHE_VERSION
            || entry.uri != uri
            || entry.content_hash != *content_hash
        {
            return None;
        }
        Some(entry.snapshots)
    }

    /// Persist snapshots for a document revision.
    pub fn store(
        &self,
        uri: &str,
        content_hash: &TokenDigest,
        snapshots: &[TokenSnapshot],
    ) -> std::io::Result<()> {
        let entry = TokenCacheEntry {
            version: TOKEN_CACHE_VERSION,
            uri: uri.to_string(),
            content_hash: *content_hash,
            written_at: Utc::now(),
            snapshots: snapshots.to_vec(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        write_atomic(&self.entry_path(uri, content_hash), &bytes)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::TokenCacheStore;
    use crate::{
        digest::TokenDigest,
        model::{Provenance, ResolutionInfo, Token, TokenSnapshot, TokenType},
        pointer::TokenPointer,
    };

    fn snapshot(pointer: &str) -> TokenSnapshot {
        TokenSnapshot {
            pointer: TokenPointer::new(pointer),
            source_pointer: TokenPointer::new(pointer),
            token: Token {
                token_type: TokenType::color(),
                value: json!("#fff"),
                raw: json!("#fff"),
            },
            resolution: ResolutionInfo {
                value: json!("#fff"),
                references: Vec::new(),
                resolution_path: vec![TokenPointer::new(pointer)],
                applied_aliases: vec![TokenPointer::new(pointer)],
            },
            provenance: Provenance {
                source_id: "core".into(),
                layer: "base".into(),
                layer_index: 0,
                uri: "file:///core.json".into(),
                pointer_prefix: TokenPointer::root(),
            },
            context: Default::default(),
            metadata: None,
        }
    }

    /// Stored snapshots round-trip for the same uri + content hash.
    #[test]
    fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenCacheStore::new(dir.path());
        let hash = TokenDigest::new(b"revision-1");
        let snapshots = vec![snapshot("#/color/a")];
        store.store("file:///core.json", &hash, &snapshots).unwrap();
        let loaded = store.load("file:///core.json", &hash).unwrap();
        assert_eq!(loaded, snapshots);
    }

    /// A different content hash misses.
    #[test]
    fn content_change_misses() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenCacheStore::new(dir.path());
        let hash = TokenDigest::new(b"revision-1");
        store
            .store("file:///core.json", &hash, &[snapshot("#/color/a")])
            .unwrap();
        assert!(store.load("file:///core.json", &TokenDigest::new(b"revision-2")).is_none());
    }

    /// Corrupt entries read as misses, never as errors.
    #[test]
    fn corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenCacheStore::new(dir.path());
        let hash = TokenDigest::new(b"revision-1");
        store
            .store("file:///core.json", &hash, &[snapshot("#/color/a")])
            .unwrap();
        // Overwrite the entry file with garbage.
        let key = TokenDigest::from_sections(&[b"file:///core.json", hash.as_ref()]);
        std::fs::write(dir.path().join(format!("{key}.json")), b"garbage").unwrap();
        assert!(store.load("file:///core.json", &hash).is_none());
    }
}
