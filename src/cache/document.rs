//! In-memory cache of parsed DTIF documents, keyed by source URI.

use std::sync::Arc;

use dashmap::DashMap;

use crate::{document::DtifDocument, errors::Result};

/// Memoises parsed documents for the lifetime of an environment.
///
/// Lookup-or-compute: a miss materialises the document via the supplied
/// loader, stores it, and returns it. The cache is bounded by the configured
/// source set, so there is no eviction.
#[derive(Default)]
pub struct DocumentCache {
    entries: DashMap<String, Arc<DtifDocument>>,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the document for `uri`, computing it on a miss.
    pub fn get_or_load<F>(&self, uri: &str, load: F) -> Result<Arc<DtifDocument>>
    where
        F: FnOnce() -> Result<DtifDocument>,
    {
        if let Some(found) = self.entries.get(uri) {
            return Ok(found.clone());
        }
        let document = Arc::new(load()?);
        self.entries.insert(uri.to_string(), document.clone());
        Ok(document)
    }

    /// Drop a single entry, e.g. when a watch iteration saw the file change.
    pub fn invalidate(&self, uri: &str) {
        self.entries.remove(uri);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::DocumentCache;
    use crate::document::DtifDocument;

    fn parse(uri: &str) -> DtifDocument {
        DtifDocument::from_value(uri, json!({"color": {"a": {"$type": "color", "$value": "#fff"}}}))
            .unwrap()
    }

    /// The loader runs once per URI; later lookups hit the cache.
    #[test]
    fn loads_once_per_uri() {
        let cache = DocumentCache::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let document = cache
                .get_or_load("file:///a.json", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(parse("file:///a.json"))
                })
                .unwrap();
            assert_eq!(document.uri, "file:///a.json");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    /// Invalidation forces the next lookup to reload.
    #[test]
    fn invalidate_reloads() {
        let cache = DocumentCache::new();
        let calls = AtomicUsize::new(0);
        let mut load = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(parse("file:///a.json"))
        };
        cache.get_or_load("file:///a.json", &mut load).unwrap();
        cache.invalidate("file:///a.json");
        cache.get_or_load("file:///a.json", &mut load).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    /// Loader failures do not poison the cache.
    #[test]
    fn failed_load_is_not_cached() {
        let cache = DocumentCache::new();
        let result = cache.get_or_load("file:///a.json", || {
            Err(crate::errors::DtifxError::CustomError("io".into()))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }
}
