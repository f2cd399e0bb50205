//! Query result cache
//!
//! Strict LRU over formatted contexts, keyed by a digest of the normalized
//! query. No expiry: the knowledge base does not change while the process
//! runs, so entries live until evicted or cleared.

use crate::normalize::normalize;
use lru::LruCache;
use momochat_common::metrics;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Cache key for a raw query: hex SHA-256 of its normalized form
pub fn cache_key(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(query).as_bytes());
    hex::encode(hasher.finalize())
}

/// Thread-safe LRU of query contexts.
///
/// A capacity of zero disables caching.
pub struct QueryCache {
    entries: Option<Mutex<LruCache<String, String>>>,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|c| Mutex::new(LruCache::new(c))),
        }
    }

    /// Cached context for `query`; a hit becomes most recently used
    pub fn get(&self, query: &str) -> Option<String> {
        let entries = self.entries.as_ref()?;
        let key = cache_key(query);

        let hit = lock(entries).get(&key).cloned();
        debug!(key = %key, hit = hit.is_some(), "Query cache lookup");
        metrics::record_cache(hit.is_some(), "query");
        hit
    }

    /// Store a context, evicting the least recently used entry when full
    pub fn set(&self, query: &str, context: String) {
        let Some(entries) = self.entries.as_ref() else {
            return;
        };
        let key = cache_key(query);

        if let Some((evicted, _)) = lock(entries).push(key.clone(), context) {
            if evicted != key {
                debug!(evicted = %evicted, "Query cache eviction");
            }
        }
        debug!(key = %key, "Query cache set");
    }

    /// True when `query` is cached; recency is left untouched
    pub fn contains(&self, query: &str) -> bool {
        self.entries
            .as_ref()
            .map(|entries| lock(entries).contains(&cache_key(query)))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Some(entries) = self.entries.as_ref() {
            lock(entries).clear();
            debug!("Query cache cleared");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map(|e| lock(e).len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.as_ref().map(|e| lock(e).cap().get()).unwrap_or(0)
    }
}

// Poisoned locks are recovered: no LruCache operation panics midway.
fn lock(entries: &Mutex<LruCache<String, String>>) -> MutexGuard<'_, LruCache<String, String>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_then_get() {
        let cache = QueryCache::new(10);
        assert!(cache.get("solde").is_none());

        cache.set("solde", "[SOLDE]\n...".to_string());
        assert_eq!(cache.get("solde").as_deref(), Some("[SOLDE]\n..."));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_key_is_normalized() {
        assert_eq!(cache_key("Solde?"), cache_key("solde"));
        assert_eq!(cache_key("Prêt"), cache_key("PRET"));
        assert_ne!(cache_key("solde"), cache_key("soldes"));
        assert_eq!(cache_key("solde").len(), 64);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = QueryCache::new(3);
        cache.set("a1", "1".into());
        cache.set("b2", "2".into());
        cache.set("c3", "3".into());

        // Touch the oldest so it is not the next victim
        assert!(cache.get("a1").is_some());
        cache.set("d4", "4".into());

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("b2"));
        assert!(cache.contains("a1"));
        assert!(cache.contains("c3"));
        assert!(cache.contains("d4"));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = QueryCache::new(2);
        cache.set("a1", "old".into());
        cache.set("b2", "2".into());
        cache.set("A1", "new".into());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a1").as_deref(), Some("new"));
    }

    #[test]
    fn test_clear_and_disabled() {
        let cache = QueryCache::new(2);
        cache.set("a1", "1".into());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 2);

        let disabled = QueryCache::new(0);
        disabled.set("a1", "1".into());
        assert!(disabled.get("a1").is_none());
        assert_eq!(disabled.capacity(), 0);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(QueryCache::new(50));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let query = format!("query {} {}", t, i % 60);
                        if cache.get(&query).is_none() {
                            cache.set(&query, query.clone());
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 50);
    }
}
