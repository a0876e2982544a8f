//! Registry owning the lifetime of every cache in a map session.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::CacheStats;

/// A cache the [`CacheManager`] can report on and purge.
pub trait ManagedCache: Send + Sync {
    fn name(&self) -> &str;
    fn stats(&self) -> CacheStats;
    /// Drop every entry, running removal hooks.
    fn purge(&self);
}

/// Explicit registry of the session's caches.
///
/// Constructed once at startup and shared by `Arc` with everything that
/// creates caches. Registration order is preserved for reporting.
#[derive(Default)]
pub struct CacheManager {
    caches: RwLock<Vec<Arc<dyn ManagedCache>>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cache. A cache registered under an existing name replaces it.
    pub fn register(&self, cache: Arc<dyn ManagedCache>) {
        let mut caches = self.caches.write();
        if let Some(slot) = caches.iter_mut().find(|c| c.name() == cache.name()) {
            debug!(cache = cache.name(), "Replacing registered cache");
            *slot = cache;
        } else {
            debug!(cache = cache.name(), "Registered cache");
            caches.push(cache);
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.caches.read().iter().map(|c| c.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.caches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.read().is_empty()
    }

    /// Statistics for every registered cache, in registration order.
    pub fn stats(&self) -> Vec<CacheStats> {
        self.caches.read().iter().map(|c| c.stats()).collect()
    }

    /// Statistics for one cache by name.
    pub fn stats_for(&self, name: &str) -> Option<CacheStats> {
        self.caches
            .read()
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.stats())
    }

    /// Statistics as pretty JSON.
    pub fn stats_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.stats())
    }

    /// Purge one cache by name. Returns false when no such cache is registered.
    pub fn purge(&self, name: &str) -> bool {
        let cache = self.caches.read().iter().find(|c| c.name() == name).cloned();
        match cache {
            Some(cache) => {
                cache.purge();
                true
            }
            None => false,
        }
    }

    /// Purge every registered cache.
    pub fn purge_all(&self) {
        let caches: Vec<_> = self.caches.read().iter().cloned().collect();
        for cache in &caches {
            cache.purge();
        }
        info!(count = caches.len(), "Purged all caches");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeCache {
        name: &'static str,
        purges: AtomicUsize,
    }

    impl FakeCache {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                purges: AtomicUsize::new(0),
            })
        }
    }

    impl ManagedCache for FakeCache {
        fn name(&self) -> &str {
            self.name
        }

        fn stats(&self) -> CacheStats {
            CacheStats {
                name: self.name.to_string(),
                entry_count: 3,
                ..CacheStats::default()
            }
        }

        fn purge(&self) {
            self.purges.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_register_preserves_order_and_replaces_by_name() {
        let manager = CacheManager::new();
        manager.register(FakeCache::new("regions"));
        manager.register(FakeCache::new("steps"));
        manager.register(FakeCache::new("regions"));

        assert_eq!(manager.names(), vec!["regions", "steps"]);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_purge_by_name_and_all() {
        let manager = CacheManager::new();
        let regions = FakeCache::new("regions");
        let steps = FakeCache::new("steps");
        manager.register(regions.clone());
        manager.register(steps.clone());

        assert!(manager.purge("steps"));
        assert!(!manager.purge("missing"));
        manager.purge_all();

        assert_eq!(regions.purges.load(Ordering::SeqCst), 1);
        assert_eq!(steps.purges.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stats_json() {
        let manager = CacheManager::new();
        manager.register(FakeCache::new("regions"));

        let json = manager.stats_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["name"], "regions");
        assert_eq!(parsed[0]["entry_count"], 3);
        assert_eq!(manager.stats_for("regions").map(|s| s.entry_count), Some(3));
    }
}
