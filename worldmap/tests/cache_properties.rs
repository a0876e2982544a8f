//! Integration tests for the keyed expiring cache.
//!
//! Exercises `KeyedCache` from several threads at once and across expiry
//! boundaries, the way the render loop and the worker pool share it.
//!
//! Run with: `cargo test --test cache_properties`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use worldmap::cache::{DataProvider, ExpirationPolicy, KeyedCache, LoadError};

// ============================================================================
// Test Helpers
// ============================================================================

/// Provider that sleeps while loading and counts invocations.
struct SlowProvider {
    loads: AtomicUsize,
    delay: Duration,
    policy: ExpirationPolicy,
}

impl SlowProvider {
    fn new(delay: Duration, policy: ExpirationPolicy) -> Arc<Self> {
        Arc::new(Self {
            loads: AtomicUsize::new(0),
            delay,
            policy,
        })
    }

    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl DataProvider<u64, Arc<String>> for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    fn expiration(&self) -> ExpirationPolicy {
        self.policy
    }

    fn load(&self, key: &u64) -> Result<Arc<String>, LoadError> {
        let n = self.loads.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(Arc::new(format!("value-{key}-{n}")))
    }

    fn fallback(&self, _key: &u64) -> Arc<String> {
        Arc::new(String::new())
    }
}

/// Provider that fails for odd keys.
struct FlakyProvider {
    loads: AtomicUsize,
}

impl DataProvider<u64, Arc<String>> for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    fn expiration(&self) -> ExpirationPolicy {
        ExpirationPolicy::Never
    }

    fn load(&self, key: &u64) -> Result<Arc<String>, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if key % 2 == 1 {
            return Err(format!("key {key} is unreadable").into());
        }
        Ok(Arc::new(key.to_string()))
    }

    fn fallback(&self, _key: &u64) -> Arc<String> {
        Arc::new("fallback".to_string())
    }
}

fn concurrent_gets(
    cache: &KeyedCache<u64, Arc<String>>,
    keys: &[u64],
    per_key: usize,
) -> Vec<(u64, Arc<String>)> {
    thread::scope(|s| {
        let handles: Vec<_> = keys
            .iter()
            .flat_map(|&key| std::iter::repeat_n(key, per_key))
            .map(|key| {
                s.spawn(move || {
                    let jitter = rand::rng().random_range(0..5);
                    thread::sleep(Duration::from_millis(jitter));
                    (key, cache.get(&key))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

// ============================================================================
// Single Load Per Key
// ============================================================================

#[test]
fn test_concurrent_gets_share_one_load() {
    let provider = SlowProvider::new(Duration::from_millis(50), ExpirationPolicy::Never);
    let cache = KeyedCache::new(provider.clone());

    let results = concurrent_gets(&cache, &[7], 16);

    assert_eq!(provider.loads(), 1);
    let first = &results[0].1;
    assert!(results.iter().all(|(_, v)| Arc::ptr_eq(v, first)));
    assert_eq!(first.as_str(), "value-7-0");
}

#[test]
fn test_concurrent_gets_load_each_key_once() {
    let provider = SlowProvider::new(Duration::from_millis(30), ExpirationPolicy::Never);
    let cache = KeyedCache::new(provider.clone());
    let keys = [1, 2, 3, 4];

    let results = concurrent_gets(&cache, &keys, 8);

    assert_eq!(provider.loads(), keys.len());
    for key in keys {
        let values: Vec<_> = results.iter().filter(|(k, _)| *k == key).collect();
        assert_eq!(values.len(), 8);
        assert!(values.iter().all(|(_, v)| Arc::ptr_eq(v, &values[0].1)));
        assert!(values[0].1.starts_with(&format!("value-{key}-")));
    }
    assert_eq!(cache.entry_count(), keys.len() as u64);
}

// ============================================================================
// Expiration
// ============================================================================

#[test]
fn test_value_reloads_after_write_expiry() {
    let provider = SlowProvider::new(
        Duration::ZERO,
        ExpirationPolicy::AfterWrite(Duration::from_millis(100)),
    );
    let cache = KeyedCache::new(provider.clone());

    let first = cache.get(&3);
    let again = cache.get(&3);
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(provider.loads(), 1);

    thread::sleep(Duration::from_millis(250));

    let reloaded = cache.get(&3);
    assert_eq!(provider.loads(), 2);
    assert!(!Arc::ptr_eq(&first, &reloaded));
    assert_eq!(reloaded.as_str(), "value-3-1");
}

#[test]
fn test_access_keeps_idle_entry_alive() {
    let provider = SlowProvider::new(
        Duration::ZERO,
        ExpirationPolicy::AfterAccess(Duration::from_millis(200)),
    );
    let cache = KeyedCache::new(provider.clone());

    cache.get(&5);
    for _ in 0..5 {
        thread::sleep(Duration::from_millis(60));
        cache.get(&5);
    }
    assert_eq!(provider.loads(), 1);

    thread::sleep(Duration::from_millis(400));
    cache.get(&5);
    assert_eq!(provider.loads(), 2);
}

#[test]
fn test_forced_refresh_replaces_one_key() {
    let provider = SlowProvider::new(Duration::ZERO, ExpirationPolicy::Never);
    let cache = KeyedCache::new(provider.clone());

    let a = cache.get(&1);
    let b = cache.get(&2);
    let refreshed = cache.get_or_refresh(&1, true);

    assert!(!Arc::ptr_eq(&a, &refreshed));
    assert!(Arc::ptr_eq(&b, &cache.get(&2)));
    assert_eq!(provider.loads(), 3);
}

// ============================================================================
// Loader Failures
// ============================================================================

#[test]
fn test_failed_load_serves_fallback_and_retries() {
    let provider = Arc::new(FlakyProvider {
        loads: AtomicUsize::new(0),
    });
    let cache = KeyedCache::new(provider.clone());

    assert_eq!(cache.get(&1).as_str(), "fallback");
    assert!(!cache.contains(&1));
    assert_eq!(cache.get(&1).as_str(), "fallback");
    assert_eq!(provider.loads.load(Ordering::SeqCst), 2);

    assert_eq!(cache.get(&2).as_str(), "2");
    let stats = cache.stats();
    assert_eq!(stats.loads, 3);
    assert_eq!(stats.load_exceptions, 2);
    assert_eq!(stats.entry_count, 1);
}
