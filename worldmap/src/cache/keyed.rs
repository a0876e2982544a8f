//! Keyed cache with timed expiration backed by `moka::sync::Cache`.
//!
//! Every data provider in the crate sits behind a [`KeyedCache`]. The cache
//! guarantees that:
//!
//! - a value becomes visible only after its loader has returned
//! - concurrent lookups of the same missing key run the loader once, and
//!   every caller receives that one result
//! - a failing loader never poisons the key; the caller gets the provider's
//!   fallback value and the next lookup tries again
//!
//! # Example
//!
//! ```ignore
//! let cache = KeyedCache::builder(Arc::new(ChunkMetaProvider::new(store)))
//!     .on_removal(|key, _value, cause| debug!(?key, ?cause, "dropped"))
//!     .build();
//!
//! let meta = cache.get(&chunk);
//! let fresh = cache.get_or_refresh(&chunk, true);
//! ```

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::notification::RemovalCause as MokaRemovalCause;
use moka::sync::Cache;
use tracing::{debug, warn};

use super::stats::{CacheStats, StatsCounters};
use super::ManagedCache;

/// Error type returned by provider loaders.
pub type LoadError = Box<dyn std::error::Error + Send + Sync>;

/// When a resident entry stops being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationPolicy {
    /// Entry expires a fixed time after it was written.
    AfterWrite(Duration),
    /// Entry expires once it has not been read for the given time.
    AfterAccess(Duration),
    /// Entry lives until invalidated or evicted for capacity.
    Never,
}

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    Expired,
    Explicit,
    Replaced,
    Size,
}

impl From<MokaRemovalCause> for RemovalCause {
    fn from(cause: MokaRemovalCause) -> Self {
        match cause {
            MokaRemovalCause::Expired => RemovalCause::Expired,
            MokaRemovalCause::Explicit => RemovalCause::Explicit,
            MokaRemovalCause::Replaced => RemovalCause::Replaced,
            MokaRemovalCause::Size => RemovalCause::Size,
        }
    }
}

/// Source of values for a [`KeyedCache`].
pub trait DataProvider<K, V>: Send + Sync {
    /// Name used in logs and statistics.
    fn name(&self) -> &str;

    /// Expiration policy for entries produced by this provider.
    fn expiration(&self) -> ExpirationPolicy;

    /// Produces the value for `key`. May be slow; runs at most once per
    /// missing key at a time.
    fn load(&self, key: &K) -> Result<V, LoadError>;

    /// Value handed to callers when [`load`](Self::load) fails.
    fn fallback(&self, key: &K) -> V;
}

type RemovalHook<K, V> = Arc<dyn Fn(&K, V, RemovalCause) + Send + Sync>;

/// Builder for [`KeyedCache`].
pub struct KeyedCacheBuilder<K, V> {
    provider: Arc<dyn DataProvider<K, V>>,
    expiration: Option<ExpirationPolicy>,
    max_capacity: Option<u64>,
    on_removal: Option<RemovalHook<K, V>>,
}

impl<K, V> KeyedCacheBuilder<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Override the provider's expiration policy.
    pub fn expiration(mut self, policy: ExpirationPolicy) -> Self {
        self.expiration = Some(policy);
        self
    }

    /// Bound the number of resident entries.
    pub fn max_capacity(mut self, entries: u64) -> Self {
        self.max_capacity = Some(entries);
        self
    }

    /// Hook run synchronously whenever an entry is removed, for any cause.
    pub fn on_removal<F>(mut self, hook: F) -> Self
    where
        F: Fn(&K, V, RemovalCause) + Send + Sync + 'static,
    {
        self.on_removal = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> KeyedCache<K, V> {
        let name: Arc<str> = Arc::from(self.provider.name());
        let policy = self.expiration.unwrap_or_else(|| self.provider.expiration());

        let mut builder = Cache::<K, V>::builder().name(&name);
        builder = match policy {
            ExpirationPolicy::AfterWrite(ttl) => builder.time_to_live(ttl),
            ExpirationPolicy::AfterAccess(tti) => builder.time_to_idle(tti),
            ExpirationPolicy::Never => builder,
        };
        if let Some(capacity) = self.max_capacity {
            builder = builder.max_capacity(capacity);
        }
        if let Some(hook) = self.on_removal {
            builder = builder.eviction_listener(move |key: Arc<K>, value: V, cause| {
                hook(&key, value, cause.into());
            });
        }

        KeyedCache {
            name,
            policy,
            inner: builder.build(),
            provider: self.provider,
            counters: Arc::new(StatsCounters::default()),
        }
    }
}

/// Map from key to lazily loaded value with timed expiration and statistics.
///
/// Cloning is cheap and yields a handle to the same cache.
pub struct KeyedCache<K, V> {
    name: Arc<str>,
    policy: ExpirationPolicy,
    inner: Cache<K, V>,
    provider: Arc<dyn DataProvider<K, V>>,
    counters: Arc<StatsCounters>,
}

impl<K, V> Clone for KeyedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            policy: self.policy,
            inner: self.inner.clone(),
            provider: Arc::clone(&self.provider),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<K, V> KeyedCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Start building a cache around `provider`.
    pub fn builder(provider: Arc<dyn DataProvider<K, V>>) -> KeyedCacheBuilder<K, V> {
        KeyedCacheBuilder {
            provider,
            expiration: None,
            max_capacity: None,
            on_removal: None,
        }
    }

    /// Cache with the provider's own policy and no removal hook.
    pub fn new(provider: Arc<dyn DataProvider<K, V>>) -> Self {
        Self::builder(provider).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> ExpirationPolicy {
        self.policy
    }

    /// Returns the resident value or loads it.
    ///
    /// Never fails: loader errors are logged and replaced by the provider's
    /// fallback, which is not stored.
    pub fn get(&self, key: &K) -> V {
        if let Some(value) = self.inner.get(key) {
            self.counters.record_hit();
            return value;
        }
        self.counters.record_miss();

        match self.inner.try_get_with(key.clone(), || self.load(key)) {
            Ok(value) => value,
            Err(_) => self.provider.fallback(key),
        }
    }

    /// [`get`](Self::get), invalidating the key first when `force_refresh` is set.
    pub fn get_or_refresh(&self, key: &K, force_refresh: bool) -> V {
        if force_refresh {
            self.invalidate(key);
        }
        self.get(key)
    }

    /// Resident value without loading. Counts towards access-based expiry.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.inner.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Store a value directly, replacing any resident one.
    pub fn insert(&self, key: K, value: V) {
        self.inner.insert(key, value);
    }

    /// Remove one entry immediately. The removal hook runs before this returns.
    pub fn invalidate(&self, key: &K) {
        self.inner.invalidate(key);
    }

    /// Remove every entry and run removal hooks before returning.
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
    }

    /// Process expirations and deliver their removal notifications.
    pub fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks();
    }

    /// Resident entries. May include entries that expire during iteration.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.inner
            .iter()
            .map(|(key, value)| ((*key).clone(), value))
            .collect()
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(&self.name, self.entry_count())
    }

    fn load(&self, key: &K) -> Result<V, LoadError> {
        let started = Instant::now();
        let result = self.provider.load(key);
        let elapsed = started.elapsed();
        self.counters.record_load(elapsed, result.is_ok());

        match &result {
            Ok(_) => debug!(
                cache = %self.name,
                key = ?key,
                elapsed_us = elapsed.as_micros() as u64,
                "Loaded cache entry"
            ),
            Err(e) => warn!(
                cache = %self.name,
                key = ?key,
                error = %e,
                "Cache loader failed, serving fallback"
            ),
        }
        result
    }
}

impl<K, V> ManagedCache for KeyedCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn stats(&self) -> CacheStats {
        KeyedCache::stats(self)
    }

    fn purge(&self) {
        self.invalidate_all();
    }
}
