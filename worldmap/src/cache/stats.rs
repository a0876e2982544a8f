//! Per-cache statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Point-in-time statistics for one cache instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Cache name as registered with the manager.
    pub name: String,
    /// Lookups answered from a resident entry.
    pub hits: u64,
    /// Lookups that found no resident entry.
    pub misses: u64,
    /// Loader invocations.
    pub loads: u64,
    /// Loader invocations that returned an error.
    pub load_exceptions: u64,
    /// Mean loader wall time in milliseconds.
    pub avg_load_time_ms: f64,
    /// Approximate number of resident entries.
    pub entry_count: u64,
}

impl CacheStats {
    /// Fraction of lookups served from cache, 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: hits={} misses={} loads={} exceptions={} avg_load={:.2}ms entries={}",
            self.name,
            self.hits,
            self.misses,
            self.loads,
            self.load_exceptions,
            self.avg_load_time_ms,
            self.entry_count
        )
    }
}

/// Lock-free counters backing [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_exceptions: AtomicU64,
    load_nanos: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_load(&self, elapsed: Duration, succeeded: bool) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let nanos = elapsed.as_nanos().min(u64::MAX as u128) as u64;
        self.load_nanos.fetch_add(nanos, Ordering::Relaxed);
        if !succeeded {
            self.load_exceptions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self, name: &str, entry_count: u64) -> CacheStats {
        let loads = self.loads.load(Ordering::Relaxed);
        let nanos = self.load_nanos.load(Ordering::Relaxed);
        let avg_load_time_ms = if loads == 0 {
            0.0
        } else {
            nanos as f64 / loads as f64 / 1_000_000.0
        };
        CacheStats {
            name: name.to_string(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads,
            load_exceptions: self.load_exceptions.load(Ordering::Relaxed),
            avg_load_time_ms,
            entry_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_average_load_time() {
        let counters = StatsCounters::default();
        counters.record_load(Duration::from_millis(2), true);
        counters.record_load(Duration::from_millis(4), false);

        let stats = counters.snapshot("regions", 7);
        assert_eq!(stats.loads, 2);
        assert_eq!(stats.load_exceptions, 1);
        assert!((stats.avg_load_time_ms - 3.0).abs() < 1e-9);
        assert_eq!(stats.entry_count, 7);
    }

    #[test]
    fn test_hit_rate() {
        let counters = StatsCounters::default();
        assert_eq!(counters.snapshot("empty", 0).hit_rate(), 0.0);

        counters.record_hit();
        counters.record_hit();
        counters.record_hit();
        counters.record_miss();
        assert!((counters.snapshot("c", 0).hit_rate() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_display() {
        let stats = CacheStats {
            name: "steps".to_string(),
            hits: 1,
            misses: 2,
            loads: 2,
            load_exceptions: 0,
            avg_load_time_ms: 0.5,
            entry_count: 2,
        };
        assert_eq!(
            stats.to_string(),
            "steps: hits=1 misses=2 loads=2 exceptions=0 avg_load=0.50ms entries=2"
        );
    }
}
