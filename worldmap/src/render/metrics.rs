//! Render pipeline counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free counters updated by draw steps and the grid.
#[derive(Debug, Default)]
pub struct RenderMetrics {
    steps_created: AtomicU64,
    steps_evicted: AtomicU64,
    resident_binds: AtomicU64,
    region_fetches: AtomicU64,
    scaled_builds: AtomicU64,
    materialize_failures: AtomicU64,
    backend_errors: AtomicU64,
    placeholders: AtomicU64,
    dirty_marks: AtomicU64,
}

/// Serializable copy of [`RenderMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenderMetricsSnapshot {
    pub steps_created: u64,
    pub steps_evicted: u64,
    /// Direct textures bound from an already resident raster.
    pub resident_binds: u64,
    /// Region rasters requested from the worker pool.
    pub region_fetches: u64,
    pub scaled_builds: u64,
    pub materialize_failures: u64,
    pub backend_errors: u64,
    /// Draw calls that fell back to the background color.
    pub placeholders: u64,
    /// Draw steps flagged for a scaled rebuild by dirty areas.
    pub dirty_marks: u64,
}

macro_rules! counter {
    ($inc:ident, $field:ident) => {
        pub(crate) fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl RenderMetrics {
    counter!(step_created, steps_created);
    counter!(step_evicted, steps_evicted);
    counter!(resident_bind, resident_binds);
    counter!(region_fetch, region_fetches);
    counter!(scaled_build, scaled_builds);
    counter!(materialize_failure, materialize_failures);
    counter!(backend_error, backend_errors);
    counter!(placeholder, placeholders);
    counter!(dirty_mark, dirty_marks);

    pub fn snapshot(&self) -> RenderMetricsSnapshot {
        RenderMetricsSnapshot {
            steps_created: self.steps_created.load(Ordering::Relaxed),
            steps_evicted: self.steps_evicted.load(Ordering::Relaxed),
            resident_binds: self.resident_binds.load(Ordering::Relaxed),
            region_fetches: self.region_fetches.load(Ordering::Relaxed),
            scaled_builds: self.scaled_builds.load(Ordering::Relaxed),
            materialize_failures: self.materialize_failures.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            placeholders: self.placeholders.load(Ordering::Relaxed),
            dirty_marks: self.dirty_marks.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = RenderMetrics::default();
        metrics.step_created();
        metrics.step_created();
        metrics.placeholder();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.steps_created, 2);
        assert_eq!(snapshot.placeholders, 1);
        assert_eq!(snapshot.backend_errors, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(RenderMetrics::default().snapshot()).unwrap();
        assert_eq!(json["scaled_builds"], 0);
    }
}
