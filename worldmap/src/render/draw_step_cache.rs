//! Cache of draw steps keyed by [`DrawStepKey`].
//!
//! Steps expire after a period without access. Whatever removes a step
//! (expiry, explicit release or a purge) evicts it, which cancels its
//! outstanding work and releases its scaled texture.
//!
//! A per-region index lets dirty-area reports reach only the steps of the
//! affected region.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{DrawStepKey, RenderContext, TileDrawStep};
use crate::cache::{DataProvider, ExpirationPolicy, KeyedCache, LoadError};
use crate::coord::{MapType, PixelRect, RegionCoord};
use crate::region::RegionImageKey;

/// Name of the draw step cache in statistics.
pub const DRAW_STEP_CACHE: &str = "draw-steps";

/// A draw step shared between the cache and its callers.
pub type SharedDrawStep = Arc<Mutex<TileDrawStep>>;

/// Steps per region. Each entry remembers which step instance it was
/// created for, so a late removal of an expired step cannot unindex the
/// step that replaced it.
type RegionIndex = DashMap<RegionImageKey, HashMap<DrawStepKey, Weak<Mutex<TileDrawStep>>>>;

struct DrawStepFactory {
    ctx: Arc<RenderContext>,
    idle: Duration,
    index: Arc<RegionIndex>,
}

impl DrawStepFactory {
    fn create(&self, key: &DrawStepKey) -> SharedDrawStep {
        trace!(step = %key, "Creating draw step");
        let step = Arc::new(Mutex::new(TileDrawStep::new(*key, Arc::clone(&self.ctx))));
        self.index
            .entry(key.image_key())
            .or_default()
            .insert(*key, Arc::downgrade(&step));
        step
    }
}

impl DataProvider<DrawStepKey, SharedDrawStep> for DrawStepFactory {
    fn name(&self) -> &str {
        DRAW_STEP_CACHE
    }

    fn expiration(&self) -> ExpirationPolicy {
        ExpirationPolicy::AfterAccess(self.idle)
    }

    fn load(&self, key: &DrawStepKey) -> Result<SharedDrawStep, LoadError> {
        Ok(self.create(key))
    }

    fn fallback(&self, key: &DrawStepKey) -> SharedDrawStep {
        self.create(key)
    }
}

/// Resident draw steps with access-based expiry.
pub struct DrawStepCache {
    ctx: Arc<RenderContext>,
    cache: KeyedCache<DrawStepKey, SharedDrawStep>,
    index: Arc<RegionIndex>,
}

impl DrawStepCache {
    /// Cache evicting steps unused for `idle`.
    pub fn new(ctx: Arc<RenderContext>, idle: Duration) -> Self {
        let index: Arc<RegionIndex> = Arc::new(DashMap::new());
        let factory = Arc::new(DrawStepFactory {
            ctx: Arc::clone(&ctx),
            idle,
            index: Arc::clone(&index),
        });

        let hook_index = Arc::clone(&index);
        let cache = KeyedCache::builder(factory)
            .on_removal(move |key: &DrawStepKey, step: SharedDrawStep, cause| {
                let image_key = key.image_key();
                if let Some(mut keys) = hook_index.get_mut(&image_key) {
                    let current = keys
                        .get(key)
                        .is_some_and(|indexed| std::ptr::eq(indexed.as_ptr(), Arc::as_ptr(&step)));
                    if current {
                        keys.remove(key);
                    }
                }
                hook_index.remove_if(&image_key, |_, keys| keys.is_empty());
                step.lock().evict();
                debug!(step = %key, ?cause, "Draw step removed");
            })
            .build();

        Self { ctx, cache, index }
    }

    pub fn context(&self) -> &Arc<RenderContext> {
        &self.ctx
    }

    /// The underlying cache, for registration with a cache manager.
    pub fn cache(&self) -> &KeyedCache<DrawStepKey, SharedDrawStep> {
        &self.cache
    }

    /// Resident step for `key`, creating it on a miss.
    pub fn get_or_create(&self, key: &DrawStepKey) -> SharedDrawStep {
        self.cache.get(key)
    }

    pub fn peek(&self, key: &DrawStepKey) -> Option<SharedDrawStep> {
        self.cache.peek(key)
    }

    /// Evict one step now.
    pub fn release(&self, key: &DrawStepKey) {
        self.cache.invalidate(key);
    }

    /// Keys of the resident steps drawing from a region.
    pub fn steps_for_region(&self, region: &RegionCoord, map_type: &MapType) -> Vec<DrawStepKey> {
        self.index
            .get(&RegionImageKey::new(*region, *map_type))
            .map(|keys| keys.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Deliver a dirty-area report for one region.
    ///
    /// Returns the number of steps marked for a scaled rebuild. An empty
    /// `areas` marks every high quality step of the region.
    pub fn apply_dirty_areas(
        &self,
        region: &RegionCoord,
        map_type: &MapType,
        areas: &[PixelRect],
    ) -> usize {
        let mut marked = 0;
        for key in self.steps_for_region(region, map_type) {
            if let Some(step) = self.cache.peek(&key) {
                if step.lock().region_updated(areas) {
                    marked += 1;
                }
            }
        }
        if marked > 0 {
            debug!(region = %region, areas = areas.len(), marked, "Applied dirty areas");
        }
        marked
    }

    /// Pull dirty areas from the store for every region with resident steps.
    ///
    /// Each step is compared against the raster revision it last saw, so
    /// repeated calls without new writes do nothing.
    pub fn sync_with_store(&self) -> usize {
        let store = self.ctx.store();
        let regions: Vec<(RegionImageKey, Vec<DrawStepKey>)> = self
            .index
            .iter()
            .map(|entry| (*entry.key(), entry.value().keys().copied().collect()))
            .collect();

        let mut marked = 0;
        for (image_key, keys) in regions {
            let Some(revision) = store.revision(&image_key.region, &image_key.map_type) else {
                continue;
            };
            for key in keys {
                let Some(step) = self.cache.peek(&key) else {
                    continue;
                };
                let mut step = step.lock();
                if step.last_sync() == revision {
                    continue;
                }
                let areas =
                    store.dirty_areas(&image_key.region, &image_key.map_type, step.last_sync());
                if step.region_updated(&areas) {
                    marked += 1;
                }
                step.set_last_sync(revision);
            }
        }
        if marked > 0 {
            debug!(marked, "Synchronised draw steps with region store");
        }
        marked
    }

    /// Run pending expirations so idle steps release their textures.
    pub fn maintain(&self) {
        self.cache.run_pending_tasks();
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use crate::coord::WorldId;
    use crate::region::RegionImageStore;
    use crate::render::DrawStepState;

    fn cache() -> DrawStepCache {
        cache_with_idle(Duration::from_secs(30))
    }

    fn cache_with_idle(idle: Duration) -> DrawStepCache {
        let store = Arc::new(RegionImageStore::in_memory(WorldId(1)));
        let ctx = RenderContext::new(store, &MapConfig::default()).unwrap();
        DrawStepCache::new(ctx, idle)
    }

    fn key(sub_rect: PixelRect) -> DrawStepKey {
        DrawStepKey::new(
            RegionCoord::new(0, 0, 0, WorldId(1)),
            MapType::day(0),
            1,
            true,
            sub_rect,
        )
    }

    #[test]
    fn test_get_or_create_returns_same_step() {
        let steps = cache();
        let k = key(PixelRect::new(0, 0, 256, 256));
        let a = steps.get_or_create(&k);
        let b = steps.get_or_create(&k);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps.steps_for_region(&k.region, &k.map_type), vec![k]);
    }

    #[test]
    fn test_release_evicts_step() {
        let steps = cache();
        let k = key(PixelRect::new(0, 0, 256, 256));
        let step = steps.get_or_create(&k);

        steps.release(&k);
        assert!(step.lock().is_evicted());
        assert_eq!(step.lock().state(), DrawStepState::NoTexture);
        assert!(steps.peek(&k).is_none());
        assert!(steps.steps_for_region(&k.region, &k.map_type).is_empty());
        assert_eq!(steps.context().metrics().snapshot().steps_evicted, 1);
    }

    #[test]
    fn test_invalidate_all_evicts_everything() {
        let steps = cache();
        let a = steps.get_or_create(&key(PixelRect::new(0, 0, 256, 256)));
        let b = steps.get_or_create(&key(PixelRect::new(256, 0, 512, 256)));

        steps.invalidate_all();
        assert!(a.lock().is_evicted());
        assert!(b.lock().is_evicted());
        assert!(steps.is_empty());
    }

    #[test]
    fn test_apply_dirty_areas_marks_overlapping_steps() {
        let steps = cache();
        let hit = key(PixelRect::new(0, 0, 256, 256));
        let miss = key(PixelRect::new(256, 256, 512, 512));
        steps.get_or_create(&hit);
        steps.get_or_create(&miss);

        let marked = steps.apply_dirty_areas(
            &hit.region,
            &hit.map_type,
            &[PixelRect::new(0, 0, 16, 16)],
        );
        assert_eq!(marked, 1);
        assert_eq!(steps.apply_dirty_areas(&hit.region, &hit.map_type, &[]), 2);
    }

    #[test]
    fn test_recreated_step_stays_indexed_after_expiry() {
        let steps = cache_with_idle(Duration::from_millis(100));
        let k = key(PixelRect::new(0, 0, 256, 256));
        let expired = steps.get_or_create(&k);

        std::thread::sleep(Duration::from_millis(250));
        let fresh = steps.get_or_create(&k);
        steps.maintain();

        assert!(!Arc::ptr_eq(&expired, &fresh));
        assert!(expired.lock().is_evicted());
        assert!(!fresh.lock().is_evicted());
        assert_eq!(steps.steps_for_region(&k.region, &k.map_type), vec![k]);
        assert_eq!(steps.apply_dirty_areas(&k.region, &k.map_type, &[]), 1);
    }
}
