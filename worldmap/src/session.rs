//! A map view session: the grid plus everything it depends on.
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(RegionImageStore::open(world, map_dir, idle));
//! let mut session = MapSession::new(store.clone(), MapConfig::default())?;
//! session.caches().register(Arc::new(store.cache().clone()));
//!
//! session.recenter(100, -40, 2, MapContext::new(world, MapType::day(0)))?;
//! loop {
//!     let report = session.frame(&mut backend, MapType::day(0), 1280, 720, 1.0);
//! }
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::cache::CacheManager;
use crate::config::MapConfig;
use crate::coord::{CoordError, MapType};
use crate::region::RegionStore;
use crate::render::{
    DrawStepCache, GridDrawReport, GridRenderer, MapContext, RenderContext, RenderError,
};
use crate::texture::RenderBackend;

/// Owns the cache registry, render context, draw step cache and grid.
pub struct MapSession {
    config: MapConfig,
    caches: Arc<CacheManager>,
    context: Arc<RenderContext>,
    steps: Arc<DrawStepCache>,
    grid: GridRenderer,
    frames: u64,
}

impl MapSession {
    pub fn new(store: Arc<dyn RegionStore>, config: MapConfig) -> Result<Self, RenderError> {
        Self::with_caches(store, config, Arc::new(CacheManager::new()))
    }

    /// Session registering its caches with an existing manager.
    pub fn with_caches(
        store: Arc<dyn RegionStore>,
        config: MapConfig,
        caches: Arc<CacheManager>,
    ) -> Result<Self, RenderError> {
        let context = RenderContext::new(store, &config)?;
        let steps = Arc::new(DrawStepCache::new(
            Arc::clone(&context),
            config.cache.draw_step_idle,
        ));
        caches.register(Arc::new(steps.cache().clone()));
        caches.register(Arc::new(context.region_textures().cache().clone()));

        let grid = GridRenderer::new(Arc::clone(&steps), &config.grid);
        Ok(Self {
            config,
            caches,
            context,
            steps,
            grid,
            frames: 0,
        })
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn caches(&self) -> &Arc<CacheManager> {
        &self.caches
    }

    pub fn context(&self) -> &Arc<RenderContext> {
        &self.context
    }

    pub fn steps(&self) -> &Arc<DrawStepCache> {
        &self.steps
    }

    pub fn grid(&self) -> &GridRenderer {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut GridRenderer {
        &mut self.grid
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn recenter(
        &mut self,
        x: i32,
        z: i32,
        zoom: u8,
        context: MapContext,
    ) -> Result<bool, CoordError> {
        self.grid.recenter(x, z, zoom, context)
    }

    /// Run one frame: pull dirty areas, refresh and draw the grid, then
    /// release textures dropped during the frame.
    pub fn frame(
        &mut self,
        backend: &mut dyn RenderBackend,
        map_type: MapType,
        width: i32,
        height: i32,
        alpha: f32,
    ) -> GridDrawReport {
        self.steps.sync_with_store();
        self.grid.update_textures(map_type, width, height, false, 0, 0);
        let report = self.grid.draw(backend, alpha, 0, 0);
        self.steps.maintain();
        let drained = self.context.end_frame(backend);
        self.frames += 1;
        debug!(
            frame = self.frames,
            visible = report.visible,
            drawn = report.drawn,
            placeholders = report.placeholders,
            released = drained.released,
            "Frame rendered"
        );
        report
    }

    /// Drop every cached resource. The next frame rebuilds from the store.
    pub fn purge(&mut self) {
        self.grid.clear();
        self.caches.purge_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::WorldId;
    use crate::region::RegionImageStore;
    use crate::render::{DRAW_STEP_CACHE, REGION_TEXTURE_CACHE};
    use crate::texture::HeadlessBackend;
    use std::time::{Duration, Instant};

    fn session() -> MapSession {
        let store = Arc::new(RegionImageStore::in_memory(WorldId(0)));
        let config = MapConfig::default().with_grid_size(3).unwrap();
        MapSession::new(store, config).unwrap()
    }

    #[test]
    fn test_registers_caches() {
        let session = session();
        let mut names = session.caches().names();
        names.sort();
        assert_eq!(names, vec![DRAW_STEP_CACHE.to_string(), REGION_TEXTURE_CACHE.to_string()]);
    }

    #[test]
    fn test_frames_converge_to_drawn_tiles() {
        let mut session = session();
        let mut backend = HeadlessBackend::new(512, 512);
        session
            .recenter(0, 0, 0, MapContext::new(WorldId(0), MapType::day(0)))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut report = GridDrawReport::default();
        while Instant::now() < deadline {
            backend.begin_frame();
            report = session.frame(&mut backend, MapType::day(0), 512, 512, 1.0);
            if report.visible > 0 && report.placeholders == 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(report.visible > 0);
        assert_eq!(report.placeholders, 0);
        assert_eq!(report.drawn, report.visible);
    }

    #[test]
    fn test_purge_empties_caches() {
        let mut session = session();
        let mut backend = HeadlessBackend::new(512, 512);
        session
            .recenter(0, 0, 0, MapContext::new(WorldId(0), MapType::day(0)))
            .unwrap();
        session.frame(&mut backend, MapType::day(0), 512, 512, 1.0);

        session.purge();
        assert!(session.steps().is_empty());
        assert_eq!(session.grid().tiles().count(), 0);
    }
}
