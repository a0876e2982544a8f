//! Shared state handed to every draw step.

use std::sync::Arc;

use tracing::{debug, info};

use super::{ErrorThrottle, Materializer, RegionTextureCache, RenderError, RenderMetrics};
use crate::config::MapConfig;
use crate::region::RegionStore;
use crate::texture::{Color, DrainReport, ReleaseQueue, RenderBackend};

/// Services shared by the grid, the draw step cache and every draw step.
pub struct RenderContext {
    store: Arc<dyn RegionStore>,
    materializer: Materializer,
    region_textures: RegionTextureCache,
    releases: ReleaseQueue,
    metrics: RenderMetrics,
    throttle: ErrorThrottle,
    background: Color,
}

impl RenderContext {
    /// Start the worker pool and shared caches for `store`.
    pub fn new(store: Arc<dyn RegionStore>, config: &MapConfig) -> Result<Arc<Self>, RenderError> {
        let materializer = Materializer::new(config.worker_threads)?;
        info!(
            threads = materializer.threads(),
            max_backend_errors = config.render.max_backend_errors,
            "Render context ready"
        );
        Ok(Arc::new(Self {
            store,
            materializer,
            region_textures: RegionTextureCache::new(config.cache.region_texture_idle),
            releases: ReleaseQueue::new(),
            metrics: RenderMetrics::default(),
            throttle: ErrorThrottle::new(config.render.max_backend_errors),
            background: config.render.background,
        }))
    }

    pub fn store(&self) -> &Arc<dyn RegionStore> {
        &self.store
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    pub fn region_textures(&self) -> &RegionTextureCache {
        &self.region_textures
    }

    pub fn releases(&self) -> &ReleaseQueue {
        &self.releases
    }

    pub fn metrics(&self) -> &RenderMetrics {
        &self.metrics
    }

    pub fn throttle(&self) -> &ErrorThrottle {
        &self.throttle
    }

    pub fn background(&self) -> Color {
        self.background
    }

    /// Per-frame housekeeping: delete textures released since the last frame.
    pub fn end_frame(&self, backend: &mut dyn RenderBackend) -> DrainReport {
        let report = self.releases.drain(backend);
        if report.released + report.abandoned > 0 {
            debug!(
                released = report.released,
                retried = report.retried,
                abandoned = report.abandoned,
                "Drained texture releases"
            );
        }
        report
    }
}
