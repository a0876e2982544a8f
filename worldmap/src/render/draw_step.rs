//! One cached, renderable piece of a tile.
//!
//! A draw step covers one sub-rectangle of one region raster at one zoom.
//! It draws either the shared direct region texture (sampling its
//! sub-rectangle) or, for high quality steps, its own scaled texture built
//! by resampling the sub-rectangle to full screen resolution.
//!
//! ```text
//! NoTexture ──► DirectPending ──► DirectReady ──► ScaledPending ──► ScaledReady
//!                                                      ▲                 │
//!                                                      └──── Dirty ◄─────┘
//!                                                        (dirty area hit)
//! ```

use std::fmt;
use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, warn};

use super::{RenderContext, TaskHandle, TaskPoll};
use crate::coord::{
    block_pixel_size, tile_index_to_world, world_to_tile_index, MapType, PixelRect, RegionCoord,
    CHUNK_SIZE, REGION_SIZE,
};
use crate::region::{RegionError, RegionImageKey, RegionRaster, Timestamp};
use crate::texture::{BackendError, DrawRect, OwnedTexture, RenderBackend, TextureId, UvRect};

/// Identity of a draw step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawStepKey {
    pub region: RegionCoord,
    pub map_type: MapType,
    pub zoom: u8,
    /// Always false at zoom 0, where the direct texture is already 1:1.
    pub high_quality: bool,
    /// Source rectangle in region raster pixels.
    pub sub_rect: PixelRect,
}

impl DrawStepKey {
    pub fn new(
        region: RegionCoord,
        map_type: MapType,
        zoom: u8,
        high_quality: bool,
        sub_rect: PixelRect,
    ) -> Self {
        Self {
            region,
            map_type,
            zoom,
            high_quality: high_quality && zoom > 0,
            sub_rect,
        }
    }

    pub fn image_key(&self) -> RegionImageKey {
        RegionImageKey::new(self.region, self.map_type)
    }

    pub fn cache_key(&self) -> String {
        format!(
            "{}:{}@{}{}{}",
            self.region,
            self.map_type,
            self.zoom,
            if self.high_quality { "+hq" } else { "" },
            self.sub_rect
        )
    }

    /// Destination rectangle in tile-local screen pixels.
    pub fn tile_dest(&self) -> PixelRect {
        let block = block_pixel_size(self.zoom);
        let origin = self.region.min_chunk();
        let bx = origin.x * CHUNK_SIZE + self.sub_rect.x1;
        let bz = origin.z * CHUNK_SIZE + self.sub_rect.y1;
        let tile_x = tile_index_to_world(world_to_tile_index(bx, self.zoom), self.zoom);
        let tile_z = tile_index_to_world(world_to_tile_index(bz, self.zoom), self.zoom);
        PixelRect::from_size(
            (bx - tile_x) * block,
            (bz - tile_z) * block,
            self.sub_rect.width() * block,
            self.sub_rect.height() * block,
        )
    }

    /// Edge length of the scaled texture.
    pub fn scaled_size(&self) -> u32 {
        (self.sub_rect.width() * block_pixel_size(self.zoom)) as u32
    }
}

impl fmt::Display for DrawStepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Observable state of a draw step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawStepState {
    NoTexture,
    DirectPending,
    DirectReady,
    ScaledPending,
    ScaledReady,
    /// Scaled texture is stale and will be rebuilt on the next draw.
    Dirty,
}

/// What a draw call put on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    Scaled,
    Direct,
    /// Background color only; the step has nothing to show yet.
    Placeholder,
}

type RegionTask = TaskHandle<Result<Arc<RegionRaster>, RegionError>>;
type ScaledTask = TaskHandle<Result<RgbaImage, RegionError>>;

/// Draw step owned by the [`DrawStepCache`](super::DrawStepCache).
pub struct TileDrawStep {
    key: DrawStepKey,
    ctx: Arc<RenderContext>,
    region_task: Option<RegionTask>,
    scaled: Option<OwnedTexture>,
    scaled_task: Option<ScaledTask>,
    needs_scaled_update: bool,
    evicted: bool,
    last_sync: Timestamp,
}

impl TileDrawStep {
    /// Create the step and start fetching its region if it is not resident.
    pub fn new(key: DrawStepKey, ctx: Arc<RenderContext>) -> Self {
        let resident = ctx.store().resident_image(&key.region, &key.map_type);
        let last_sync = resident
            .as_ref()
            .map(|raster| raster.revision())
            .unwrap_or(Timestamp::ZERO);
        ctx.metrics().step_created();

        let mut step = Self {
            key,
            ctx,
            region_task: None,
            scaled: None,
            scaled_task: None,
            needs_scaled_update: false,
            evicted: false,
            last_sync,
        };
        if resident.is_none() {
            step.request_region();
        }
        step
    }

    pub fn key(&self) -> &DrawStepKey {
        &self.key
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted
    }

    /// Raster revision this step last reconciled with the store.
    pub fn last_sync(&self) -> Timestamp {
        self.last_sync
    }

    pub(crate) fn set_last_sync(&mut self, revision: Timestamp) {
        self.last_sync = revision;
    }

    pub fn state(&self) -> DrawStepState {
        if self.evicted {
            return DrawStepState::NoTexture;
        }
        if self.key.high_quality {
            if self.scaled_task.is_some() {
                return DrawStepState::ScaledPending;
            }
            if self.scaled.is_some() {
                return if self.needs_scaled_update {
                    DrawStepState::Dirty
                } else {
                    DrawStepState::ScaledReady
                };
            }
        }
        if self.region_task.is_some() {
            DrawStepState::DirectPending
        } else if self.direct_texture_id().is_some() {
            DrawStepState::DirectReady
        } else {
            DrawStepState::NoTexture
        }
    }

    /// True when a draw would show more than the background.
    pub fn has_texture(&self) -> bool {
        self.scaled.is_some() || self.direct_texture_id().is_some()
    }

    /// Start loading if nothing is loaded or loading.
    pub fn prepare(&mut self) {
        if self.region_task.is_none() && !self.has_texture() {
            self.request_region();
        }
    }

    /// Apply a dirty-area report for this step's region.
    ///
    /// Empty `areas` means the whole region changed. Returns true when the
    /// scaled texture was marked for rebuild.
    pub fn region_updated(&mut self, areas: &[PixelRect]) -> bool {
        if !self.key.high_quality || self.evicted {
            return false;
        }
        let hit = areas.is_empty() || areas.iter().any(|area| area.intersects(&self.key.sub_rect));
        if hit {
            self.needs_scaled_update = true;
            self.ctx.metrics().dirty_mark();
        }
        hit
    }

    /// Draw the step with its tile's upper-left corner at `origin`.
    ///
    /// Never blocks. Backend errors are counted and throttled in the log;
    /// the step's textures are cleared so the next frame rebuilds them.
    pub fn draw(
        &mut self,
        backend: &mut dyn RenderBackend,
        origin_x: f64,
        origin_y: f64,
        alpha: f32,
    ) -> DrawOutcome {
        if self.evicted {
            let dest = self.dest_rect(origin_x, origin_y);
            if let Err(e) = backend.fill_rect(dest, self.ctx.background()) {
                self.ctx.metrics().backend_error();
                self.ctx.throttle().report("draw-step", &e);
            }
            self.ctx.metrics().placeholder();
            return DrawOutcome::Placeholder;
        }

        match self.render(backend, origin_x, origin_y, alpha) {
            Ok(outcome) => {
                if outcome == DrawOutcome::Placeholder {
                    self.ctx.metrics().placeholder();
                }
                outcome
            }
            Err(e) => {
                self.ctx.metrics().backend_error();
                self.ctx.throttle().report("draw-step", &e);
                self.clear_texture();
                if let Some(texture) = self.ctx.region_textures().peek(&self.key.image_key()) {
                    texture.clear();
                }
                self.ctx.metrics().placeholder();
                DrawOutcome::Placeholder
            }
        }
    }

    /// Drop the scaled texture and cancel outstanding work.
    pub fn clear_texture(&mut self) {
        if let Some(mut task) = self.region_task.take() {
            task.cancel();
        }
        if let Some(mut task) = self.scaled_task.take() {
            task.cancel();
        }
        self.scaled = None;
        self.needs_scaled_update = false;
    }

    /// Called when the step leaves the cache. The step never loads again.
    pub fn evict(&mut self) {
        if self.evicted {
            return;
        }
        self.clear_texture();
        self.evicted = true;
        self.ctx.metrics().step_evicted();
        debug!(step = %self.key, "Evicted draw step");
    }

    fn dest_rect(&self, origin_x: f64, origin_y: f64) -> DrawRect {
        let dest = self.key.tile_dest();
        DrawRect::new(
            origin_x + dest.x1 as f64,
            origin_y + dest.y1 as f64,
            dest.width() as f64,
            dest.height() as f64,
        )
    }

    fn direct_texture_id(&self) -> Option<TextureId> {
        self.ctx
            .region_textures()
            .peek(&self.key.image_key())
            .and_then(|texture| texture.texture_id())
    }

    fn render(
        &mut self,
        backend: &mut dyn RenderBackend,
        origin_x: f64,
        origin_y: f64,
        alpha: f32,
    ) -> Result<DrawOutcome, BackendError> {
        let (raster, direct) = self.update_region_texture(backend)?;
        if self.key.high_quality {
            self.update_scaled_texture(backend, raster.as_ref())?;
        }

        let dest = self.dest_rect(origin_x, origin_y);
        backend.fill_rect(dest, self.ctx.background())?;

        if let Some(scaled) = &self.scaled {
            backend.draw_texture(scaled.id(), UvRect::FULL, dest, alpha)?;
            return Ok(DrawOutcome::Scaled);
        }
        if let Some(id) = direct {
            let size = REGION_SIZE as f64;
            let sub = self.key.sub_rect;
            let uv = UvRect::new(
                sub.x1 as f64 / size,
                sub.y1 as f64 / size,
                sub.x2 as f64 / size,
                sub.y2 as f64 / size,
            );
            backend.draw_texture(id, uv, dest, alpha)?;
            return Ok(DrawOutcome::Direct);
        }
        Ok(DrawOutcome::Placeholder)
    }

    /// Bind the region raster to the shared region texture, fetching it
    /// through the worker pool when it is not resident.
    fn update_region_texture(
        &mut self,
        backend: &mut dyn RenderBackend,
    ) -> Result<(Option<Arc<RegionRaster>>, Option<TextureId>), BackendError> {
        let mut raster = None;
        if let Some(task) = self.region_task.as_mut() {
            match task.poll() {
                TaskPoll::Pending => {}
                TaskPoll::Ready(Ok(loaded)) => {
                    self.region_task = None;
                    raster = Some(loaded);
                }
                TaskPoll::Ready(Err(e)) => {
                    self.region_task = None;
                    self.materialize_failed("region-fetch", &e);
                }
                TaskPoll::Lost => self.region_task = None,
            }
        }

        let texture = self.ctx.region_textures().get(&self.key.image_key());
        if raster.is_none() && self.region_task.is_none() {
            raster = self
                .ctx
                .store()
                .resident_image(&self.key.region, &self.key.map_type);
            match &raster {
                Some(_) if texture.texture_id().is_none() => self.ctx.metrics().resident_bind(),
                Some(_) => {}
                // A bound texture from an unstored fallback is kept until the
                // region becomes resident.
                None if texture.texture_id().is_none() => self.request_region(),
                None => {}
            }
        }

        let Some(raster) = raster else {
            return Ok((None, texture.texture_id()));
        };
        let id = texture.sync(backend, self.ctx.releases(), &raster)?;
        Ok((Some(raster), Some(id)))
    }

    /// Upload a finished scaled image and schedule a rebuild when needed.
    fn update_scaled_texture(
        &mut self,
        backend: &mut dyn RenderBackend,
        raster: Option<&Arc<RegionRaster>>,
    ) -> Result<(), BackendError> {
        if let Some(task) = self.scaled_task.as_mut() {
            match task.poll() {
                TaskPoll::Pending => {}
                TaskPoll::Ready(Ok(image)) => {
                    self.scaled_task = None;
                    match &self.scaled {
                        Some(texture) => texture.update(backend, &image)?,
                        None => {
                            let id = backend.create_texture(&image)?;
                            self.scaled = Some(self.ctx.releases().adopt(id));
                        }
                    }
                }
                TaskPoll::Ready(Err(e)) => {
                    self.scaled_task = None;
                    self.materialize_failed("scaled-crop", &e);
                }
                TaskPoll::Lost => self.scaled_task = None,
            }
        }

        let wanted = self.scaled.is_none() || self.needs_scaled_update;
        if self.scaled_task.is_some() || !wanted {
            return Ok(());
        }
        let Some(raster) = raster else {
            return Ok(());
        };

        self.needs_scaled_update = false;
        self.last_sync = self.last_sync.max(raster.revision());
        self.ctx.metrics().scaled_build();

        let raster = Arc::clone(raster);
        let rect = self.key.sub_rect;
        let size = self.key.scaled_size();
        self.scaled_task = Some(
            self.ctx
                .materializer()
                .spawn("scaled-crop", move |_| raster.scaled_crop(rect, size)),
        );
        Ok(())
    }

    fn request_region(&mut self) {
        if self.region_task.is_some() || self.evicted {
            return;
        }
        let store = Arc::clone(self.ctx.store());
        let region = self.key.region;
        let map_type = self.key.map_type;
        self.ctx.metrics().region_fetch();
        self.region_task = Some(
            self.ctx
                .materializer()
                .spawn("region-fetch", move |_| store.image(&region, &map_type)),
        );
    }

    fn materialize_failed(&self, task: &str, error: &RegionError) {
        self.ctx.metrics().materialize_failure();
        warn!(step = %self.key, task, error = %error, "Failed to materialize draw step");
    }
}

impl Drop for TileDrawStep {
    fn drop(&mut self) {
        self.clear_texture();
    }
}
