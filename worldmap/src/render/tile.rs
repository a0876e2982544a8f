//! One grid slot's tile and the draw steps it is made of.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use super::{DrawOutcome, DrawStepCache, DrawStepKey};
use crate::coord::{tile_region_slices, CoordError, MapType, TileBounds, TileKey, WorldId};
use crate::texture::RenderBackend;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// A tile at a fixed key. Holds draw step keys, never the steps themselves.
#[derive(Debug)]
pub struct Tile {
    key: TileKey,
    world: WorldId,
    serial: u64,
    map_type: Option<MapType>,
    high_quality: bool,
    steps: Vec<DrawStepKey>,
}

impl Tile {
    pub fn new(key: TileKey, world: WorldId) -> Self {
        Self {
            key,
            world,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            map_type: None,
            high_quality: false,
            steps: Vec::new(),
        }
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn world(&self) -> WorldId {
        self.world
    }

    /// Process-unique identity of this tile instance.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn map_type(&self) -> Option<MapType> {
        self.map_type
    }

    pub fn steps(&self) -> &[DrawStepKey] {
        &self.steps
    }

    pub fn bounds(&self) -> TileBounds {
        self.key.bounds()
    }

    /// Point the tile at `map_type`, rebuilding its draw steps on a change.
    ///
    /// Returns true when the steps were rebuilt. Otherwise existing steps
    /// are asked to load anything they are missing.
    pub fn update_texture(
        &mut self,
        map_type: &MapType,
        high_quality: bool,
        cache: &DrawStepCache,
    ) -> bool {
        if self.map_type == Some(*map_type)
            && self.high_quality == high_quality
            && !self.steps.is_empty()
        {
            for key in &self.steps {
                cache.get_or_create(key).lock().prepare();
            }
            return false;
        }

        self.release(cache);
        self.steps = tile_region_slices(&self.key, map_type.dimension(), self.world)
            .into_iter()
            .map(|slice| {
                DrawStepKey::new(
                    slice.region,
                    *map_type,
                    self.key.zoom,
                    high_quality,
                    slice.sub_rect,
                )
            })
            .collect();
        for key in &self.steps {
            cache.get_or_create(key);
        }
        self.map_type = Some(*map_type);
        self.high_quality = high_quality;
        trace!(tile = %self.key, map_type = %map_type, steps = self.steps.len(), "Tile steps rebuilt");
        true
    }

    /// True when every step has something to draw.
    pub fn has_texture(&self, cache: &DrawStepCache) -> bool {
        !self.steps.is_empty()
            && self.steps.iter().all(|key| {
                cache
                    .peek(key)
                    .map(|step| step.lock().has_texture())
                    .unwrap_or(false)
            })
    }

    /// Draw with the tile's upper-left corner at `origin`.
    ///
    /// Returns `(drawn, placeholders)` step counts.
    pub fn draw(
        &self,
        backend: &mut dyn RenderBackend,
        cache: &DrawStepCache,
        origin_x: f64,
        origin_y: f64,
        alpha: f32,
    ) -> (usize, usize) {
        let mut drawn = 0;
        let mut placeholders = 0;
        for key in &self.steps {
            let step = cache.get_or_create(key);
            let outcome = step.lock().draw(backend, origin_x, origin_y, alpha);
            match outcome {
                DrawOutcome::Placeholder => placeholders += 1,
                DrawOutcome::Scaled | DrawOutcome::Direct => drawn += 1,
            }
        }
        (drawn, placeholders)
    }

    /// Evict this tile's draw steps.
    pub fn release(&mut self, cache: &DrawStepCache) {
        for key in self.steps.drain(..) {
            cache.release(&key);
        }
        self.map_type = None;
    }

    /// Pixel position of a world block inside this tile, in `[0, TILE_SIZE)`.
    pub fn pixel_offset_within_tile(&self, x: i32, z: i32) -> Result<(i32, i32), CoordError> {
        self.key.pixel_offset_within_tile(x, z)
    }

    /// Offset placing this tile so block `(x, z)` lands at the grid center.
    pub fn centering_offset(&self, x: i32, z: i32) -> Result<(i32, i32), CoordError> {
        self.key.centering_offset(x, z)
    }
}
