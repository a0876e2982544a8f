//! The viewport grid: a square of tiles around a logical center.
//!
//! ```text
//!        delta_x  -2    -1     0     1     2
//!   delta_z
//!     -2        [   ] [   ] [   ] [   ] [   ]
//!     -1        [   ] [   ] [   ] [   ] [   ]
//!      0        [   ] [   ] [ C ] [   ] [   ]    C = tile holding the center block
//!      1        [   ] [   ] [   ] [   ] [   ]
//!      2        [   ] [   ] [   ] [   ] [   ]
//! ```
//!
//! The center tile is placed so the center block lands in the middle of the
//! screen. Every other slot is offset from it by whole tiles.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{DrawStepCache, Tile};
use crate::config::GridConfig;
use crate::coord::{
    block_pixel_size, check_zoom, CoordError, MapType, PixelRect, TileBounds, TileKey,
    TilePosition, WorldId, TILE_SIZE,
};
use crate::texture::RenderBackend;

/// World and map the grid is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapContext {
    pub world: WorldId,
    pub map_type: MapType,
}

impl MapContext {
    pub fn new(world: WorldId, map_type: MapType) -> Self {
        Self { world, map_type }
    }
}

/// Counts from one [`GridRenderer::draw`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridDrawReport {
    /// Tiles inside the screen bounds.
    pub visible: usize,
    /// Tiles skipped as off screen.
    pub offscreen: usize,
    /// Draw steps that showed a texture.
    pub drawn: usize,
    /// Draw steps that showed only the background.
    pub placeholders: usize,
}

/// The viewport grid and its screen-space queries.
pub struct GridRenderer {
    steps: Arc<DrawStepCache>,
    grid_size: u32,
    high_quality: bool,
    screen_pad: i32,
    grid: BTreeMap<TilePosition, Option<Tile>>,
    context: Option<MapContext>,
    center_block: (i32, i32),
    zoom: u8,
    center_key: Option<TileKey>,
    center_pixel_offset: (i32, i32),
    width: i32,
    height: i32,
    viewport: Option<PixelRect>,
    screen_bounds: Option<PixelRect>,
    map_type: Option<MapType>,
}

impl GridRenderer {
    pub fn new(steps: Arc<DrawStepCache>, config: &GridConfig) -> Self {
        let mut grid = BTreeMap::new();
        let radius = (config.size / 2) as i32;
        for dz in -radius..=radius {
            for dx in -radius..=radius {
                grid.insert(TilePosition::new(dx, dz), None);
            }
        }

        Self {
            steps,
            grid_size: config.size,
            high_quality: config.high_quality,
            screen_pad: config.screen_pad,
            grid,
            context: None,
            center_block: (0, 0),
            zoom: 0,
            center_key: None,
            center_pixel_offset: (0, 0),
            width: 0,
            height: 0,
            viewport: None,
            screen_bounds: None,
            map_type: None,
        }
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn center_block(&self) -> (i32, i32) {
        self.center_block
    }

    pub fn center_key(&self) -> Option<TileKey> {
        self.center_key
    }

    pub fn context(&self) -> Option<MapContext> {
        self.context
    }

    /// Screen position of the center tile's upper-left corner.
    pub fn center_pixel_offset(&self) -> (i32, i32) {
        self.center_pixel_offset
    }

    pub fn step_cache(&self) -> &Arc<DrawStepCache> {
        &self.steps
    }

    pub fn tile_at(&self, position: TilePosition) -> Option<&Tile> {
        self.grid.get(&position).and_then(Option::as_ref)
    }

    /// Occupied slots in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = (TilePosition, &Tile)> {
        self.grid
            .iter()
            .filter_map(|(pos, slot)| slot.as_ref().map(|tile| (*pos, tile)))
    }

    fn is_populated(&self) -> bool {
        self.grid.values().any(Option::is_some)
    }

    /// Move the grid center.
    ///
    /// Returns false without touching anything when nothing changed.
    /// A different world or dimension clears the grid first.
    pub fn recenter(
        &mut self,
        x: i32,
        z: i32,
        zoom: u8,
        context: MapContext,
    ) -> Result<bool, CoordError> {
        let zoom = check_zoom(zoom)?;
        if self.is_populated()
            && self.center_block == (x, z)
            && self.zoom == zoom
            && self.context == Some(context)
        {
            return Ok(false);
        }

        if let Some(previous) = self.context {
            if previous.world != context.world
                || previous.map_type.dimension() != context.map_type.dimension()
            {
                debug!(from = %previous.world, to = %context.world, "Map context switched, clearing grid");
                self.clear();
            }
        }

        let center = TileKey::from_world(x, z, zoom)?;
        let context_changed = self.context != Some(context);
        self.center_block = (x, z);
        self.zoom = zoom;
        self.context = Some(context);

        if self.center_key != Some(center) || !self.is_populated() || context_changed {
            self.center_key = Some(center);
            self.populate(center, context.world);
        }
        Ok(true)
    }

    /// Fill every slot from `center`, keeping tiles already in the grid.
    fn populate(&mut self, center: TileKey, world: WorldId) {
        let mut resident: HashMap<TileKey, Tile> = self
            .grid
            .values_mut()
            .filter_map(Option::take)
            .map(|tile| (tile.key(), tile))
            .collect();

        let mut reused = 0;
        let mut created = 0;
        for (position, slot) in self.grid.iter_mut() {
            let key = center.offset(position.delta_x, position.delta_z);
            let tile = match resident.remove(&key) {
                Some(tile) if tile.world() == world => {
                    reused += 1;
                    tile
                }
                Some(mut stale) => {
                    stale.release(&self.steps);
                    created += 1;
                    Tile::new(key, world)
                }
                None => {
                    created += 1;
                    Tile::new(key, world)
                }
            };
            *slot = Some(tile);
        }

        let released = resident.len();
        for (_, mut tile) in resident {
            tile.release(&self.steps);
        }
        info!(center = %center, reused, created, released, "Repopulated tile grid");
    }

    /// Bring visible tiles up to date for `map_type`.
    ///
    /// Tiles are refreshed when `full_update` is set, when the map type
    /// changed, or when they have nothing to draw yet. Returns true when any
    /// tile rebuilt its draw steps.
    pub fn update_textures(
        &mut self,
        map_type: MapType,
        width: i32,
        height: i32,
        full_update: bool,
        x_offset: i32,
        y_offset: i32,
    ) -> bool {
        let Some(center) = self.center_key else {
            return false;
        };

        if width != self.width || height != self.height || self.screen_bounds.is_none() {
            self.width = width;
            self.height = height;
            self.update_bounds();
        }

        if !self.is_populated() {
            if let Some(context) = self.context {
                self.populate(center, context.world);
            }
        }

        let full_update = full_update || self.map_type != Some(map_type);
        self.map_type = Some(map_type);

        match self.compute_center_offset(center, x_offset, y_offset) {
            Ok(offset) => self.center_pixel_offset = offset,
            Err(e) => {
                warn!(error = %e, "Center block outside center tile, keeping previous offset");
            }
        }

        let (ox, oy) = self.center_pixel_offset;
        let bounds = self.screen_bounds;
        let mut updated = false;
        for (position, slot) in self.grid.iter_mut() {
            let Some(tile) = slot.as_mut() else {
                continue;
            };
            let rect = position.pixel_rect().translate(ox, oy);
            if !bounds.map(|b| b.intersects(&rect)).unwrap_or(false) {
                continue;
            }
            if full_update || !tile.has_texture(&self.steps) {
                updated |= tile.update_texture(&map_type, self.high_quality, &self.steps);
            }
        }
        updated
    }

    fn compute_center_offset(
        &self,
        center: TileKey,
        x_offset: i32,
        y_offset: i32,
    ) -> Result<(i32, i32), CoordError> {
        let tile = TILE_SIZE as i32;
        let src_size = self.grid_size as i32 * tile;
        let magic = (self.grid_size as i32 - 1) / 2 * tile;
        let display_x = x_offset + magic - (src_size - self.width) / 2;
        let display_y = y_offset + magic - (src_size - self.height) / 2;

        let (cx, cz) = self.center_block;
        let (centering_x, centering_z) = center.centering_offset(cx, cz)?;
        Ok((display_x + centering_x, display_y + centering_z))
    }

    /// Draw every on-screen tile, shifted by `(offset_x, offset_y)`.
    pub fn draw(
        &self,
        backend: &mut dyn RenderBackend,
        alpha: f32,
        offset_x: i32,
        offset_y: i32,
    ) -> GridDrawReport {
        let mut report = GridDrawReport::default();
        let (ox, oy) = self.center_pixel_offset;
        for (position, tile) in self.tiles() {
            let rect = position.pixel_rect().translate(ox, oy);
            if !self.is_on_screen_rect(&rect) {
                report.offscreen += 1;
                continue;
            }
            report.visible += 1;
            let (drawn, placeholders) = tile.draw(
                backend,
                &self.steps,
                (rect.x1 + offset_x) as f64,
                (rect.y1 + offset_y) as f64,
                alpha,
            );
            report.drawn += drawn;
            report.placeholders += placeholders;
        }
        report
    }

    /// Restrict the on-screen area to `viewport`, or the padded screen when `None`.
    pub fn set_viewport(&mut self, viewport: Option<PixelRect>) {
        self.viewport = viewport;
        self.update_bounds();
    }

    fn update_bounds(&mut self) {
        let pad = self.screen_pad;
        self.screen_bounds = Some(self.viewport.unwrap_or_else(|| {
            PixelRect::new(-pad, -pad, self.width + pad, self.height + pad)
        }));
    }

    pub fn screen_bounds(&self) -> Option<PixelRect> {
        self.screen_bounds
    }

    pub fn is_on_screen_point(&self, x: i32, y: i32) -> bool {
        self.screen_bounds
            .map(|b| b.contains_point(x, y))
            .unwrap_or(false)
    }

    pub fn is_on_screen_rect(&self, rect: &PixelRect) -> bool {
        self.screen_bounds
            .map(|b| b.intersects(rect))
            .unwrap_or(false)
    }

    /// True when any part of the block area `[min, max]` (inclusive) is on screen.
    pub fn is_on_screen_area(&self, min_x: i32, min_z: i32, max_x: i32, max_z: i32) -> bool {
        if self.screen_bounds.is_none() {
            return false;
        }
        let block = block_pixel_size(self.zoom);
        let (x1, y1) = self.block_pixel_in_grid(min_x, min_z);
        let (x2, y2) = self.block_pixel_in_grid(max_x, max_z);
        self.is_on_screen_rect(&PixelRect::new(x1, y1, x2 + block, y2 + block))
    }

    /// Clamp a screen point into `[0, width] × [0, height]`.
    pub fn ensure_on_screen(&self, x: i32, y: i32) -> (i32, i32) {
        (x.clamp(0, self.width.max(0)), y.clamp(0, self.height.max(0)))
    }

    /// Screen pixel of a world block relative to the grid center.
    pub fn block_pixel_in_grid(&self, x: i32, z: i32) -> (i32, i32) {
        let block = block_pixel_size(self.zoom);
        let (cx, cz) = self.center_block;
        (
            self.width / 2 + (x - cx) * block,
            self.height / 2 + (z - cz) * block,
        )
    }

    /// World block under a screen pixel.
    pub fn block_at_pixel(&self, px: i32, py: i32) -> (i32, i32) {
        let block = block_pixel_size(self.zoom);
        let (cx, cz) = self.center_block;
        (
            cx + (px - self.width / 2).div_euclid(block),
            cz + (py - self.height / 2).div_euclid(block),
        )
    }

    /// True when a visible slot is empty or has nothing to draw yet.
    pub fn has_unloaded_tile(&self) -> bool {
        let (ox, oy) = self.center_pixel_offset;
        self.grid.iter().any(|(position, slot)| {
            let rect = position.pixel_rect().translate(ox, oy);
            self.is_on_screen_rect(&rect)
                && slot
                    .as_ref()
                    .map(|tile| !tile.has_texture(&self.steps))
                    .unwrap_or(true)
        })
    }

    /// World block bounds covered by the whole grid.
    pub fn grid_block_bounds(&self) -> Option<TileBounds> {
        let center = self.center_key?;
        let radius = (self.grid_size / 2) as i32;
        let upper_left = center.offset(-radius, -radius).bounds();
        let lower_right = center.offset(radius, radius).bounds();
        Some(TileBounds {
            min_x: upper_left.min_x,
            min_z: upper_left.min_z,
            max_x: lower_right.max_x,
            max_z: lower_right.max_z,
        })
    }

    /// Release every tile and forget the center.
    pub fn clear(&mut self) {
        let mut released = 0;
        for slot in self.grid.values_mut() {
            if let Some(mut tile) = slot.take() {
                tile.release(&self.steps);
                released += 1;
            }
        }
        self.center_key = None;
        self.map_type = None;
        debug!(released, "Cleared tile grid");
    }

    /// Resume logging backend errors.
    pub fn clear_backend_errors(&self) {
        self.steps.context().throttle().reset();
    }
}
