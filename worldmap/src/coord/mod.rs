//! Tile addressing module
//!
//! Pure coordinate math between world block positions, tile indices at a
//! zoom level, chunk positions and the fixed-size region rasters that back
//! every tile.
//!
//! # Coordinate spaces
//!
//! ```text
//!   block (world units)      x = -1024 ........ 0 ........ 1023
//!   chunk  (16 blocks)       x =   -64 ........ 0 ........   63
//!   region (32 chunks)       x =    -2     -1   0     1
//!   tile @ zoom 0 (512 blk)  x =    -2     -1   0     1
//!   tile @ zoom 1 (256 blk)  x =  -4  -3 -2  -1 0  1  2  3
//! ```
//!
//! A region raster is always `TILE_SIZE × TILE_SIZE` pixels at one pixel per
//! block. A tile is also `TILE_SIZE` pixels wide on screen, so at zoom `z`
//! each block is drawn `2^z` pixels wide and a tile covers `512 >> z` blocks.

mod region;
mod types;

pub use region::{tile_region_slices, RegionSlice};
pub use types::{
    ChunkPos, CoordError, MapKind, MapType, PixelRect, RegionCoord, TileBounds, TileKey,
    TilePosition, WorldId,
};

/// Pixel width and height of a tile on screen. Equal to [`REGION_SIZE`].
pub const TILE_SIZE: u32 = 512;

/// Blocks per chunk edge.
pub const CHUNK_SIZE: i32 = 16;

/// Chunks per region edge, as a shift (`32 = 1 << 5`).
pub const REGION_SHIFT: u32 = 5;

/// Chunks per region edge.
pub const REGION_CHUNKS: i32 = 1 << REGION_SHIFT;

/// Block radius around the player that is considered loaded.
pub const LOAD_RADIUS: i32 = 768;

/// Pixel width and height of a region raster, one pixel per block.
pub const REGION_SIZE: u32 = (REGION_CHUNKS * CHUNK_SIZE) as u32;

/// Highest supported zoom level. At this zoom a tile covers exactly one chunk.
pub const MAX_ZOOM: u8 = 5;

/// Shift between world blocks and tile indices for zoom 0.
const TILE_SHIFT: u32 = 9;

/// Validates a zoom level.
#[inline]
pub fn check_zoom(zoom: u8) -> Result<u8, CoordError> {
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }
    Ok(zoom)
}

/// Converts a world block coordinate to a tile index at `zoom`.
///
/// Arithmetic shift, so negative coordinates floor towards negative
/// infinity: block `-1` belongs to tile `-1`.
///
/// # Arguments
///
/// * `coord` - World block coordinate on one axis
/// * `zoom` - Zoom level (0 to `MAX_ZOOM`)
#[inline]
pub fn world_to_tile_index(coord: i32, zoom: u8) -> i32 {
    coord >> (TILE_SHIFT - zoom as u32)
}

/// Converts a tile index back to the world block coordinate of its upper-left edge.
#[inline]
pub fn tile_index_to_world(index: i32, zoom: u8) -> i32 {
    index << (TILE_SHIFT - zoom as u32)
}

/// Number of world blocks covered by one tile edge at `zoom`.
#[inline]
pub fn tile_block_width(zoom: u8) -> i32 {
    (TILE_SIZE as i32) >> zoom
}

/// Number of screen pixels one block occupies at `zoom`.
#[inline]
pub fn block_pixel_size(zoom: u8) -> i32 {
    1 << zoom
}

/// Number of chunks along one tile edge at `zoom`.
#[inline]
pub fn tile_chunk_width(zoom: u8) -> i32 {
    REGION_CHUNKS >> zoom
}
