//! Coordinate value types.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    block_pixel_size, check_zoom, tile_block_width, tile_index_to_world, world_to_tile_index,
    CHUNK_SIZE, REGION_CHUNKS, REGION_SHIFT, TILE_SIZE,
};

/// Errors raised by coordinate computations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    /// A world position was queried against a tile that does not contain it.
    #[error("block {x},{z} is outside tile {tile}")]
    OutOfTileBounds { x: i32, z: i32, tile: TileKey },

    /// Zoom level outside `0..=MAX_ZOOM`.
    #[error("invalid zoom level: {0}")]
    InvalidZoom(u8),

    /// A map kind name that is not recognised.
    #[error("unknown map type: {0}")]
    UnknownMapType(String),
}

/// Stable identifier of a world (save directory) the map is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct WorldId(pub u32);

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "world-{}", self.0)
    }
}

/// Address of one tile at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub x: i32,
    pub z: i32,
    pub zoom: u8,
}

impl TileKey {
    pub fn new(x: i32, z: i32, zoom: u8) -> Self {
        Self { x, z, zoom }
    }

    /// Tile containing the given world block.
    pub fn from_world(block_x: i32, block_z: i32, zoom: u8) -> Result<Self, CoordError> {
        let zoom = check_zoom(zoom)?;
        Ok(Self {
            x: world_to_tile_index(block_x, zoom),
            z: world_to_tile_index(block_z, zoom),
            zoom,
        })
    }

    /// Canonical string key, `"{x},{z}@{zoom}"`.
    pub fn cache_key(&self) -> String {
        format!("{},{}@{}", self.x, self.z, self.zoom)
    }

    /// The tile `dx`, `dz` steps away at the same zoom.
    pub fn offset(&self, dx: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            z: self.z + dz,
            zoom: self.zoom,
        }
    }

    /// Inclusive world block bounds of this tile.
    pub fn bounds(&self) -> TileBounds {
        let width = tile_block_width(self.zoom);
        let min_x = tile_index_to_world(self.x, self.zoom);
        let min_z = tile_index_to_world(self.z, self.zoom);
        TileBounds {
            min_x,
            min_z,
            max_x: min_x + width - 1,
            max_z: min_z + width - 1,
        }
    }

    fn ensure_contains(&self, x: i32, z: i32) -> Result<TileBounds, CoordError> {
        let bounds = self.bounds();
        if !bounds.contains(x, z) {
            return Err(CoordError::OutOfTileBounds { x, z, tile: *self });
        }
        Ok(bounds)
    }

    /// Pixel position of a world block inside this tile's raster.
    ///
    /// Both components are in `[0, TILE_SIZE)`.
    pub fn pixel_offset_within_tile(&self, x: i32, z: i32) -> Result<(i32, i32), CoordError> {
        let bounds = self.ensure_contains(x, z)?;
        let block = block_pixel_size(self.zoom);
        Ok(((x - bounds.min_x) * block, (z - bounds.min_z) * block))
    }

    /// Offset that places this tile so the given block lands at the grid center.
    ///
    /// Negative coordinates are shifted by one block before scaling. Grid
    /// positioning depends on this exact value at every zoom level.
    pub fn centering_offset(&self, x: i32, z: i32) -> Result<(i32, i32), CoordError> {
        let bounds = self.ensure_contains(x, z)?;
        Ok((
            centering_axis(x, bounds.min_x, self.zoom),
            centering_axis(z, bounds.min_z, self.zoom),
        ))
    }
}

fn centering_axis(coord: i32, min: i32, zoom: u8) -> i32 {
    let block = block_pixel_size(zoom);
    let mut local = min - coord;
    if coord < 0 {
        local += 1;
    }
    TILE_SIZE as i32 / 2 + local * block - block / 2
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}@{}", self.x, self.z, self.zoom)
    }
}

/// Inclusive world block bounds of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBounds {
    pub min_x: i32,
    pub min_z: i32,
    pub max_x: i32,
    pub max_z: i32,
}

impl TileBounds {
    pub fn contains(&self, x: i32, z: i32) -> bool {
        x >= self.min_x && x <= self.max_x && z >= self.min_z && z <= self.max_z
    }

    /// Upper-left chunk.
    pub fn min_chunk(&self) -> ChunkPos {
        ChunkPos::from_block(self.min_x, self.min_z)
    }

    /// Lower-right chunk.
    pub fn max_chunk(&self) -> ChunkPos {
        ChunkPos::from_block(self.max_x, self.max_z)
    }
}

/// Slot of a tile relative to the grid center.
///
/// Ordered row-major: `delta_z` first, then `delta_x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TilePosition {
    pub delta_x: i32,
    pub delta_z: i32,
}

impl TilePosition {
    pub fn new(delta_x: i32, delta_z: i32) -> Self {
        Self { delta_x, delta_z }
    }

    pub fn is_center(&self) -> bool {
        self.delta_x == 0 && self.delta_z == 0
    }

    /// Grid-space pixel rectangle of this slot relative to the center tile origin.
    pub fn pixel_rect(&self) -> PixelRect {
        let size = TILE_SIZE as i32;
        PixelRect::from_size(self.delta_x * size, self.delta_z * size, size, size)
    }
}

impl Ord for TilePosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.delta_z
            .cmp(&other.delta_z)
            .then(self.delta_x.cmp(&other.delta_x))
    }
}

impl PartialOrd for TilePosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TilePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.delta_x, self.delta_z)
    }
}

/// Half-open integer rectangle `[x1, x2) × [y1, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl PixelRect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_size(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// True when the two rectangles share at least one pixel.
    pub fn intersects(&self, other: &PixelRect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x1 < other.x2
            && other.x1 < self.x2
            && self.y1 < other.y2
            && other.y1 < self.y2
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }

    pub fn contains_rect(&self, other: &PixelRect) -> bool {
        other.x1 >= self.x1 && other.x2 <= self.x2 && other.y1 >= self.y1 && other.y2 <= self.y2
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x1 + dx, self.y1 + dy, self.x2 + dx, self.y2 + dy)
    }
}

impl fmt::Display for PixelRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})-({},{})", self.x1, self.y1, self.x2, self.y2)
    }
}

/// A 16×16 column of world blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn from_block(block_x: i32, block_z: i32) -> Self {
        Self {
            x: block_x >> 4,
            z: block_z >> 4,
        }
    }

    pub fn min_block(&self) -> (i32, i32) {
        (self.x * CHUNK_SIZE, self.z * CHUNK_SIZE)
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c.{}.{}", self.x, self.z)
    }
}

/// Identifies one region raster: 32×32 chunks in one dimension of one world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionCoord {
    pub x: i32,
    pub z: i32,
    pub dimension: i32,
    pub world: WorldId,
}

impl RegionCoord {
    pub fn new(x: i32, z: i32, dimension: i32, world: WorldId) -> Self {
        Self {
            x,
            z,
            dimension,
            world,
        }
    }

    pub fn from_chunk(chunk: ChunkPos, dimension: i32, world: WorldId) -> Self {
        Self::new(
            chunk.x >> REGION_SHIFT,
            chunk.z >> REGION_SHIFT,
            dimension,
            world,
        )
    }

    pub fn from_block(block_x: i32, block_z: i32, dimension: i32, world: WorldId) -> Self {
        Self::from_chunk(ChunkPos::from_block(block_x, block_z), dimension, world)
    }

    pub fn min_chunk(&self) -> ChunkPos {
        ChunkPos::new(self.x << REGION_SHIFT, self.z << REGION_SHIFT)
    }

    pub fn max_chunk(&self) -> ChunkPos {
        let min = self.min_chunk();
        ChunkPos::new(min.x + REGION_CHUNKS - 1, min.z + REGION_CHUNKS - 1)
    }

    pub fn contains_chunk(&self, chunk: ChunkPos) -> bool {
        RegionCoord::from_chunk(chunk, self.dimension, self.world) == *self
    }

    /// Pixel rectangle a chunk occupies inside this region's raster.
    ///
    /// Returns `None` when the chunk belongs to another region.
    pub fn chunk_rect(&self, chunk: ChunkPos) -> Option<PixelRect> {
        if !self.contains_chunk(chunk) {
            return None;
        }
        let min = self.min_chunk();
        Some(PixelRect::from_size(
            (chunk.x - min.x) * CHUNK_SIZE,
            (chunk.z - min.z) * CHUNK_SIZE,
            CHUNK_SIZE,
            CHUNK_SIZE,
        ))
    }
}

impl fmt::Display for RegionCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r.{}.{}@DIM{}/{}", self.x, self.z, self.dimension, self.world)
    }
}

/// Kind of map being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapKind {
    Day,
    Night,
    Underground,
    Topo,
}

impl MapKind {
    pub fn name(&self) -> &'static str {
        match self {
            MapKind::Day => "day",
            MapKind::Night => "night",
            MapKind::Underground => "underground",
            MapKind::Topo => "topo",
        }
    }
}

impl fmt::Display for MapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MapKind {
    type Err = CoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(MapKind::Day),
            "night" => Ok(MapKind::Night),
            "underground" | "cave" => Ok(MapKind::Underground),
            "topo" => Ok(MapKind::Topo),
            other => Err(CoordError::UnknownMapType(other.to_string())),
        }
    }
}

/// Map kind plus the vertical slice (underground only) and dimension.
///
/// The slice is normalised at construction: it is always `Some` for
/// underground maps and always `None` otherwise, so equal maps compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapType {
    kind: MapKind,
    vslice: Option<u8>,
    dimension: i32,
}

impl MapType {
    pub fn new(kind: MapKind, vslice: Option<u8>, dimension: i32) -> Self {
        let vslice = match kind {
            MapKind::Underground => Some(vslice.unwrap_or(0)),
            _ => None,
        };
        Self {
            kind,
            vslice,
            dimension,
        }
    }

    pub fn day(dimension: i32) -> Self {
        Self::new(MapKind::Day, None, dimension)
    }

    pub fn night(dimension: i32) -> Self {
        Self::new(MapKind::Night, None, dimension)
    }

    pub fn topo(dimension: i32) -> Self {
        Self::new(MapKind::Topo, None, dimension)
    }

    pub fn underground(vslice: u8, dimension: i32) -> Self {
        Self::new(MapKind::Underground, Some(vslice), dimension)
    }

    pub fn kind(&self) -> MapKind {
        self.kind
    }

    pub fn vslice(&self) -> Option<u8> {
        self.vslice
    }

    pub fn dimension(&self) -> i32 {
        self.dimension
    }

    pub fn is_underground(&self) -> bool {
        self.kind == MapKind::Underground
    }

    /// Directory name under `DIM{n}/` holding this map type's region files.
    pub fn dir_name(&self) -> String {
        match self.vslice {
            Some(slice) => slice.to_string(),
            None => self.kind.name().to_string(),
        }
    }

    pub fn cache_key(&self) -> String {
        match self.vslice {
            Some(slice) => format!("{}{}@{}", self.kind, slice, self.dimension),
            None => format!("{}@{}", self.kind, self.dimension),
        }
    }
}

impl fmt::Display for MapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_key_cache_key() {
        assert_eq!(TileKey::new(3, -7, 2).cache_key(), "3,-7@2");
        assert_eq!(TileKey::new(0, 0, 0).to_string(), "0,0@0");
    }

    #[test]
    fn test_tile_key_equality_uses_all_fields() {
        assert_eq!(TileKey::new(1, 2, 3), TileKey::new(1, 2, 3));
        assert_ne!(TileKey::new(1, 2, 3), TileKey::new(1, 2, 4));
        assert_ne!(TileKey::new(1, 2, 3), TileKey::new(2, 1, 3));
    }

    #[test]
    fn test_tile_bounds_negative_tile() {
        let bounds = TileKey::new(-1, -1, 0).bounds();
        assert_eq!(bounds.min_x, -512);
        assert_eq!(bounds.max_x, -1);
        assert_eq!(bounds.min_chunk(), ChunkPos::new(-32, -32));
        assert_eq!(bounds.max_chunk(), ChunkPos::new(-1, -1));
    }

    #[test]
    fn test_pixel_offset_within_tile() {
        let tile = TileKey::new(0, 0, 1);
        assert_eq!(tile.pixel_offset_within_tile(0, 0), Ok((0, 0)));
        assert_eq!(tile.pixel_offset_within_tile(255, 10), Ok((510, 20)));

        let tile = TileKey::new(-1, -1, 0);
        assert_eq!(tile.pixel_offset_within_tile(-1, -512), Ok((511, 0)));
    }

    #[test]
    fn test_pixel_offset_out_of_bounds() {
        let tile = TileKey::new(0, 0, 0);
        let err = tile.pixel_offset_within_tile(512, 0).unwrap_err();
        assert!(matches!(err, CoordError::OutOfTileBounds { x: 512, z: 0, .. }));
        assert!(tile.centering_offset(-1, 0).is_err());
    }

    #[test]
    fn test_centering_offset_pinned_values() {
        let origin = TileKey::new(0, 0, 0);
        assert_eq!(origin.centering_offset(0, 0), Ok((256, 256)));
        assert_eq!(origin.centering_offset(511, 0), Ok((-255, 256)));

        let negative = TileKey::new(-1, -1, 0);
        assert_eq!(negative.centering_offset(-1, -1), Ok((-254, -254)));
        assert_eq!(negative.centering_offset(-512, -512), Ok((257, 257)));

        let zoomed = TileKey::new(0, 0, 1);
        assert_eq!(zoomed.centering_offset(0, 0), Ok((255, 255)));
    }

    #[test]
    fn test_tile_position_row_major_order() {
        let mut positions = vec![
            TilePosition::new(1, 0),
            TilePosition::new(-1, 1),
            TilePosition::new(0, -1),
            TilePosition::new(-1, 0),
        ];
        positions.sort();
        assert_eq!(
            positions,
            vec![
                TilePosition::new(0, -1),
                TilePosition::new(-1, 0),
                TilePosition::new(1, 0),
                TilePosition::new(-1, 1),
            ]
        );
    }

    #[test]
    fn test_tile_position_pixel_rect() {
        let rect = TilePosition::new(-1, 2).pixel_rect();
        assert_eq!(rect, PixelRect::new(-512, 1024, 0, 1536));
    }

    #[test]
    fn test_pixel_rect_intersection_is_strict() {
        let a = PixelRect::new(0, 0, 16, 16);
        assert!(a.intersects(&PixelRect::new(15, 15, 20, 20)));
        assert!(!a.intersects(&PixelRect::new(16, 0, 32, 16)));
        assert!(!a.intersects(&PixelRect::new(0, 0, 0, 0)));
    }

    #[test]
    fn test_region_from_chunk_negative() {
        let region = RegionCoord::from_chunk(ChunkPos::new(-1, 31), 0, WorldId(1));
        assert_eq!((region.x, region.z), (-1, 0));
        assert_eq!(region.min_chunk(), ChunkPos::new(-32, 0));
        assert_eq!(region.max_chunk(), ChunkPos::new(-1, 31));
    }

    #[test]
    fn test_region_chunk_rect() {
        let region = RegionCoord::new(-1, 0, 0, WorldId::default());
        assert_eq!(
            region.chunk_rect(ChunkPos::new(-31, 2)),
            Some(PixelRect::new(16, 32, 32, 48))
        );
        assert_eq!(region.chunk_rect(ChunkPos::new(0, 0)), None);
    }

    #[test]
    fn test_map_type_normalises_slice() {
        assert_eq!(MapType::new(MapKind::Day, Some(3), 0), MapType::day(0));
        assert_eq!(MapType::new(MapKind::Underground, None, 0).vslice(), Some(0));
        assert_eq!(MapType::underground(4, -1).dir_name(), "4");
        assert_eq!(MapType::night(0).dir_name(), "night");
    }

    #[test]
    fn test_map_kind_from_str() {
        assert_eq!("Topo".parse::<MapKind>(), Ok(MapKind::Topo));
        assert!(matches!(
            "sepia".parse::<MapKind>(),
            Err(CoordError::UnknownMapType(_))
        ));
    }
}
