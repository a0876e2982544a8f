//! Mapping tiles onto the region rasters that back them.

use super::{block_pixel_size, PixelRect, RegionCoord, TileKey, WorldId, CHUNK_SIZE};

/// A rectangular piece of one region raster drawn into part of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSlice {
    /// Region whose raster is sampled.
    pub region: RegionCoord,
    /// Source rectangle in the region raster (one pixel per block).
    pub sub_rect: PixelRect,
    /// Destination rectangle in tile-local screen pixels.
    pub dest: PixelRect,
}

/// Splits a tile into the region slices covering it.
///
/// Tiles are aligned to region boundaries at every supported zoom, so this
/// yields a single slice in practice. The loop stays general over the chunk
/// span so a tile straddling regions still resolves correctly.
pub fn tile_region_slices(tile: &TileKey, dimension: i32, world: WorldId) -> Vec<RegionSlice> {
    let bounds = tile.bounds();
    let start = bounds.min_chunk();
    let end = bounds.max_chunk();
    let first = RegionCoord::from_chunk(start, dimension, world);
    let last = RegionCoord::from_chunk(end, dimension, world);
    let block = block_pixel_size(tile.zoom);

    let mut slices = Vec::new();
    for rz in first.z..=last.z {
        for rx in first.x..=last.x {
            let region = RegionCoord::new(rx, rz, dimension, world);
            let region_min = region.min_chunk();
            let region_max = region.max_chunk();

            let min_cx = region_min.x.max(start.x);
            let min_cz = region_min.z.max(start.z);
            let max_cx = region_max.x.min(end.x);
            let max_cz = region_max.z.min(end.z);

            let sx1 = (min_cx - region_min.x) * CHUNK_SIZE;
            let sy1 = (min_cz - region_min.z) * CHUNK_SIZE;
            let sx2 = sx1 + (max_cx - min_cx + 1) * CHUNK_SIZE;
            let sy2 = sy1 + (max_cz - min_cz + 1) * CHUNK_SIZE;
            let sub_rect = PixelRect::new(sx1, sy1, sx2, sy2);

            let dx = (min_cx - start.x) * CHUNK_SIZE * block;
            let dz = (min_cz - start.z) * CHUNK_SIZE * block;
            let dest = PixelRect::from_size(
                dx,
                dz,
                sub_rect.width() * block,
                sub_rect.height() * block,
            );

            slices.push(RegionSlice {
                region,
                sub_rect,
                dest,
            });
        }
    }
    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TILE_SIZE;

    #[test]
    fn test_zoom_0_tile_is_whole_region() {
        let slices = tile_region_slices(&TileKey::new(-1, 2, 0), 0, WorldId(0));
        assert_eq!(slices.len(), 1);
        let slice = slices[0];
        assert_eq!((slice.region.x, slice.region.z), (-1, 2));
        assert_eq!(slice.sub_rect, PixelRect::new(0, 0, 512, 512));
        assert_eq!(slice.dest, PixelRect::new(0, 0, 512, 512));
    }

    #[test]
    fn test_zoom_1_quarters_region() {
        let slices = tile_region_slices(&TileKey::new(1, 0, 1), 0, WorldId(0));
        assert_eq!(slices.len(), 1);
        assert_eq!((slices[0].region.x, slices[0].region.z), (0, 0));
        assert_eq!(slices[0].sub_rect, PixelRect::new(256, 0, 512, 256));
        assert_eq!(slices[0].dest, PixelRect::new(0, 0, 512, 512));
    }

    #[test]
    fn test_negative_tile_at_max_zoom() {
        let slices = tile_region_slices(&TileKey::new(-1, -1, 5), 0, WorldId(0));
        assert_eq!(slices.len(), 1);
        assert_eq!((slices[0].region.x, slices[0].region.z), (-1, -1));
        assert_eq!(slices[0].sub_rect, PixelRect::new(496, 496, 512, 512));
    }

    #[test]
    fn test_dest_always_fills_tile() {
        for zoom in 0..=crate::coord::MAX_ZOOM {
            for slice in tile_region_slices(&TileKey::new(3, -5, zoom), 0, WorldId(0)) {
                assert_eq!(slice.dest.width(), TILE_SIZE as i32);
                assert_eq!(slice.dest.height(), TILE_SIZE as i32);
            }
        }
    }
}
