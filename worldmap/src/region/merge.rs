//! Stitching region rasters into a single image for a chunk span.

use image::imageops;
use image::RgbaImage;
use tracing::debug;

use super::{RegionError, RegionStore};
use crate::coord::{ChunkPos, MapType, PixelRect, RegionCoord, WorldId, CHUNK_SIZE};

/// Merge the rasters covering `start..=end` (chunks, inclusive) into one image.
///
/// The result is `16 × (end - start + 1)` pixels on each axis with `start`
/// at the upper-left corner. Corners are normalised, so either order works.
pub fn merge_chunks(
    store: &dyn RegionStore,
    world: WorldId,
    start: ChunkPos,
    end: ChunkPos,
    map_type: &MapType,
) -> Result<RgbaImage, RegionError> {
    let min = ChunkPos::new(start.x.min(end.x), start.z.min(end.z));
    let max = ChunkPos::new(start.x.max(end.x), start.z.max(end.z));
    let width = ((max.x - min.x + 1) * CHUNK_SIZE) as u32;
    let height = ((max.z - min.z + 1) * CHUNK_SIZE) as u32;
    let mut merged = RgbaImage::new(width, height);

    let dimension = map_type.dimension();
    let first = RegionCoord::from_chunk(min, dimension, world);
    let last = RegionCoord::from_chunk(max, dimension, world);

    for rz in first.z..=last.z {
        for rx in first.x..=last.x {
            let region = RegionCoord::new(rx, rz, dimension, world);
            let region_min = region.min_chunk();
            let region_max = region.max_chunk();

            let cx1 = region_min.x.max(min.x);
            let cz1 = region_min.z.max(min.z);
            let cx2 = region_max.x.min(max.x);
            let cz2 = region_max.z.min(max.z);

            let source = PixelRect::new(
                (cx1 - region_min.x) * CHUNK_SIZE,
                (cz1 - region_min.z) * CHUNK_SIZE,
                (cx2 - region_min.x + 1) * CHUNK_SIZE,
                (cz2 - region_min.z + 1) * CHUNK_SIZE,
            );
            let piece = store.image(&region, map_type)?.crop(source)?;

            let dx = ((cx1 - min.x) * CHUNK_SIZE) as i64;
            let dz = ((cz1 - min.z) * CHUNK_SIZE) as i64;
            imageops::replace(&mut merged, &piece, dx, dz);
        }
    }

    debug!(
        start = %min,
        end = %max,
        width,
        height,
        regions = (last.x - first.x + 1) * (last.z - first.z + 1),
        "Merged region rasters"
    );
    Ok(merged)
}
