//! Region rasters and the store that supplies them.
//!
//! A region raster is a `REGION_SIZE × REGION_SIZE` RGBA image at one pixel per
//! block, covering 32×32 chunks. Rasters are patched in place as chunk data
//! arrives. Every patch is stamped with a store-wide logical [`Timestamp`]
//! and logged as a dirty area, so derived resources can tell which part of
//! the raster changed since they were built.
//!
//! # Example
//!
//! ```ignore
//! let store = RegionImageStore::open(world, "/saves/overworld/map", Duration::from_secs(15));
//! store.put_chunk(chunk, &MapType::day(0), &chunk_image)?;
//!
//! let since = step_revision;
//! let dirty = store.dirty_areas(&region, &MapType::day(0), since);
//! ```

mod merge;
mod raster;
mod store;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::coord::{MapType, PixelRect, RegionCoord};

pub use merge::merge_chunks;
pub use raster::RegionRaster;
pub use store::{region_file_path, RegionImageStore, REGION_IMAGE_CACHE};

/// Logical, monotonically increasing store time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Cache key for one region raster of one map type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionImageKey {
    pub region: RegionCoord,
    pub map_type: MapType,
}

impl RegionImageKey {
    pub fn new(region: RegionCoord, map_type: MapType) -> Self {
        Self { region, map_type }
    }
}

impl fmt::Display for RegionImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.region, self.map_type)
    }
}

/// Errors produced while loading, saving or reading region rasters.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("raster is {width}x{height}, expected {expected}x{expected}")]
    WrongSize {
        width: u32,
        height: u32,
        expected: u32,
    },

    #[error("rect {rect} is outside the {width}x{height} raster")]
    OutOfBounds {
        rect: PixelRect,
        width: u32,
        height: u32,
    },

    #[error("region {0} is unavailable")]
    Unavailable(String),
}

/// Supplier of region rasters.
///
/// Implementations must be callable from worker threads.
pub trait RegionStore: Send + Sync {
    /// Raster for a region, loading it if needed. Always `REGION_SIZE` square.
    fn image(&self, region: &RegionCoord, map_type: &MapType)
        -> Result<Arc<RegionRaster>, RegionError>;

    /// Raster for a region only if it is already resident. Never blocks on I/O.
    fn resident_image(&self, region: &RegionCoord, map_type: &MapType) -> Option<Arc<RegionRaster>>;

    /// Areas changed after `since`.
    ///
    /// An empty result means "assume everything changed", not "nothing
    /// changed". Callers compare [`revision`](Self::revision) first.
    fn dirty_areas(&self, region: &RegionCoord, map_type: &MapType, since: Timestamp) -> Vec<PixelRect> {
        self.resident_image(region, map_type)
            .map(|raster| raster.dirty_since(since))
            .unwrap_or_default()
    }

    /// Time of the last write to a resident raster.
    fn revision(&self, region: &RegionCoord, map_type: &MapType) -> Option<Timestamp> {
        self.resident_image(region, map_type)
            .map(|raster| raster.revision())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_ordering() {
        assert!(Timestamp(3) > Timestamp::ZERO);
        assert_eq!(Timestamp(7).to_string(), "t7");
    }

    #[test]
    fn test_region_error_display() {
        let err = RegionError::OutOfBounds {
            rect: PixelRect::new(500, 0, 520, 16),
            width: 512,
            height: 512,
        };
        assert_eq!(
            err.to_string(),
            "rect (500,0)-(520,16) is outside the 512x512 raster"
        );
    }
}
