//! Shared, in-place patchable region raster.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use image::imageops::{self, FilterType};
use image::RgbaImage;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use super::{RegionError, Timestamp};
use crate::coord::{PixelRect, REGION_SIZE};

/// Dirty areas kept per raster before the oldest are forgotten.
const DIRTY_LOG_CAPACITY: usize = 1024;

#[derive(Debug)]
struct DirtyLog {
    entries: VecDeque<(Timestamp, PixelRect)>,
    /// Queries with `since` earlier than this cannot be answered exactly.
    floor: Timestamp,
}

/// A region raster shared between the store, draw steps and workers.
///
/// Readers may overlap a patch in progress on another raster, never on the
/// same one: patches take the write lock for the duration of a chunk copy.
#[derive(Debug)]
pub struct RegionRaster {
    image: RwLock<RgbaImage>,
    revision: AtomicU64,
    modified: AtomicBool,
    dirty: Mutex<DirtyLog>,
}

impl RegionRaster {
    /// Fully transparent raster created at `stamp`.
    pub fn blank(stamp: Timestamp) -> Self {
        Self::with_image(RgbaImage::new(REGION_SIZE, REGION_SIZE), stamp)
    }

    /// Wrap a decoded image, rejecting anything but `REGION_SIZE` square.
    pub fn from_image(image: RgbaImage, stamp: Timestamp) -> Result<Self, RegionError> {
        if image.width() != REGION_SIZE || image.height() != REGION_SIZE {
            return Err(RegionError::WrongSize {
                width: image.width(),
                height: image.height(),
                expected: REGION_SIZE,
            });
        }
        Ok(Self::with_image(image, stamp))
    }

    fn with_image(image: RgbaImage, stamp: Timestamp) -> Self {
        Self {
            image: RwLock::new(image),
            revision: AtomicU64::new(stamp.0),
            modified: AtomicBool::new(false),
            dirty: Mutex::new(DirtyLog {
                entries: VecDeque::new(),
                floor: stamp,
            }),
        }
    }

    /// Time of the last write.
    pub fn revision(&self) -> Timestamp {
        Timestamp(self.revision.load(Ordering::Acquire))
    }

    /// True when the raster has writes not yet saved.
    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    pub fn mark_saved(&self) {
        self.modified.store(false, Ordering::Release);
    }

    /// Read access to the pixels.
    pub fn read(&self) -> RwLockReadGuard<'_, RgbaImage> {
        self.image.read()
    }

    /// Copy of a sub-rectangle.
    pub fn crop(&self, rect: PixelRect) -> Result<RgbaImage, RegionError> {
        self.check_bounds(rect)?;
        let image = self.image.read();
        Ok(imageops::crop_imm(
            &*image,
            rect.x1 as u32,
            rect.y1 as u32,
            rect.width() as u32,
            rect.height() as u32,
        )
        .to_image())
    }

    /// Crop a sub-rectangle and resample it to `size × size` with nearest-neighbour.
    pub fn scaled_crop(&self, rect: PixelRect, size: u32) -> Result<RgbaImage, RegionError> {
        let cropped = self.crop(rect)?;
        if cropped.width() == size && cropped.height() == size {
            return Ok(cropped);
        }
        Ok(imageops::resize(&cropped, size, size, FilterType::Nearest))
    }

    /// Write `patch` with its upper-left corner at `(x, y)` and log the area.
    pub fn patch(
        &self,
        x: i32,
        y: i32,
        patch: &RgbaImage,
        stamp: Timestamp,
    ) -> Result<PixelRect, RegionError> {
        let rect = PixelRect::from_size(x, y, patch.width() as i32, patch.height() as i32);
        self.check_bounds(rect)?;
        {
            let mut image = self.image.write();
            imageops::replace(&mut *image, patch, x as i64, y as i64);
        }
        self.record(rect, stamp);
        Ok(rect)
    }

    fn record(&self, rect: PixelRect, stamp: Timestamp) {
        let mut log = self.dirty.lock();
        if log.entries.len() == DIRTY_LOG_CAPACITY {
            if let Some((dropped, _)) = log.entries.pop_front() {
                log.floor = dropped;
            }
        }
        log.entries.push_back((stamp, rect));
        self.revision.fetch_max(stamp.0, Ordering::AcqRel);
        self.modified.store(true, Ordering::Release);
    }

    /// Areas written after `since`; empty when the log cannot cover `since`.
    pub fn dirty_since(&self, since: Timestamp) -> Vec<PixelRect> {
        let log = self.dirty.lock();
        if since < log.floor {
            return Vec::new();
        }
        log.entries
            .iter()
            .filter(|(stamp, _)| *stamp > since)
            .map(|(_, rect)| *rect)
            .collect()
    }

    fn check_bounds(&self, rect: PixelRect) -> Result<(), RegionError> {
        let bounds = PixelRect::new(0, 0, REGION_SIZE as i32, REGION_SIZE as i32);
        if rect.is_empty() || !bounds.contains_rect(&rect) {
            return Err(RegionError::OutOfBounds {
                rect,
                width: REGION_SIZE,
                height: REGION_SIZE,
            });
        }
        Ok(())
    }
}
