//! Region image store backed by a keyed cache and optional PNG files.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tracing::{debug, info, warn};

use super::{RegionError, RegionImageKey, RegionRaster, RegionStore, Timestamp};
use crate::cache::{DataProvider, ExpirationPolicy, KeyedCache, LoadError, RemovalCause};
use crate::coord::{ChunkPos, MapType, PixelRect, RegionCoord, WorldId, CHUNK_SIZE};

/// Name of the region image cache in statistics.
pub const REGION_IMAGE_CACHE: &str = "region-images";

/// Path of a region raster file under a world map directory.
///
/// Layout: `{root}/DIM{dimension}/{day|night|topo|<slice>}/{rx},{rz}.png`.
pub fn region_file_path(root: &Path, region: &RegionCoord, map_type: &MapType) -> PathBuf {
    root.join(format!("DIM{}", region.dimension))
        .join(map_type.dir_name())
        .join(format!("{},{}.png", region.x, region.z))
}

#[derive(Debug, Default)]
struct StoreClock(AtomicU64);

impl StoreClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.0.load(Ordering::Acquire))
    }

    fn tick(&self) -> Timestamp {
        Timestamp(self.0.fetch_add(1, Ordering::AcqRel) + 1)
    }
}

struct RegionImageLoader {
    root: Option<PathBuf>,
    clock: Arc<StoreClock>,
    policy: ExpirationPolicy,
}

impl DataProvider<RegionImageKey, Arc<RegionRaster>> for RegionImageLoader {
    fn name(&self) -> &str {
        REGION_IMAGE_CACHE
    }

    fn expiration(&self) -> ExpirationPolicy {
        self.policy
    }

    fn load(&self, key: &RegionImageKey) -> Result<Arc<RegionRaster>, LoadError> {
        let stamp = self.clock.now();
        let Some(root) = &self.root else {
            return Ok(Arc::new(RegionRaster::blank(stamp)));
        };

        let path = region_file_path(root, &key.region, &key.map_type);
        if !path.exists() {
            return Ok(Arc::new(RegionRaster::blank(stamp)));
        }

        // A file that cannot be decoded is replaced by a resident blank raster
        // so it is reported once and writes land in the cache.
        let decoded = match image::open(&path) {
            Ok(decoded) => decoded.to_rgba8(),
            Err(image::ImageError::IoError(source)) => {
                return Err(RegionError::Io { path, source }.into());
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Region file is corrupt, using blank raster");
                return Ok(Arc::new(RegionRaster::blank(stamp)));
            }
        };
        match RegionRaster::from_image(decoded, stamp) {
            Ok(raster) => Ok(Arc::new(raster)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Region file has wrong size, using blank raster");
                Ok(Arc::new(RegionRaster::blank(stamp)))
            }
        }
    }

    fn fallback(&self, _key: &RegionImageKey) -> Arc<RegionRaster> {
        Arc::new(RegionRaster::blank(self.clock.now()))
    }
}

fn save_raster(root: &Path, key: &RegionImageKey, raster: &RegionRaster) -> Result<(), RegionError> {
    let path = region_file_path(root, &key.region, &key.map_type);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| RegionError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    raster.read().save(&path)?;
    raster.mark_saved();
    debug!(path = %path.display(), "Saved region raster");
    Ok(())
}

/// Store for the region rasters of one world.
///
/// In-memory stores keep rasters until purged. Disk-backed stores load PNG
/// files on demand, expire rasters after a period without access and write
/// modified rasters back when they leave the cache.
pub struct RegionImageStore {
    world: WorldId,
    root: Option<PathBuf>,
    clock: Arc<StoreClock>,
    images: KeyedCache<RegionImageKey, Arc<RegionRaster>>,
}

impl RegionImageStore {
    /// Store with no backing files. Unknown regions start blank.
    pub fn in_memory(world: WorldId) -> Self {
        Self::build(world, None, ExpirationPolicy::Never)
    }

    /// Store reading and writing region files under `root`.
    ///
    /// # Arguments
    ///
    /// * `world` - World the rasters belong to
    /// * `root` - World map directory holding the `DIM{n}` folders
    /// * `idle` - Time without access after which a raster is evicted and saved
    pub fn open(world: WorldId, root: impl Into<PathBuf>, idle: Duration) -> Self {
        Self::build(world, Some(root.into()), ExpirationPolicy::AfterAccess(idle))
    }

    fn build(world: WorldId, root: Option<PathBuf>, policy: ExpirationPolicy) -> Self {
        let clock = Arc::new(StoreClock::default());
        let loader = Arc::new(RegionImageLoader {
            root: root.clone(),
            clock: Arc::clone(&clock),
            policy,
        });

        let mut builder = KeyedCache::builder(loader);
        if let Some(save_root) = root.clone() {
            builder = builder.on_removal(
                move |key: &RegionImageKey, raster: Arc<RegionRaster>, cause: RemovalCause| {
                    if cause == RemovalCause::Replaced || !raster.is_modified() {
                        return;
                    }
                    if let Err(e) = save_raster(&save_root, key, &raster) {
                        warn!(region = %key, error = %e, "Failed to save evicted region raster");
                    }
                },
            );
        }

        Self {
            world,
            root,
            clock,
            images: builder.build(),
        }
    }

    pub fn world(&self) -> WorldId {
        self.world
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Current store time.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// The raster cache, for registration with a cache manager.
    pub fn cache(&self) -> &KeyedCache<RegionImageKey, Arc<RegionRaster>> {
        &self.images
    }

    /// Write one chunk's 16×16 image into its region raster.
    ///
    /// Returns the chunk's rectangle in region pixel space, which is also
    /// logged as a dirty area.
    pub fn put_chunk(
        &self,
        chunk: ChunkPos,
        map_type: &MapType,
        image: &RgbaImage,
    ) -> Result<PixelRect, RegionError> {
        if image.width() != CHUNK_SIZE as u32 || image.height() != CHUNK_SIZE as u32 {
            return Err(RegionError::WrongSize {
                width: image.width(),
                height: image.height(),
                expected: CHUNK_SIZE as u32,
            });
        }
        let region = RegionCoord::from_chunk(chunk, map_type.dimension(), self.world);
        let rect = region
            .chunk_rect(chunk)
            .ok_or_else(|| RegionError::Unavailable(region.to_string()))?;

        let raster = self.writable(RegionImageKey::new(region, *map_type))?;
        raster.patch(rect.x1, rect.y1, image, self.clock.tick())
    }

    /// Replace a whole region raster. The full raster is logged as dirty.
    pub fn put_region(
        &self,
        region: &RegionCoord,
        map_type: &MapType,
        image: &RgbaImage,
    ) -> Result<PixelRect, RegionError> {
        let raster = self.writable(RegionImageKey::new(*region, *map_type))?;
        raster.patch(0, 0, image, self.clock.tick())
    }

    /// The resident raster for `key`, loading it first.
    ///
    /// A failed load leaves only the unstored fallback, which must not be
    /// patched.
    fn writable(&self, key: RegionImageKey) -> Result<Arc<RegionRaster>, RegionError> {
        let raster = self.images.get(&key);
        match self.images.peek(&key) {
            Some(resident) if Arc::ptr_eq(&resident, &raster) => Ok(raster),
            _ => Err(RegionError::Unavailable(key.to_string())),
        }
    }

    /// Save every modified resident raster. Returns the number written.
    pub fn flush(&self) -> Result<usize, RegionError> {
        let Some(root) = &self.root else {
            return Ok(0);
        };
        let mut saved = 0;
        for (key, raster) in self.images.entries() {
            if raster.is_modified() {
                save_raster(root, &key, &raster)?;
                saved += 1;
            }
        }
        info!(saved, root = %root.display(), "Flushed region rasters");
        Ok(saved)
    }
}

impl RegionStore for RegionImageStore {
    fn image(
        &self,
        region: &RegionCoord,
        map_type: &MapType,
    ) -> Result<Arc<RegionRaster>, RegionError> {
        Ok(self.images.get(&RegionImageKey::new(*region, *map_type)))
    }

    fn resident_image(&self, region: &RegionCoord, map_type: &MapType) -> Option<Arc<RegionRaster>> {
        self.images.peek(&RegionImageKey::new(*region, *map_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn chunk_image(color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(16, 16, Rgba(color))
    }

    #[test]
    fn test_region_file_path_layout() {
        let region = RegionCoord::new(-2, 3, -1, WorldId(0));
        let path = region_file_path(Path::new("/maps"), &region, &MapType::underground(4, -1));
        assert_eq!(path, PathBuf::from("/maps/DIM-1/4/-2,3.png"));

        let path = region_file_path(Path::new("/maps"), &region, &MapType::day(-1));
        assert_eq!(path, PathBuf::from("/maps/DIM-1/day/-2,3.png"));
    }

    #[test]
    fn test_unknown_region_is_blank() {
        let store = RegionImageStore::in_memory(WorldId(1));
        let region = RegionCoord::new(0, 0, 0, WorldId(1));
        let raster = store.image(&region, &MapType::day(0)).unwrap();
        assert_eq!(raster.read().get_pixel(100, 100), &Rgba([0, 0, 0, 0]));
        assert!(store.resident_image(&region, &MapType::day(0)).is_some());
    }

    #[test]
    fn test_put_chunk_logs_dirty_area() {
        let store = RegionImageStore::in_memory(WorldId(1));
        let day = MapType::day(0);
        let region = RegionCoord::new(0, 0, 0, WorldId(1));
        store.image(&region, &day).unwrap();
        let before = store.revision(&region, &day).unwrap();

        let rect = store
            .put_chunk(ChunkPos::new(1, 0), &day, &chunk_image([5, 5, 5, 255]))
            .unwrap();

        assert_eq!(rect, PixelRect::new(16, 0, 32, 16));
        assert!(store.revision(&region, &day).unwrap() > before);
        assert_eq!(store.dirty_areas(&region, &day, before), vec![rect]);
    }

    #[test]
    fn test_put_chunk_rejects_wrong_size() {
        let store = RegionImageStore::in_memory(WorldId(1));
        let result = store.put_chunk(ChunkPos::new(0, 0), &MapType::day(0), &RgbaImage::new(8, 8));
        assert!(matches!(result, Err(RegionError::WrongSize { expected: 16, .. })));
    }

    #[test]
    fn test_flush_and_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let day = MapType::day(0);
        let region = RegionCoord::new(-1, 0, 0, WorldId(2));

        let store = RegionImageStore::open(WorldId(2), dir.path(), Duration::from_secs(60));
        store
            .put_chunk(ChunkPos::new(-32, 0), &day, &chunk_image([10, 20, 30, 255]))
            .unwrap();
        assert_eq!(store.flush().unwrap(), 1);
        assert_eq!(store.flush().unwrap(), 0);
        assert!(region_file_path(dir.path(), &region, &day).exists());

        let reopened = RegionImageStore::open(WorldId(2), dir.path(), Duration::from_secs(60));
        let raster = reopened.image(&region, &day).unwrap();
        assert_eq!(raster.read().get_pixel(3, 3), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_eviction_saves_modified_raster() {
        let dir = tempfile::tempdir().unwrap();
        let night = MapType::night(0);
        let region = RegionCoord::new(0, 0, 0, WorldId(3));

        let store = RegionImageStore::open(WorldId(3), dir.path(), Duration::from_secs(60));
        store
            .put_chunk(ChunkPos::new(0, 0), &night, &chunk_image([1, 2, 3, 255]))
            .unwrap();
        store.cache().invalidate_all();

        assert!(region_file_path(dir.path(), &region, &night).exists());
    }

    #[test]
    fn test_wrong_size_file_loads_blank() {
        let dir = tempfile::tempdir().unwrap();
        let day = MapType::day(0);
        let region = RegionCoord::new(0, 0, 0, WorldId(0));
        let path = region_file_path(dir.path(), &region, &day);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbaImage::from_pixel(64, 64, Rgba([255; 4])).save(&path).unwrap();

        let store = RegionImageStore::open(WorldId(0), dir.path(), Duration::from_secs(60));
        let raster = store.image(&region, &day).unwrap();
        assert_eq!(raster.read().dimensions(), (512, 512));
        assert_eq!(raster.read().get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_corrupt_file_loads_resident_blank() {
        let dir = tempfile::tempdir().unwrap();
        let day = MapType::day(0);
        let region = RegionCoord::new(0, 0, 0, WorldId(0));
        let path = region_file_path(dir.path(), &region, &day);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not a png").unwrap();

        let store = RegionImageStore::open(WorldId(0), dir.path(), Duration::from_secs(60));
        let raster = store.image(&region, &day).unwrap();
        assert_eq!(raster.read().get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert!(store.resident_image(&region, &day).is_some());

        store
            .put_chunk(ChunkPos::new(0, 0), &day, &chunk_image([9, 9, 9, 255]))
            .unwrap();
        let resident = store.resident_image(&region, &day).unwrap();
        assert_eq!(resident.read().get_pixel(1, 1), &Rgba([9, 9, 9, 255]));

        let stats = store.cache().stats();
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.load_exceptions, 0);
    }

    #[test]
    fn test_unreadable_file_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let day = MapType::day(0);
        let region = RegionCoord::new(0, 0, 0, WorldId(0));
        // A directory at the file path fails with an I/O error on read.
        std::fs::create_dir_all(region_file_path(dir.path(), &region, &day)).unwrap();

        let store = RegionImageStore::open(WorldId(0), dir.path(), Duration::from_secs(60));
        let result = store.put_chunk(ChunkPos::new(0, 0), &day, &chunk_image([9, 9, 9, 255]));
        assert!(matches!(result, Err(RegionError::Unavailable(_))));
        assert!(store.resident_image(&region, &day).is_none());
        assert_eq!(store.cache().stats().load_exceptions, 1);
    }
}
