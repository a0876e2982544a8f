//! Direct region textures shared by every draw step of a region.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{DataProvider, ExpirationPolicy, KeyedCache, LoadError};
use crate::region::{RegionImageKey, RegionRaster, Timestamp};
use crate::texture::{BackendError, OwnedTexture, ReleaseQueue, RenderBackend, TextureId};

/// Name of the region texture cache in statistics.
pub const REGION_TEXTURE_CACHE: &str = "region-textures";

/// Backend copy of one region raster.
///
/// Created empty by the cache; the render thread uploads the raster on first
/// use and re-uploads whenever the raster revision moves past the uploaded one.
#[derive(Debug)]
pub struct RegionTexture {
    key: RegionImageKey,
    state: Mutex<Option<(OwnedTexture, Timestamp)>>,
}

impl RegionTexture {
    fn new(key: RegionImageKey) -> Self {
        Self {
            key,
            state: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &RegionImageKey {
        &self.key
    }

    pub fn texture_id(&self) -> Option<TextureId> {
        self.state.lock().as_ref().map(|(texture, _)| texture.id())
    }

    /// Raster revision currently on the backend.
    pub fn uploaded_revision(&self) -> Option<Timestamp> {
        self.state.lock().as_ref().map(|(_, revision)| *revision)
    }

    /// Make the backend texture match `raster`. Render thread only.
    pub fn sync(
        &self,
        backend: &mut dyn RenderBackend,
        releases: &ReleaseQueue,
        raster: &RegionRaster,
    ) -> Result<TextureId, BackendError> {
        let mut state = self.state.lock();
        let revision = raster.revision();
        match state.as_mut() {
            Some((texture, uploaded)) if *uploaded == revision => Ok(texture.id()),
            Some((texture, uploaded)) => {
                texture.update(backend, &raster.read())?;
                *uploaded = revision;
                Ok(texture.id())
            }
            None => {
                let id = backend.create_texture(&raster.read())?;
                debug!(region = %self.key, texture = %id, "Uploaded region texture");
                *state = Some((releases.adopt(id), revision));
                Ok(id)
            }
        }
    }

    /// Drop the backend texture. It is released on the next drain.
    pub fn clear(&self) {
        self.state.lock().take();
    }
}

struct RegionTextureProvider {
    idle: Duration,
}

impl DataProvider<RegionImageKey, Arc<RegionTexture>> for RegionTextureProvider {
    fn name(&self) -> &str {
        REGION_TEXTURE_CACHE
    }

    fn expiration(&self) -> ExpirationPolicy {
        ExpirationPolicy::AfterAccess(self.idle)
    }

    fn load(&self, key: &RegionImageKey) -> Result<Arc<RegionTexture>, LoadError> {
        Ok(Arc::new(RegionTexture::new(*key)))
    }

    fn fallback(&self, key: &RegionImageKey) -> Arc<RegionTexture> {
        Arc::new(RegionTexture::new(*key))
    }
}

/// Region textures keyed by region and map type, expiring after idle time.
#[derive(Clone)]
pub struct RegionTextureCache {
    cache: KeyedCache<RegionImageKey, Arc<RegionTexture>>,
}

impl RegionTextureCache {
    pub fn new(idle: Duration) -> Self {
        let cache = KeyedCache::builder(Arc::new(RegionTextureProvider { idle }))
            .on_removal(|key, texture: Arc<RegionTexture>, cause| {
                debug!(region = %key, ?cause, texture = ?texture.texture_id(), "Region texture removed");
            })
            .build();
        Self { cache }
    }

    pub fn get(&self, key: &RegionImageKey) -> Arc<RegionTexture> {
        self.cache.get(key)
    }

    pub fn peek(&self, key: &RegionImageKey) -> Option<Arc<RegionTexture>> {
        self.cache.peek(key)
    }

    pub fn cache(&self) -> &KeyedCache<RegionImageKey, Arc<RegionTexture>> {
        &self.cache
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}
