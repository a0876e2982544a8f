//! Release-on-drop textures and the queue that deletes them on the render thread.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, warn};

use super::{BackendError, RenderBackend, TextureId};

/// Delete attempts per texture before it is abandoned.
pub const MAX_RELEASE_ATTEMPTS: u32 = 5;

/// Sending side of the release queue. Cheap to clone, usable from any thread.
#[derive(Debug, Clone)]
pub struct TextureReleaser {
    tx: mpsc::UnboundedSender<TextureId>,
}

impl TextureReleaser {
    /// Queue a texture for deletion.
    pub fn release(&self, id: TextureId) {
        if self.tx.send(id).is_err() {
            debug!(texture = %id, "Release queue closed, texture dropped with backend");
        }
    }
}

/// A texture owned by exactly one holder. Dropping it queues the delete.
#[derive(Debug)]
pub struct OwnedTexture {
    id: TextureId,
    releaser: TextureReleaser,
}

impl OwnedTexture {
    pub fn new(id: TextureId, releaser: TextureReleaser) -> Self {
        Self { id, releaser }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    /// Replace this texture's pixels.
    pub fn update(
        &self,
        backend: &mut dyn RenderBackend,
        image: &image::RgbaImage,
    ) -> Result<(), BackendError> {
        backend.update_texture(self.id, image)
    }
}

impl Drop for OwnedTexture {
    fn drop(&mut self) {
        self.releaser.release(self.id);
    }
}

/// Outcome of one [`ReleaseQueue::drain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Textures deleted.
    pub released: usize,
    /// Deletes that failed and will be retried.
    pub retried: usize,
    /// Textures given up on after `MAX_RELEASE_ATTEMPTS`.
    pub abandoned: usize,
}

/// Receiving side: deletes queued textures when drained by the render thread.
pub struct ReleaseQueue {
    tx: mpsc::UnboundedSender<TextureId>,
    rx: Mutex<mpsc::UnboundedReceiver<TextureId>>,
    retry: Mutex<Vec<(TextureId, u32)>>,
    released_total: AtomicU64,
    abandoned_total: AtomicU64,
}

impl Default for ReleaseQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            retry: Mutex::new(Vec::new()),
            released_total: AtomicU64::new(0),
            abandoned_total: AtomicU64::new(0),
        }
    }

    pub fn releaser(&self) -> TextureReleaser {
        TextureReleaser {
            tx: self.tx.clone(),
        }
    }

    /// Take ownership of a freshly created texture.
    pub fn adopt(&self, id: TextureId) -> OwnedTexture {
        OwnedTexture::new(id, self.releaser())
    }

    /// Textures waiting for a retry.
    pub fn pending_retries(&self) -> usize {
        self.retry.lock().len()
    }

    pub fn released_total(&self) -> u64 {
        self.released_total.load(Ordering::Relaxed)
    }

    pub fn abandoned_total(&self) -> u64 {
        self.abandoned_total.load(Ordering::Relaxed)
    }

    /// Delete everything queued so far. Call once per frame on the render thread.
    pub fn drain(&self, backend: &mut dyn RenderBackend) -> DrainReport {
        let mut work: Vec<(TextureId, u32)> = std::mem::take(&mut *self.retry.lock());
        {
            let mut rx = self.rx.lock();
            loop {
                match rx.try_recv() {
                    Ok(id) => work.push((id, 0)),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
        }

        let mut report = DrainReport::default();
        let mut retry = Vec::new();
        for (id, attempts) in work {
            match backend.delete_texture(id) {
                Ok(()) => report.released += 1,
                Err(e) => {
                    let attempts = attempts + 1;
                    if attempts >= MAX_RELEASE_ATTEMPTS {
                        warn!(texture = %id, attempts, error = %e, "Giving up on texture delete");
                        report.abandoned += 1;
                    } else {
                        debug!(texture = %id, attempts, error = %e, "Texture delete failed, will retry");
                        report.retried += 1;
                        retry.push((id, attempts));
                    }
                }
            }
        }
        self.retry.lock().extend(retry);

        self.released_total
            .fetch_add(report.released as u64, Ordering::Relaxed);
        self.abandoned_total
            .fetch_add(report.abandoned as u64, Ordering::Relaxed);
        report
    }
}
