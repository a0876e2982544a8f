//! Render backend abstraction and owned GPU-side textures.
//!
//! All texture creation, upload and drawing goes through the
//! [`RenderBackend`] trait, which is only ever driven from the render thread.
//! Textures that belong to one object are wrapped in [`OwnedTexture`], which
//! queues its id for deletion when dropped. The render thread drains the
//! queue once per frame.
//!
//! ```text
//!  worker threads                 render thread
//!  ──────────────                 ─────────────
//!  OwnedTexture::drop ──id──►  ReleaseQueue ──drain──► RenderBackend::delete_texture
//!                                   ▲                        │
//!                                   └──── retry (≤5) ◄───────┘ on error
//! ```
//!
//! # Example
//!
//! ```ignore
//! let queue = ReleaseQueue::new();
//! let mut backend = HeadlessBackend::new(1024, 768);
//!
//! let id = backend.create_texture(&image)?;
//! let texture = queue.adopt(id);
//! drop(texture);
//!
//! let report = queue.drain(&mut backend);
//! assert_eq!(report.released, 1);
//! ```

mod backend;
mod error;
mod headless;
mod release;

pub use backend::{Color, DrawRect, RenderBackend, TextureId, UvRect};
pub use error::BackendError;
pub use headless::{DrawCall, HeadlessBackend};
pub use release::{DrainReport, OwnedTexture, ReleaseQueue, TextureReleaser, MAX_RELEASE_ATTEMPTS};
