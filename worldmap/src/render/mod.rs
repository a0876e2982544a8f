//! Tile rendering: the viewport grid, cached draw steps and the worker pool
//! that materializes their rasters.
//!
//! ```text
//!  GridRenderer ── TilePosition → Tile ── DrawStepKey ──► DrawStepCache
//!                                                            │
//!                                                     TileDrawStep (per key)
//!                                                      │            │
//!                                   RegionTextureCache ┘            └ scaled OwnedTexture
//!                                        (direct)                     (high quality)
//!                                           ▲                              ▲
//!                                           └────── Materializer ──────────┘
//!                                                  (tile-worker-N)
//! ```
//!
//! Everything that touches the [`RenderBackend`](crate::texture::RenderBackend)
//! runs on the caller's (render) thread. Region loads and resampling run on
//! the [`Materializer`] and are polled once per frame.

mod context;
mod draw_step;
mod draw_step_cache;
mod grid;
mod materializer;
mod metrics;
mod region_texture;
mod throttle;
mod tile;

use thiserror::Error;

use crate::coord::CoordError;

pub use context::RenderContext;
pub use draw_step::{DrawOutcome, DrawStepKey, DrawStepState, TileDrawStep};
pub use draw_step_cache::{DrawStepCache, SharedDrawStep, DRAW_STEP_CACHE};
pub use grid::{GridDrawReport, GridRenderer, MapContext};
pub use materializer::{Materializer, MaterializerStats, TaskHandle, TaskPoll};
pub use metrics::{RenderMetrics, RenderMetricsSnapshot};
pub use region_texture::{RegionTexture, RegionTextureCache, REGION_TEXTURE_CACHE};
pub use throttle::{ErrorThrottle, DEFAULT_MAX_BACKEND_ERRORS};
pub use tile::Tile;

/// Errors setting up the render pipeline.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to start tile worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Coord(#[from] CoordError),
}
