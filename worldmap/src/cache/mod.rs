//! Keyed expiring caches and the registry that owns them.
//!
//! ```text
//!   CacheManager ──owns──► KeyedCache<RegionImageKey, Arc<RegionRaster>>
//!                 ├──────► KeyedCache<RegionImageKey, Arc<RegionTexture>>
//!                 └──────► KeyedCache<DrawStepKey, SharedDrawStep>
//! ```

mod keyed;
mod manager;
mod stats;

pub use keyed::{
    DataProvider, ExpirationPolicy, KeyedCache, KeyedCacheBuilder, LoadError, RemovalCause,
};
pub use manager::{CacheManager, ManagedCache};
pub use stats::CacheStats;
