//! Worldmap - tiled rendering of a 2D world map from region rasters
//!
//! This library provides tile addressing, the viewport grid, cached draw
//! steps and the background pipeline that turns region rasters into
//! textures without ever blocking the render thread.

pub mod cache;
pub mod config;
pub mod coord;
pub mod logging;
pub mod region;
pub mod render;
pub mod session;
pub mod texture;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
