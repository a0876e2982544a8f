//! CLI error type.

use std::path::PathBuf;

use thiserror::Error;
use worldmap::config::ConfigError;
use worldmap::coord::CoordError;
use worldmap::logging::LoggingError;
use worldmap::region::RegionError;
use worldmap::render::RenderError;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to initialize logging: {0}")]
    Logging(#[from] LoggingError),

    #[error("failed to start renderer: {0}")]
    Render(#[from] RenderError),

    #[error(transparent)]
    Coord(#[from] CoordError),

    #[error("region store error: {0}")]
    Region(#[from] RegionError),

    #[error("failed to write {path}: {source}")]
    WriteImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{0}")]
    Usage(String),
}
