//! Shared command setup: configuration and logging.

use std::path::{Path, PathBuf};

use tracing::info;
use worldmap::config::MapConfig;
use worldmap::logging::{init_logging, LoggingGuard};

use crate::error::CliError;

/// Loaded configuration plus the logging guard, kept alive for the command.
pub struct CliRunner {
    config: MapConfig,
    config_path: Option<PathBuf>,
    _logging: LoggingGuard,
}

impl CliRunner {
    /// Load configuration from `path` (or the default location) and start logging.
    ///
    /// Each `-v` raises the log level one step above the configured one.
    pub fn new(path: Option<&Path>, verbose: u8) -> Result<Self, CliError> {
        let config_path = path.map(Path::to_path_buf).or_else(MapConfig::default_path);
        let mut config = match &config_path {
            Some(p) => MapConfig::load_or_default(p)?,
            None => MapConfig::default(),
        };
        match verbose {
            0 => {}
            1 => config.logging.level = "debug".to_string(),
            _ => config.logging.level = "trace".to_string(),
        }

        let logging = init_logging(&config.logging)?;
        Ok(Self {
            config,
            config_path,
            _logging: logging,
        })
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            version = worldmap::VERSION,
            command,
            config = ?self.config_path,
            "worldmap starting"
        );
    }
}
