//! Map configuration loaded from an INI file.
//!
//! ```ini
//! [grid]
//! size = 5
//! high_quality = true
//! screen_pad = 32
//!
//! [cache]
//! draw_step_idle_secs = 30
//! region_image_idle_secs = 15
//! region_texture_idle_secs = 15
//!
//! [workers]
//! threads = 2
//!
//! [render]
//! background = #222222
//! background_alpha = 0.8
//! max_backend_errors = 20
//!
//! [logging]
//! level = info
//! directory = /var/log/worldmap
//! ```
//!
//! Missing keys keep their defaults and unknown keys are ignored.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::logging::LoggingConfig;
use crate::render::DEFAULT_MAX_BACKEND_ERRORS;
use crate::texture::Color;

/// Default grid edge in tiles.
pub const DEFAULT_GRID_SIZE: u32 = 5;

/// Default worker threads for raster work.
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// Upper bound on worker threads.
pub const MAX_WORKER_THREADS: usize = 4;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid value {value:?} for [{section}] {key}: {reason}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Viewport grid settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    /// Tiles per grid edge. Always odd.
    pub size: u32,
    /// Build upscaled textures for zoomed-in tiles.
    pub high_quality: bool,
    /// Pixels past each screen edge still treated as visible.
    pub screen_pad: i32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_GRID_SIZE,
            high_quality: true,
            screen_pad: 32,
        }
    }
}

/// Cache expiry settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub draw_step_idle: Duration,
    pub region_image_idle: Duration,
    pub region_texture_idle: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            draw_step_idle: Duration::from_secs(30),
            region_image_idle: Duration::from_secs(15),
            region_texture_idle: Duration::from_secs(15),
        }
    }
}

/// Presentation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Placeholder color drawn under every draw step.
    pub background: Color,
    /// Backend errors logged per session before suppression.
    pub max_backend_errors: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            background: Color::new(0x222222, 0.8),
            max_backend_errors: DEFAULT_MAX_BACKEND_ERRORS,
        }
    }
}

/// Complete map configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MapConfig {
    pub grid: GridConfig,
    pub cache: CacheConfig,
    /// Worker threads, clamped to `1..=MAX_WORKER_THREADS`.
    pub worker_threads: usize,
    pub render: RenderConfig,
    pub logging: LoggingConfig,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            cache: CacheConfig::default(),
            worker_threads: DEFAULT_WORKER_THREADS,
            render: RenderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MapConfig {
    /// `$XDG_CONFIG_HOME/worldmap/config.ini` (or the platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("worldmap").join("config.ini"))
    }

    /// Load from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini_str(&text)
    }

    /// Load from a file if it exists, otherwise defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();

        if let Some(size) = parse_key::<u32>(&ini, "grid", "size")? {
            config = config.with_grid_size(size)?;
        }
        if let Some(hq) = parse_bool(&ini, "grid", "high_quality")? {
            config.grid.high_quality = hq;
        }
        if let Some(pad) = parse_key::<i32>(&ini, "grid", "screen_pad")? {
            config.grid.screen_pad = pad;
        }

        if let Some(secs) = parse_key::<u64>(&ini, "cache", "draw_step_idle_secs")? {
            config.cache.draw_step_idle = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_key::<u64>(&ini, "cache", "region_image_idle_secs")? {
            config.cache.region_image_idle = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_key::<u64>(&ini, "cache", "region_texture_idle_secs")? {
            config.cache.region_texture_idle = Duration::from_secs(secs);
        }

        if let Some(threads) = parse_key::<usize>(&ini, "workers", "threads")? {
            config = config.with_worker_threads(threads);
        }

        if let Some(value) = get(&ini, "render", "background") {
            config.render.background.rgb = parse_hex_color(value).ok_or_else(|| {
                ConfigError::InvalidValue {
                    section: "render",
                    key: "background",
                    value: value.to_string(),
                    reason: "expected #RRGGBB".to_string(),
                }
            })?;
        }
        if let Some(alpha) = parse_key::<f32>(&ini, "render", "background_alpha")? {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(ConfigError::InvalidValue {
                    section: "render",
                    key: "background_alpha",
                    value: alpha.to_string(),
                    reason: "must be between 0 and 1".to_string(),
                });
            }
            config.render.background.alpha = alpha;
        }
        if let Some(max) = parse_key::<u32>(&ini, "render", "max_backend_errors")? {
            config.render.max_backend_errors = max;
        }

        if let Some(level) = get(&ini, "logging", "level") {
            config.logging.level = level.to_string();
        }
        if let Some(dir) = get(&ini, "logging", "directory") {
            config.logging.directory = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    /// Render back to INI text.
    pub fn to_ini_string(&self) -> String {
        let mut ini = Ini::new();
        ini.with_section(Some("grid"))
            .set("size", self.grid.size.to_string())
            .set("high_quality", self.grid.high_quality.to_string())
            .set("screen_pad", self.grid.screen_pad.to_string());
        ini.with_section(Some("cache"))
            .set(
                "draw_step_idle_secs",
                self.cache.draw_step_idle.as_secs().to_string(),
            )
            .set(
                "region_image_idle_secs",
                self.cache.region_image_idle.as_secs().to_string(),
            )
            .set(
                "region_texture_idle_secs",
                self.cache.region_texture_idle.as_secs().to_string(),
            );
        ini.with_section(Some("workers"))
            .set("threads", self.worker_threads.to_string());
        ini.with_section(Some("render"))
            .set("background", format!("#{:06x}", self.render.background.rgb))
            .set("background_alpha", self.render.background.alpha.to_string())
            .set(
                "max_backend_errors",
                self.render.max_backend_errors.to_string(),
            );
        ini.with_section(Some("logging"))
            .set("level", self.logging.level.clone());
        if let Some(dir) = &self.logging.directory {
            ini.with_section(Some("logging"))
                .set("directory", dir.display().to_string());
        }

        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = ini.write_to(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Write to a file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, self.to_ini_string()).map_err(io_err)
    }

    /// Set the grid edge. Must be odd so the grid has a center tile.
    pub fn with_grid_size(mut self, size: u32) -> Result<Self, ConfigError> {
        if size == 0 || size % 2 == 0 {
            return Err(ConfigError::InvalidValue {
                section: "grid",
                key: "size",
                value: size.to_string(),
                reason: "must be a positive odd number".to_string(),
            });
        }
        self.grid.size = size;
        Ok(self)
    }

    pub fn with_high_quality(mut self, enabled: bool) -> Self {
        self.grid.high_quality = enabled;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.clamp(1, MAX_WORKER_THREADS);
        self
    }

    pub fn with_draw_step_idle(mut self, idle: Duration) -> Self {
        self.cache.draw_step_idle = idle;
        self
    }

    pub fn with_region_texture_idle(mut self, idle: Duration) -> Self {
        self.cache.region_texture_idle = idle;
        self
    }

    pub fn with_background(mut self, background: Color) -> Self {
        self.render.background = background;
        self
    }

    pub fn with_max_backend_errors(mut self, max: u32) -> Self {
        self.render.max_backend_errors = max;
        self
    }
}

fn get<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section))
        .and_then(|props| props.get(key))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_key<T>(ini: &Ini, section: &'static str, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(ini, section, key) {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                section,
                key,
                value: value.to_string(),
                reason: e.to_string(),
            }),
    }
}

fn parse_bool(ini: &Ini, section: &'static str, key: &'static str) -> Result<Option<bool>, ConfigError> {
    match get(ini, section, key) {
        None => Ok(None),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                section,
                key,
                value: value.to_string(),
                reason: "expected true or false".to_string(),
            }),
        },
    }
}

fn parse_hex_color(value: &str) -> Option<u32> {
    let hex = value.strip_prefix('#').unwrap_or(value);
    if hex.len() != 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MapConfig::default();
        assert_eq!(config.grid.size, 5);
        assert!(config.grid.high_quality);
        assert_eq!(config.cache.draw_step_idle, Duration::from_secs(30));
        assert_eq!(config.cache.region_image_idle, Duration::from_secs(15));
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.render.background, Color::new(0x222222, 0.8));
        assert_eq!(config.render.max_backend_errors, 20);
    }

    #[test]
    fn test_parse_overrides() {
        let config = MapConfig::from_ini_str(
            "[grid]\nsize = 3\nhigh_quality = off\n\n[workers]\nthreads = 16\n\n\
             [render]\nbackground = #102030\nbackground_alpha = 0.5\n\n[other]\nfoo = bar\n",
        )
        .unwrap();

        assert_eq!(config.grid.size, 3);
        assert!(!config.grid.high_quality);
        assert_eq!(config.worker_threads, MAX_WORKER_THREADS);
        assert_eq!(config.render.background, Color::new(0x102030, 0.5));
        assert_eq!(config.cache.draw_step_idle, Duration::from_secs(30));
    }

    #[test]
    fn test_even_grid_size_rejected() {
        let err = MapConfig::from_ini_str("[grid]\nsize = 4\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                section: "grid",
                key: "size",
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_number_rejected() {
        let err = MapConfig::from_ini_str("[cache]\ndraw_step_idle_secs = soon\n").unwrap_err();
        assert!(err.to_string().contains("draw_step_idle_secs"));
    }

    #[test]
    fn test_bad_color_rejected() {
        assert!(MapConfig::from_ini_str("[render]\nbackground = grey\n").is_err());
        assert!(MapConfig::from_ini_str("[render]\nbackground_alpha = 1.5\n").is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.ini");
        let config = MapConfig::default()
            .with_grid_size(7)
            .unwrap()
            .with_worker_threads(3)
            .with_background(Color::new(0xabcdef, 1.0));

        config.save(&path).unwrap();
        let loaded = MapConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.ini");
        assert!(matches!(MapConfig::load(&path), Err(ConfigError::Io { .. })));
        assert_eq!(MapConfig::load_or_default(&path).unwrap(), MapConfig::default());
    }
}
