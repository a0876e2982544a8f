//! The render backend trait and the value types it draws with.

use std::fmt;

use image::RgbaImage;

use super::BackendError;

/// Backend handle of an uploaded texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex#{}", self.0)
    }
}

/// RGB color with a separate opacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    /// `0xRRGGBB`.
    pub rgb: u32,
    /// Opacity in `[0, 1]`.
    pub alpha: f32,
}

impl Color {
    pub const fn new(rgb: u32, alpha: f32) -> Self {
        Self { rgb, alpha }
    }

    pub fn to_rgba(&self) -> [u8; 4] {
        let a = (self.alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        [
            ((self.rgb >> 16) & 0xff) as u8,
            ((self.rgb >> 8) & 0xff) as u8,
            (self.rgb & 0xff) as u8,
            a,
        ]
    }
}

/// Destination rectangle in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DrawRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Normalised texture coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvRect {
    pub u1: f64,
    pub v1: f64,
    pub u2: f64,
    pub v2: f64,
}

impl UvRect {
    pub const FULL: UvRect = UvRect {
        u1: 0.0,
        v1: 0.0,
        u2: 1.0,
        v2: 1.0,
    };

    pub fn new(u1: f64, v1: f64, u2: f64, v2: f64) -> Self {
        Self { u1, v1, u2, v2 }
    }
}

/// Graphics backend driven from the render thread only.
pub trait RenderBackend {
    /// Upload an image into a new texture.
    fn create_texture(&mut self, image: &RgbaImage) -> Result<TextureId, BackendError>;

    /// Replace the pixels of an existing texture.
    fn update_texture(&mut self, id: TextureId, image: &RgbaImage) -> Result<(), BackendError>;

    fn delete_texture(&mut self, id: TextureId) -> Result<(), BackendError>;

    /// Fill a rectangle with a blended solid color.
    fn fill_rect(&mut self, rect: DrawRect, color: Color) -> Result<(), BackendError>;

    /// Draw the `uv` part of a texture into `dest`.
    fn draw_texture(
        &mut self,
        id: TextureId,
        uv: UvRect,
        dest: DrawRect,
        alpha: f32,
    ) -> Result<(), BackendError>;
}
