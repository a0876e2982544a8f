//! Software render backend for headless rendering and tests.

use std::collections::HashMap;

use image::{Rgba, RgbaImage};

use super::{BackendError, Color, DrawRect, RenderBackend, TextureId, UvRect};

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    Fill { rect: DrawRect, color: Color },
    Texture {
        id: TextureId,
        uv: UvRect,
        dest: DrawRect,
        alpha: f32,
    },
}

/// Backend that composites into an in-memory canvas.
///
/// Records every draw call and can be told to fail upcoming operations,
/// which lets callers exercise their error paths without a GPU.
pub struct HeadlessBackend {
    canvas: RgbaImage,
    textures: HashMap<TextureId, RgbaImage>,
    next_id: u32,
    calls: Vec<DrawCall>,
    fail_draws: u32,
    fail_deletes: u32,
    fail_creates: u32,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width, height),
            textures: HashMap::new(),
            next_id: 1,
            calls: Vec::new(),
            fail_draws: 0,
            fail_deletes: 0,
            fail_creates: 0,
        }
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn into_canvas(self) -> RgbaImage {
        self.canvas
    }

    /// Reset the canvas to transparent and forget recorded calls.
    pub fn begin_frame(&mut self) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
        self.calls.clear();
    }

    pub fn calls(&self) -> &[DrawCall] {
        &self.calls
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn texture(&self, id: TextureId) -> Option<&RgbaImage> {
        self.textures.get(&id)
    }

    /// Fail the next `n` draw calls (fills and texture draws).
    pub fn fail_next_draws(&mut self, n: u32) {
        self.fail_draws = n;
    }

    pub fn fail_next_deletes(&mut self, n: u32) {
        self.fail_deletes = n;
    }

    pub fn fail_next_creates(&mut self, n: u32) {
        self.fail_creates = n;
    }

    fn take_failure(counter: &mut u32) -> bool {
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }

    fn pixel_span(start: f64, len: f64, limit: u32) -> (u32, u32) {
        let lo = start.floor().max(0.0);
        let hi = (start + len).floor().min(limit as f64);
        if hi <= lo {
            (0, 0)
        } else {
            (lo as u32, hi as u32)
        }
    }
}

fn blend(dst: &mut Rgba<u8>, src: [u8; 4], opacity: f32) {
    let a = (src[3] as f32 / 255.0) * opacity.clamp(0.0, 1.0);
    if a <= 0.0 {
        return;
    }
    let inv = 1.0 - a;
    for c in 0..3 {
        dst.0[c] = (src[c] as f32 * a + dst.0[c] as f32 * inv).round() as u8;
    }
    let dst_a = dst.0[3] as f32 / 255.0;
    dst.0[3] = ((a + dst_a * inv) * 255.0).round() as u8;
}

impl RenderBackend for HeadlessBackend {
    fn create_texture(&mut self, image: &RgbaImage) -> Result<TextureId, BackendError> {
        if Self::take_failure(&mut self.fail_creates) {
            return Err(BackendError::TextureCreate("injected failure".to_string()));
        }
        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.textures.insert(id, image.clone());
        Ok(id)
    }

    fn update_texture(&mut self, id: TextureId, image: &RgbaImage) -> Result<(), BackendError> {
        match self.textures.get_mut(&id) {
            Some(texture) => {
                *texture = image.clone();
                Ok(())
            }
            None => Err(BackendError::UnknownTexture(id)),
        }
    }

    fn delete_texture(&mut self, id: TextureId) -> Result<(), BackendError> {
        if Self::take_failure(&mut self.fail_deletes) {
            return Err(BackendError::TextureDelete {
                id,
                reason: "injected failure".to_string(),
            });
        }
        self.textures
            .remove(&id)
            .map(|_| ())
            .ok_or(BackendError::UnknownTexture(id))
    }

    fn fill_rect(&mut self, rect: DrawRect, color: Color) -> Result<(), BackendError> {
        if Self::take_failure(&mut self.fail_draws) {
            return Err(BackendError::Draw("injected failure".to_string()));
        }
        self.calls.push(DrawCall::Fill { rect, color });

        let (x1, x2) = Self::pixel_span(rect.x, rect.width, self.canvas.width());
        let (y1, y2) = Self::pixel_span(rect.y, rect.height, self.canvas.height());
        let [r, g, b, _] = color.to_rgba();
        for y in y1..y2 {
            for x in x1..x2 {
                blend(self.canvas.get_pixel_mut(x, y), [r, g, b, 255], color.alpha);
            }
        }
        Ok(())
    }

    fn draw_texture(
        &mut self,
        id: TextureId,
        uv: UvRect,
        dest: DrawRect,
        alpha: f32,
    ) -> Result<(), BackendError> {
        if Self::take_failure(&mut self.fail_draws) {
            return Err(BackendError::Draw("injected failure".to_string()));
        }
        let texture = self
            .textures
            .get(&id)
            .ok_or(BackendError::UnknownTexture(id))?;
        self.calls.push(DrawCall::Texture {
            id,
            uv,
            dest,
            alpha,
        });
        if dest.width <= 0.0 || dest.height <= 0.0 {
            return Ok(());
        }

        let (tw, th) = texture.dimensions();
        let (x1, x2) = Self::pixel_span(dest.x, dest.width, self.canvas.width());
        let (y1, y2) = Self::pixel_span(dest.y, dest.height, self.canvas.height());
        for y in y1..y2 {
            let fy = (y as f64 + 0.5 - dest.y) / dest.height;
            let v = uv.v1 + fy * (uv.v2 - uv.v1);
            let ty = ((v * th as f64).floor() as i64).clamp(0, th as i64 - 1) as u32;
            for x in x1..x2 {
                let fx = (x as f64 + 0.5 - dest.x) / dest.width;
                let u = uv.u1 + fx * (uv.u2 - uv.u1);
                let tx = ((u * tw as f64).floor() as i64).clamp(0, tw as i64 - 1) as u32;
                let src = texture.get_pixel(tx, ty).0;
                blend(self.canvas.get_pixel_mut(x, y), src, alpha);
            }
        }
        Ok(())
    }
}
