use image::{imageops, Pixel, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_line_segment_mut,
    draw_polygon_mut, Blend,
};
use imageproc::point::Point;
use imageproc::rect::Rect;

pub type Color = Rgba<u8>;

/// Colour with a fractional alpha.
pub fn rgba(r: u8, g: u8, b: u8, alpha: f32) -> Color {
    Rgba([r, g, b, (alpha.clamp(0.0, 1.0) * 255.0).round() as u8])
}

/// The visible RGBA surface. Every drawing call alpha-blends over what is
/// already there; zero-sized canvases accept every call as a no-op.
pub struct Canvas2d {
    image: RgbaImage,
}

impl Canvas2d {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Reallocate only when the dimensions actually change.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.width() == width && self.height() == height {
            return false;
        }
        self.image = RgbaImage::new(width, height);
        true
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x < self.width() && y < self.height() {
            Some(self.image.get_pixel(x, y).0)
        } else {
            None
        }
    }

    /// Overwrite every pixel.
    pub fn clear(&mut self, color: Color) {
        for px in self.image.pixels_mut() {
            *px = color;
        }
    }

    /// Blend `color` over the whole canvas (screen flashes, trails).
    pub fn wash(&mut self, color: Color) {
        if self.is_empty() || color.0[3] == 0 {
            return;
        }
        for px in self.image.pixels_mut() {
            px.blend(&color);
        }
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        let x0 = x.round() as i32;
        let y0 = y.round() as i32;
        let w = w.round() as i32;
        let h = h.round() as i32;
        if self.is_empty() || w <= 0 || h <= 0 {
            return;
        }
        let rect = Rect::at(x0, y0).of_size(w as u32, h as u32);
        self.with_blend(|canvas| draw_filled_rect_mut(canvas, rect, color));
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Color) {
        if self.is_empty() || !cx.is_finite() || !cy.is_finite() {
            return;
        }
        if radius < 0.75 {
            self.blend_pixel(cx.round() as i32, cy.round() as i32, color);
            return;
        }
        let center = (cx.round() as i32, cy.round() as i32);
        let r = radius.round() as i32;
        self.with_blend(|canvas| draw_filled_circle_mut(canvas, center, r, color));
    }

    /// A filled circle with a halo of decreasing opacity.
    pub fn glow(&mut self, cx: f32, cy: f32, radius: f32, color: Color) {
        let base = color.0[3] as f32 / 255.0;
        for (scale, alpha) in [(3.0, 0.12), (2.0, 0.25)] {
            let halo = rgba(color.0[0], color.0[1], color.0[2], base * alpha);
            self.fill_circle(cx, cy, radius * scale, halo);
        }
        self.fill_circle(cx, cy, radius, color);
    }

    pub fn stroke_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Color) {
        if self.is_empty() || radius < 1.0 || !cx.is_finite() || !cy.is_finite() {
            return;
        }
        let center = (cx.round() as i32, cy.round() as i32);
        let r = radius.round() as i32;
        self.with_blend(|canvas| draw_hollow_circle_mut(canvas, center, r, color));
    }

    /// Line with an integer pixel width, drawn as parallel one-pixel segments.
    pub fn stroke_line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, width: f32, color: Color) {
        if self.is_empty() || ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
            return;
        }
        let dx = x1 - x0;
        let dy = y1 - y0;
        let len = (dx * dx + dy * dy).sqrt().max(f32::EPSILON);
        let (nx, ny) = (-dy / len, dx / len);
        let strands = width.round().max(1.0) as i32;
        let half = (strands - 1) as f32 / 2.0;

        self.with_blend(|canvas| {
            for i in 0..strands {
                let offset = i as f32 - half;
                let (ox, oy) = (nx * offset, ny * offset);
                draw_line_segment_mut(canvas, (x0 + ox, y0 + oy), (x1 + ox, y1 + oy), color);
            }
        });
    }

    /// Filled ellipse rotated by `angle` radians.
    pub fn fill_ellipse(&mut self, cx: f32, cy: f32, rx: f32, ry: f32, angle: f32, color: Color) {
        if self.is_empty() || !cx.is_finite() || !cy.is_finite() {
            return;
        }
        let (sin, cos) = angle.sin_cos();
        let mut points: Vec<Point<i32>> = Vec::with_capacity(16);
        for i in 0..16 {
            let t = i as f32 / 16.0 * std::f32::consts::TAU;
            let (ex, ey) = (rx * t.cos(), ry * t.sin());
            let p = Point::new(
                (cx + ex * cos - ey * sin).round() as i32,
                (cy + ex * sin + ey * cos).round() as i32,
            );
            if points.last() != Some(&p) {
                points.push(p);
            }
        }
        while points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        if points.len() < 3 {
            self.fill_circle(cx, cy, rx.max(ry), color);
            return;
        }
        self.with_blend(|canvas| draw_polygon_mut(canvas, &points, color));
    }

    /// Replace the canvas contents with an RGBA buffer, scaling with nearest
    /// sampling when the source size differs.
    pub fn blit_rgba(&mut self, src: &[u8], src_width: u32, src_height: u32) {
        if self.is_empty() || src_width == 0 || src_height == 0 {
            return;
        }
        if src.len() < (src_width * src_height * 4) as usize {
            return;
        }
        let (w, h) = (self.width(), self.height());
        for (x, y, px) in self.image.enumerate_pixels_mut() {
            let sx = (x as u64 * src_width as u64 / w as u64) as u32;
            let sy = (y as u64 * src_height as u64 / h as u64) as u32;
            let idx = ((sy * src_width + sx) * 4) as usize;
            px.0.copy_from_slice(&src[idx..idx + 4]);
        }
    }

    /// Blend another canvas on top, stretched to fit, scaled by `opacity`.
    pub fn draw_layer(&mut self, layer: &Canvas2d, opacity: f32) {
        if self.is_empty() || layer.is_empty() || opacity <= 0.0 {
            return;
        }
        let (w, h) = (self.width(), self.height());
        let (lw, lh) = (layer.width(), layer.height());
        for (x, y, px) in self.image.enumerate_pixels_mut() {
            let sx = (x as u64 * lw as u64 / w as u64) as u32;
            let sy = (y as u64 * lh as u64 / h as u64) as u32;
            let mut src = *layer.image.get_pixel(sx, sy);
            src.0[3] = (src.0[3] as f32 * opacity.min(1.0)).round() as u8;
            if src.0[3] > 0 {
                px.blend(&src);
            }
        }
    }

    /// Gaussian blur in place.
    pub fn blur(&mut self, sigma: f32) {
        if self.is_empty() || sigma <= 0.0 {
            return;
        }
        self.image = imageops::blur(&self.image, sigma);
    }

    fn blend_pixel(&mut self, x: i32, y: i32, color: Color) {
        if x < 0 || y < 0 || x >= self.width() as i32 || y >= self.height() as i32 {
            return;
        }
        self.image.get_pixel_mut(x as u32, y as u32).blend(&color);
    }

    fn with_blend(&mut self, draw: impl FnOnce(&mut Blend<RgbaImage>)) {
        let mut canvas = Blend(std::mem::take(&mut self.image));
        draw(&mut canvas);
        self.image = canvas.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_canvas_ignores_drawing() {
        let mut canvas = Canvas2d::new(0, 0);
        canvas.fill_rect(0.0, 0.0, 10.0, 10.0, rgba(255, 0, 0, 1.0));
        canvas.fill_circle(5.0, 5.0, 3.0, rgba(255, 0, 0, 1.0));
        canvas.stroke_line(0.0, 0.0, 5.0, 5.0, 2.0, rgba(255, 0, 0, 1.0));
        canvas.fill_ellipse(2.0, 2.0, 4.0, 2.0, 0.5, rgba(255, 0, 0, 1.0));
        canvas.blur(4.0);
        assert!(canvas.pixels().is_empty());
    }

    #[test]
    fn fill_rect_blends_over_background() {
        let mut canvas = Canvas2d::new(4, 4);
        canvas.clear(rgba(0, 0, 0, 1.0));
        canvas.fill_rect(0.0, 0.0, 2.0, 2.0, rgba(255, 255, 255, 0.5));
        let px = canvas.pixel(0, 0).unwrap();
        assert!(px[0] > 100 && px[0] < 160);
        assert_eq!(canvas.pixel(3, 3).unwrap(), [0, 0, 0, 255]);
    }

    #[test]
    fn blit_scales_source() {
        let mut canvas = Canvas2d::new(4, 4);
        let src = [10u8, 20, 30, 255, 40, 50, 60, 255];
        canvas.blit_rgba(&src, 2, 1);
        assert_eq!(canvas.pixel(0, 3).unwrap(), [10, 20, 30, 255]);
        assert_eq!(canvas.pixel(3, 0).unwrap(), [40, 50, 60, 255]);
    }

    #[test]
    fn resize_only_reallocates_on_change() {
        let mut canvas = Canvas2d::new(8, 8);
        assert!(!canvas.resize(8, 8));
        assert!(canvas.resize(16, 8));
        assert_eq!(canvas.width(), 16);
    }

    #[test]
    fn degenerate_ellipse_does_not_panic() {
        let mut canvas = Canvas2d::new(8, 8);
        canvas.fill_ellipse(4.0, 4.0, 0.1, 0.1, 1.0, rgba(255, 255, 255, 1.0));
        canvas.fill_ellipse(4.0, 4.0, 3.0, 0.2, 0.3, rgba(255, 255, 255, 1.0));
    }
}
