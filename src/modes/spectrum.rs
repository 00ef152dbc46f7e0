//! Procedural 2D spectrum visualizers drawn straight into the canvas.

use std::f32::consts::{PI, TAU};

use super::{ModeRenderer, RenderContext, RenderError};
use crate::audio::features::FeatureVector;
use crate::render::broker::GpuContextBroker;
use crate::render::canvas::{rgba, Canvas2d, Color};
use crate::render::FrameInfo;

const BAR_COUNT: usize = 64;
const LED_COLUMNS: usize = 24;
const LED_ROWS: usize = 16;
/// Fraction of full height a held peak falls per 60fps frame
const PEAK_FALL: f32 = 0.008;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpectrumStyle {
    Bars,
    MirrorBars,
    Circular,
    Line,
    Dots,
    RadialBurst,
    PulseRings,
    Mountains,
    LedMeter,
    Orbit,
}

/// Hue sweep from blue through magenta to orange.
fn spectrum_color(t: f32, alpha: f32) -> Color {
    let t = t.clamp(0.0, 1.0);
    let r = (80.0 + 175.0 * t) as u8;
    let g = (120.0 + 80.0 * (t * PI).sin()) as u8;
    let b = (255.0 - 180.0 * t) as u8;
    rgba(r, g, b, alpha)
}

pub struct SpectrumMode {
    style: SpectrumStyle,
    /// Held peak per LED column
    peaks: Vec<f32>,
    rotation: f32,
}

impl SpectrumMode {
    pub fn new(style: SpectrumStyle) -> Self {
        Self {
            style,
            peaks: Vec::new(),
            rotation: 0.0,
        }
    }

    pub fn style(&self) -> SpectrumStyle {
        self.style
    }

    pub fn peaks(&self) -> &[f32] {
        &self.peaks
    }

    pub fn draw(&mut self, features: &FeatureVector, frame: &FrameInfo, canvas: &mut Canvas2d) {
        if canvas.is_empty() {
            return;
        }
        let (w, h) = (canvas.width() as f32, canvas.height() as f32);
        self.rotation = (self.rotation + 0.01 * (1.0 + features.intensity) * frame.frame_scale()) % TAU;

        match self.style {
            SpectrumStyle::Bars => bars(features, canvas, w, h),
            SpectrumStyle::MirrorBars => mirror_bars(features, canvas, w, h),
            SpectrumStyle::Circular => circular(features, canvas, w, h, self.rotation),
            SpectrumStyle::Line => line(features, canvas, w, h),
            SpectrumStyle::Dots => dots(features, canvas, w, h),
            SpectrumStyle::RadialBurst => radial_burst(features, canvas, w, h, self.rotation),
            SpectrumStyle::PulseRings => pulse_rings(features, frame, canvas, w, h),
            SpectrumStyle::Mountains => mountains(features, canvas, w, h),
            SpectrumStyle::LedMeter => self.led_meter(features, frame, canvas, w, h),
            SpectrumStyle::Orbit => orbit(features, frame, canvas, w, h),
        }
    }

    fn led_meter(&mut self, features: &FeatureVector, frame: &FrameInfo, canvas: &mut Canvas2d, w: f32, h: f32) {
        if self.peaks.len() != LED_COLUMNS {
            self.peaks = vec![0.0; LED_COLUMNS];
        }
        let col_w = w / LED_COLUMNS as f32;
        let row_h = h / LED_ROWS as f32;
        let fall = PEAK_FALL * frame.frame_scale();

        for (i, peak) in self.peaks.iter_mut().enumerate() {
            let value = features.sample(i as f32 / (LED_COLUMNS - 1) as f32);
            *peak = if value >= *peak { value } else { (*peak - fall).max(0.0) };

            let lit = (value * LED_ROWS as f32).round() as usize;
            let x = i as f32 * col_w;
            for row in 0..LED_ROWS {
                let y = h - (row + 1) as f32 * row_h;
                let level = row as f32 / (LED_ROWS - 1) as f32;
                let color = match level {
                    l if l > 0.85 => [255, 60, 60],
                    l if l > 0.6 => [255, 210, 60],
                    _ => [60, 230, 110],
                };
                let alpha = if row < lit { 0.95 } else { 0.12 };
                canvas.fill_rect(x + 1.0, y + 1.0, col_w - 2.0, row_h - 2.0, rgba(color[0], color[1], color[2], alpha));
            }

            let peak_row = ((*peak * LED_ROWS as f32).round() as usize).min(LED_ROWS);
            if peak_row > 0 {
                let y = h - peak_row as f32 * row_h;
                canvas.fill_rect(x + 1.0, y + 1.0, col_w - 2.0, 2.0, rgba(255, 255, 255, 0.9));
            }
        }
    }
}

fn bars(features: &FeatureVector, canvas: &mut Canvas2d, w: f32, h: f32) {
    let bar_w = w / BAR_COUNT as f32;
    for i in 0..BAR_COUNT {
        let t = i as f32 / (BAR_COUNT - 1) as f32;
        let value = features.sample(t);
        let bar_h = value * h * 0.9;
        canvas.fill_rect(i as f32 * bar_w + 1.0, h - bar_h, (bar_w - 2.0).max(1.0), bar_h, spectrum_color(t, 0.9));
    }
}

fn mirror_bars(features: &FeatureVector, canvas: &mut Canvas2d, w: f32, h: f32) {
    let bar_w = w / BAR_COUNT as f32;
    let mid = h / 2.0;
    for i in 0..BAR_COUNT {
        let t = i as f32 / (BAR_COUNT - 1) as f32;
        let half = features.sample(t) * mid * 0.9;
        let x = i as f32 * bar_w + 1.0;
        let width = (bar_w - 2.0).max(1.0);
        canvas.fill_rect(x, mid - half, width, half, spectrum_color(t, 0.9));
        canvas.fill_rect(x, mid, width, half, spectrum_color(t, 0.5));
    }
}

fn circular(features: &FeatureVector, canvas: &mut Canvas2d, w: f32, h: f32, rotation: f32) {
    let (cx, cy) = (w / 2.0, h / 2.0);
    let radius = w.min(h) * 0.2 * (1.0 + features.bass * 0.3);
    let reach = w.min(h) * 0.25;
    for i in 0..BAR_COUNT {
        let t = i as f32 / BAR_COUNT as f32;
        let angle = t * TAU + rotation;
        let len = features.sample(t) * reach;
        let (sin, cos) = angle.sin_cos();
        canvas.stroke_line(
            cx + cos * radius,
            cy + sin * radius,
            cx + cos * (radius + len),
            cy + sin * (radius + len),
            2.0,
            spectrum_color(t, 0.9),
        );
    }
    canvas.stroke_circle(cx, cy, radius, rgba(255, 255, 255, 0.4));
}

fn line(features: &FeatureVector, canvas: &mut Canvas2d, w: f32, h: f32) {
    let points = BAR_COUNT * 2;
    let mut prev: Option<(f32, f32)> = None;
    for i in 0..points {
        let t = i as f32 / (points - 1) as f32;
        let point = (t * w, h * 0.8 - features.sample(t) * h * 0.6);
        if let Some((x0, y0)) = prev {
            canvas.stroke_line(x0, y0, point.0, point.1, 2.0, spectrum_color(t, 0.95));
        }
        prev = Some(point);
    }
}

fn dots(features: &FeatureVector, canvas: &mut Canvas2d, w: f32, h: f32) {
    let step = w / BAR_COUNT as f32;
    for i in 0..BAR_COUNT {
        let t = i as f32 / (BAR_COUNT - 1) as f32;
        let value = features.sample(t);
        let y = h * 0.9 - value * h * 0.8;
        canvas.fill_circle(i as f32 * step + step / 2.0, y, 2.0 + value * step * 0.5, spectrum_color(t, 0.85));
    }
}

fn radial_burst(features: &FeatureVector, canvas: &mut Canvas2d, w: f32, h: f32, rotation: f32) {
    let (cx, cy) = (w / 2.0, h / 2.0);
    let reach = w.hypot(h) * 0.5;
    let rays = BAR_COUNT / 2;
    for i in 0..rays {
        let t = i as f32 / rays as f32;
        let len = reach * (0.1 + features.sample(t) * 0.9);
        let (sin, cos) = (t * TAU - rotation).sin_cos();
        canvas.stroke_line(cx, cy, cx + cos * len, cy + sin * len, 1.5, spectrum_color(t, 0.6));
    }
    canvas.glow(cx, cy, 20.0 + features.bass * 60.0, rgba(255, 220, 180, 0.6));
}

fn pulse_rings(features: &FeatureVector, frame: &FrameInfo, canvas: &mut Canvas2d, w: f32, h: f32) {
    let (cx, cy) = (w / 2.0, h / 2.0);
    let max_r = w.min(h) * 0.45;
    let rings = 6;
    for i in 0..rings {
        let t = i as f32 / rings as f32;
        let travel = (t + frame.time * 0.25).fract();
        let radius = max_r * travel * (1.0 + features.beat_intensity * 0.2);
        let alpha = (1.0 - travel) * (0.3 + features.sample(t) * 0.7);
        canvas.stroke_circle(cx, cy, radius, spectrum_color(t, alpha));
    }
    canvas.fill_circle(cx, cy, 4.0 + features.bass * 20.0, rgba(255, 255, 255, 0.8));
}

fn mountains(features: &FeatureVector, canvas: &mut Canvas2d, w: f32, h: f32) {
    let layers = [(0.3f32, 0.35f32), (0.6, 0.55), (1.0, 0.9)];
    let columns = w.max(1.0) as usize;
    for (depth, alpha) in layers {
        for x in 0..columns {
            let t = x as f32 / columns as f32;
            // farther ridges read a lower, smoother slice of the spectrum
            let value = features.sample(t * depth);
            let ridge = h * (0.15 + 0.45 * value * depth);
            let shade = (60.0 + 120.0 * depth) as u8;
            canvas.fill_rect(x as f32, h - ridge, 1.0, ridge, rgba(shade / 2, shade / 3, shade, alpha));
        }
    }
}

fn orbit(features: &FeatureVector, frame: &FrameInfo, canvas: &mut Canvas2d, w: f32, h: f32) {
    let (cx, cy) = (w / 2.0, h / 2.0);
    let base = w.min(h) * 0.1;
    let bodies = 12;
    canvas.glow(cx, cy, base * (1.0 + features.bass), rgba(255, 200, 120, 0.7));
    for i in 0..bodies {
        let t = i as f32 / bodies as f32;
        let value = features.sample(t);
        let radius = base + t * w.min(h) * 0.35;
        let angle = frame.time * (0.3 + (1.0 - t) * 0.9) + t * TAU;
        let (sin, cos) = angle.sin_cos();
        canvas.stroke_circle(cx, cy, radius, rgba(255, 255, 255, 0.06));
        canvas.fill_circle(cx + cos * radius, cy + sin * radius, 2.0 + value * 8.0, spectrum_color(t, 0.9));
    }
}

impl ModeRenderer for SpectrumMode {
    fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<(), RenderError> {
        if !ctx.token.is_live() {
            return Err(RenderError::Cancelled);
        }
        self.draw(ctx.features, ctx.frame, ctx.canvas);
        Ok(())
    }

    fn cleanup(&mut self, _broker: &mut GpuContextBroker) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES: [SpectrumStyle; 10] = [
        SpectrumStyle::Bars,
        SpectrumStyle::MirrorBars,
        SpectrumStyle::Circular,
        SpectrumStyle::Line,
        SpectrumStyle::Dots,
        SpectrumStyle::RadialBurst,
        SpectrumStyle::PulseRings,
        SpectrumStyle::Mountains,
        SpectrumStyle::LedMeter,
        SpectrumStyle::Orbit,
    ];

    fn loud() -> FeatureVector {
        FeatureVector {
            spectrum: (0..32).map(|i| i as f32 / 31.0).collect(),
            bass: 0.8,
            mid: 0.5,
            high: 0.3,
            intensity: 0.5,
            beat_intensity: 1.0,
        }
    }

    fn frame() -> FrameInfo {
        FrameInfo {
            time: 1.3,
            dt: 0.016,
            ..FrameInfo::default()
        }
    }

    #[test]
    fn every_style_draws_with_signal() {
        for style in STYLES {
            let mut mode = SpectrumMode::new(style);
            let mut canvas = Canvas2d::new(160, 120);
            mode.draw(&loud(), &frame(), &mut canvas);
            assert!(canvas.pixels().chunks(4).any(|px| px[3] > 0), "{:?}", style);
        }
    }

    #[test]
    fn empty_spectrum_and_empty_canvas_are_safe() {
        for style in STYLES {
            let mut mode = SpectrumMode::new(style);
            let mut canvas = Canvas2d::new(64, 48);
            mode.draw(&FeatureVector::default(), &frame(), &mut canvas);
            let mut empty = Canvas2d::new(0, 0);
            mode.draw(&loud(), &frame(), &mut empty);
        }
    }

    #[test]
    fn led_peaks_hold_then_fall() {
        let mut mode = SpectrumMode::new(SpectrumStyle::LedMeter);
        let mut canvas = Canvas2d::new(96, 64);
        mode.draw(&loud(), &frame(), &mut canvas);
        let held = mode.peaks()[LED_COLUMNS - 1];
        assert!((held - 1.0).abs() < 1e-6);

        let quiet = FeatureVector::silent(32);
        mode.draw(&quiet, &frame(), &mut canvas);
        let after = mode.peaks()[LED_COLUMNS - 1];
        assert!(after < held && after > 0.9);
    }
}
