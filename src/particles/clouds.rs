use super::ParticlePool;
use crate::audio::features::FeatureVector;
use crate::render::canvas::{rgba, Canvas2d};

/// Shadows are drawn at reduced resolution and blurred before compositing.
const LAYER_DOWNSCALE: u32 = 4;
const BLUR_SIGMA: f32 = 6.0;

pub fn update(pool: &mut ParticlePool, features: &FeatureVector, scale: f32, width: f32) {
    let boost = 1.0 + features.mid * 0.5;
    for cloud in pool.particles_mut() {
        cloud.x += cloud.speed * boost * scale;
        if cloud.x - cloud.size > width {
            cloud.x = -cloud.size;
        }
    }
}

/// Offscreen layer reused between frames, reallocated only on resize.
#[derive(Default)]
pub struct CloudLayer {
    layer: Option<Canvas2d>,
}

impl CloudLayer {
    pub fn draw(&mut self, pool: &ParticlePool, canvas: &mut Canvas2d) {
        let (w, h) = (
            (canvas.width() / LAYER_DOWNSCALE).max(1),
            (canvas.height() / LAYER_DOWNSCALE).max(1),
        );
        let layer = self.layer.get_or_insert_with(|| Canvas2d::new(w, h));
        layer.resize(w, h);
        layer.clear(rgba(0, 0, 0, 0.0));

        let inv = 1.0 / LAYER_DOWNSCALE as f32;
        for cloud in pool.particles() {
            let [r, g, b] = cloud.color;
            layer.fill_ellipse(
                cloud.x * inv,
                cloud.y * inv,
                cloud.size * inv,
                cloud.size * 0.5 * inv,
                0.0,
                rgba(r, g, b, cloud.opacity),
            );
        }
        layer.blur(BLUR_SIGMA);
        canvas.draw_layer(layer, 1.0);
    }
}
