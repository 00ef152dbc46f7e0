use rand::rngs::StdRng;
use rand::Rng;

use super::{EffectConfig, ParticlePool};
use crate::audio::features::FeatureVector;
use crate::render::canvas::{rgba, Canvas2d};

/// Probability that a drop landing on the ground leaves a ripple
pub const RIPPLE_CHANCE: f64 = 0.15;
const MAX_RIPPLES: usize = 120;

/// Global horizontal drift that eases toward a target re-chosen every
/// 3-8 seconds.
#[derive(Clone, Debug)]
pub struct Wind {
    strength: f32,
    target: f32,
    until_change: f32,
}

impl Default for Wind {
    fn default() -> Self {
        Self::new()
    }
}

impl Wind {
    pub fn new() -> Self {
        Self {
            strength: 0.0,
            target: 0.0,
            until_change: 0.0,
        }
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn update(&mut self, dt: f32, rng: &mut StdRng) {
        self.until_change -= dt;
        if self.until_change <= 0.0 {
            self.target = rng.gen_range(-2.0..2.0);
            self.until_change = rng.gen_range(3.0..8.0);
        }
        // ~2% of the remaining gap per 60fps frame
        let ease = 1.0 - 0.98f32.powf(dt * 60.0);
        self.strength += (self.target - self.strength) * ease;
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Ripple {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub opacity: f32,
}

/// Expanding rings left by landing drops; removed once fully faded.
#[derive(Default)]
pub struct Ripples {
    items: Vec<Ripple>,
}

impl Ripples {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn spawn(&mut self, x: f32, y: f32) {
        if self.items.len() >= MAX_RIPPLES {
            self.items.remove(0);
        }
        self.items.push(Ripple {
            x,
            y,
            radius: 1.0,
            opacity: 0.5,
        });
    }

    pub fn update(&mut self, dt: f32) {
        for ripple in &mut self.items {
            ripple.radius += 30.0 * dt;
            ripple.opacity -= 0.8 * dt;
        }
        self.items.retain(|r| r.opacity > 0.0);
    }

    pub fn draw(&self, canvas: &mut Canvas2d) {
        for ripple in &self.items {
            canvas.fill_ellipse(
                ripple.x,
                ripple.y,
                ripple.radius,
                ripple.radius * 0.3,
                0.0,
                rgba(174, 194, 224, ripple.opacity * 0.4),
            );
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn update_drops(
    pool: &mut ParticlePool,
    config: &EffectConfig,
    rng: &mut StdRng,
    wind: f32,
    mut ripples: Option<&mut Ripples>,
    features: &FeatureVector,
    scale: f32,
    width: f32,
    height: f32,
) {
    let boost = 1.0 + features.bass * 0.5;
    for drop in pool.particles_mut() {
        drop.y += drop.speed * boost * scale;
        drop.x += wind * scale;

        if drop.y > height {
            if let Some(ripples) = ripples.as_deref_mut() {
                if rng.gen_bool(RIPPLE_CHANCE) {
                    ripples.spawn(drop.x, height - rng.gen_range(0.0..20.0));
                }
            }
            drop.respawn_top(config, rng, width);
        } else if drop.x < -20.0 {
            drop.x = width + 10.0;
        } else if drop.x > width + 20.0 {
            drop.x = -10.0;
        }
    }
}

pub fn draw_drops(pool: &ParticlePool, wind: f32, canvas: &mut Canvas2d) {
    for drop in pool.particles() {
        let [r, g, b] = drop.color;
        canvas.stroke_line(
            drop.x,
            drop.y,
            drop.x + wind * drop.size * 0.1,
            drop.y + drop.size,
            1.0,
            rgba(r, g, b, drop.opacity),
        );
    }
}
