use rand::rngs::StdRng;
use rand::Rng;

use super::ParticlePool;
use crate::audio::features::FeatureVector;
use crate::render::canvas::{rgba, Canvas2d};
use crate::render::FrameInfo;

pub const DAMPING: f32 = 0.95;
pub const MAX_SPEED: f32 = 1.5;
pub const EDGE_MARGIN: f32 = 50.0;
const ACCELERATION: f32 = 0.1;
const EDGE_PUSH: f32 = 0.05;

/// Random walk with damping, a speed cap, soft inward pressure near the
/// edges, and wraparound past them.
pub fn update(
    pool: &mut ParticlePool,
    rng: &mut StdRng,
    features: &FeatureVector,
    frame: &FrameInfo,
    width: f32,
    height: f32,
) {
    let scale = frame.frame_scale();
    let max_speed = MAX_SPEED * (1.0 + features.high);
    for fly in pool.particles_mut() {
        fly.vx += rng.gen_range(-ACCELERATION..ACCELERATION);
        fly.vy += rng.gen_range(-ACCELERATION..ACCELERATION);
        fly.vx *= DAMPING;
        fly.vy *= DAMPING;

        let speed = (fly.vx * fly.vx + fly.vy * fly.vy).sqrt();
        if speed > max_speed {
            fly.vx = fly.vx / speed * max_speed;
            fly.vy = fly.vy / speed * max_speed;
        }

        if fly.x < EDGE_MARGIN {
            fly.vx += EDGE_PUSH;
        } else if fly.x > width - EDGE_MARGIN {
            fly.vx -= EDGE_PUSH;
        }
        if fly.y < EDGE_MARGIN {
            fly.vy += EDGE_PUSH;
        } else if fly.y > height - EDGE_MARGIN {
            fly.vy -= EDGE_PUSH;
        }

        fly.x += fly.vx * fly.speed * scale;
        fly.y += fly.vy * fly.speed * scale;
        fly.x = wrap(fly.x, width);
        fly.y = wrap(fly.y, height);

        fly.phase += (0.03 + features.intensity * 0.05) * scale;
    }
}

fn wrap(value: f32, limit: f32) -> f32 {
    if value < 0.0 {
        value + limit
    } else if value > limit {
        value - limit
    } else {
        value
    }
}

/// Twinkle brightness in 0.0-1.0 for a phase.
pub fn twinkle(phase: f32) -> f32 {
    0.5 + 0.5 * phase.sin()
}

pub fn draw(pool: &ParticlePool, canvas: &mut Canvas2d) {
    for fly in pool.particles() {
        let [r, g, b] = fly.color;
        let glow = twinkle(fly.phase) * fly.opacity;
        canvas.glow(fly.x, fly.y, fly.size * 4.0, rgba(r, g, b, glow * 0.5));
        canvas.fill_circle(fly.x, fly.y, fly.size, rgba(r, g, b, glow));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::EffectKind;
    use rand::SeedableRng;

    #[test]
    fn fireflies_stay_on_canvas_with_bounded_speed() {
        let config = EffectKind::Fireflies.config();
        let mut rng = StdRng::seed_from_u64(4);
        let mut pool = ParticlePool::default();
        pool.ensure(&config, &mut rng, 300, 200);
        let features = FeatureVector::default();
        let frame = FrameInfo {
            dt: 1.0 / 60.0,
            ..FrameInfo::default()
        };

        for _ in 0..1000 {
            update(&mut pool, &mut rng, &features, &frame, 300.0, 200.0);
        }
        for fly in pool.particles() {
            assert!((0.0..=300.0).contains(&fly.x));
            assert!((0.0..=200.0).contains(&fly.y));
            assert!((fly.vx * fly.vx + fly.vy * fly.vy).sqrt() <= MAX_SPEED + EDGE_PUSH * 2.0);
        }
    }

    #[test]
    fn wrap_moves_across_edges() {
        assert_eq!(wrap(-5.0, 100.0), 95.0);
        assert_eq!(wrap(105.0, 100.0), 5.0);
        assert_eq!(wrap(50.0, 100.0), 50.0);
    }

    #[test]
    fn twinkle_is_normalized() {
        for i in 0..100 {
            let v = twinkle(i as f32 * 0.37);
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
