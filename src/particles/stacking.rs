use std::collections::VecDeque;

use rand::rngs::StdRng;

use super::{EffectConfig, EffectKind, ParticlePool};
use crate::audio::features::FeatureVector;
use crate::render::canvas::{rgba, Canvas2d};
use crate::render::FrameInfo;

const MAX_DEPOSITS: usize = 400;

/// A particle that came to rest on the bottom edge.
#[derive(Clone, Copy, Debug)]
pub struct Deposit {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub rotation: f32,
    pub color: [u8; 3],
    pub created_ms: f64,
}

/// Bounded accumulation of deposits, each fading out over `duration_ms`.
#[derive(Clone, Debug)]
pub struct StackedDeposits {
    items: VecDeque<Deposit>,
    duration_ms: f64,
}

impl StackedDeposits {
    pub fn new(duration_ms: f64) -> Self {
        Self {
            items: VecDeque::new(),
            duration_ms,
        }
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Deposit> {
        self.items.iter()
    }

    pub fn deposit(&mut self, deposit: Deposit) {
        if self.items.len() >= MAX_DEPOSITS {
            self.items.pop_front();
        }
        self.items.push_back(deposit);
    }

    /// Drop deposits at least `duration_ms` old.
    pub fn prune(&mut self, now_ms: f64) {
        let duration = self.duration_ms;
        self.items.retain(|d| now_ms - d.created_ms < duration);
    }

    /// Remaining opacity of `deposit` at `now_ms`: 1 when it lands, 0 once
    /// its lifetime is spent.
    pub fn alpha(&self, deposit: &Deposit, now_ms: f64) -> f32 {
        let age = (now_ms - deposit.created_ms).max(0.0);
        (1.0 - age / self.duration_ms).clamp(0.0, 1.0) as f32
    }

    pub fn draw(&self, kind: EffectKind, now_ms: f64, canvas: &mut Canvas2d) {
        for deposit in &self.items {
            let alpha = self.alpha(deposit, now_ms);
            if alpha <= 0.0 {
                continue;
            }
            draw_shape(kind, deposit.x, deposit.y, deposit.size, deposit.rotation, deposit.color, alpha * 0.8, canvas);
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn update_falling(
    pool: &mut ParticlePool,
    config: &EffectConfig,
    rng: &mut StdRng,
    wind: f32,
    mut deposits: Option<&mut StackedDeposits>,
    features: &FeatureVector,
    frame: &FrameInfo,
    width: f32,
    height: f32,
) {
    let scale = frame.frame_scale();
    let sway_speed = 0.02 + features.mid * 0.03;
    for flake in pool.particles_mut() {
        flake.phase += sway_speed * scale;
        flake.y += flake.speed * scale;
        flake.x += (flake.phase.sin() * 0.5 + wind * 0.5) * scale;
        flake.angle += flake.spin * scale;

        if flake.y >= height - flake.size * 0.5 {
            if let Some(deposits) = deposits.as_deref_mut() {
                deposits.deposit(Deposit {
                    x: flake.x,
                    y: height - flake.size * 0.5,
                    size: flake.size,
                    rotation: flake.angle,
                    color: flake.color,
                    created_ms: frame.now_ms,
                });
            }
            flake.respawn_top(config, rng, width);
        } else if flake.x < -flake.size {
            flake.x = width + flake.size;
        } else if flake.x > width + flake.size {
            flake.x = -flake.size;
        }
    }
}

pub fn draw_falling(kind: EffectKind, pool: &ParticlePool, canvas: &mut Canvas2d) {
    for p in pool.particles() {
        draw_shape(kind, p.x, p.y, p.size, p.angle, p.color, p.opacity, canvas);
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_shape(kind: EffectKind, x: f32, y: f32, size: f32, rotation: f32, color: [u8; 3], alpha: f32, canvas: &mut Canvas2d) {
    let [r, g, b] = color;
    match kind {
        EffectKind::Leaves => canvas.fill_ellipse(x, y, size, size * 0.45, rotation, rgba(r, g, b, alpha)),
        EffectKind::CherryBlossom => {
            canvas.fill_ellipse(x, y, size * 0.6, size * 0.4, rotation, rgba(r, g, b, alpha));
        }
        _ => canvas.fill_circle(x, y, size, rgba(r, g, b, alpha)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn deposit_at(ms: f64) -> Deposit {
        Deposit {
            x: 1.0,
            y: 1.0,
            size: 2.0,
            rotation: 0.0,
            color: [255, 255, 255],
            created_ms: ms,
        }
    }

    #[test]
    fn deposits_expire_after_duration() {
        let mut stack = StackedDeposits::new(4000.0);
        stack.deposit(deposit_at(1000.0));
        stack.prune(4999.0);
        assert_eq!(stack.len(), 1);
        stack.prune(5001.0);
        assert!(stack.is_empty());
    }

    #[test]
    fn deposits_fade_with_the_clock() {
        let mut stack = StackedDeposits::new(4000.0);
        stack.deposit(deposit_at(0.0));
        let deposit = *stack.iter().next().unwrap();
        assert!((stack.alpha(&deposit, 2000.0) - 0.5).abs() < 1e-6);
        assert!(stack.alpha(&deposit, 3900.0) < 0.03);
        assert_eq!(stack.alpha(&deposit, 0.0), 1.0);
    }

    #[test]
    fn old_lone_deposit_draws_nearly_transparent() {
        let mut stack = StackedDeposits::new(4000.0);
        stack.deposit(Deposit {
            x: 10.0,
            y: 10.0,
            size: 3.0,
            ..deposit_at(0.0)
        });

        let mut fresh = Canvas2d::new(20, 20);
        fresh.clear(rgba(0, 0, 0, 1.0));
        stack.draw(EffectKind::Snow, 0.0, &mut fresh);

        stack.prune(3900.0);
        let mut old = Canvas2d::new(20, 20);
        old.clear(rgba(0, 0, 0, 1.0));
        stack.draw(EffectKind::Snow, 3900.0, &mut old);

        let fresh_red = fresh.pixel(10, 10).unwrap()[0];
        let old_red = old.pixel(10, 10).unwrap()[0];
        assert!(fresh_red > 150, "fresh deposit red {}", fresh_red);
        assert!(old_red < 20, "old deposit red {}", old_red);
    }

    #[test]
    fn collection_is_bounded() {
        let mut stack = StackedDeposits::new(10_000.0);
        for i in 0..(MAX_DEPOSITS + 50) {
            stack.deposit(deposit_at(i as f64));
        }
        assert_eq!(stack.len(), MAX_DEPOSITS);
        assert_eq!(stack.iter().next().map(|d| d.created_ms), Some(50.0));
    }

    #[test]
    fn landing_flakes_deposit_and_respawn() {
        let config = EffectKind::Snow.config();
        let mut rng = StdRng::seed_from_u64(2);
        let mut pool = ParticlePool::default();
        pool.ensure(&config, &mut rng, 100, 50);
        let mut stack = StackedDeposits::new(4000.0);
        let features = FeatureVector::default();

        for n in 0..300 {
            let frame = FrameInfo {
                dt: 1.0 / 60.0,
                now_ms: n as f64 * 16.0,
                ..FrameInfo::default()
            };
            update_falling(&mut pool, &config, &mut rng, 0.0, Some(&mut stack), &features, &frame, 100.0, 50.0);
        }
        assert!(!stack.is_empty());
        assert_eq!(pool.len(), config.count);
        assert!(pool.particles().iter().all(|p| p.y < 50.0));
    }
}
