//! CPU particle systems drawn into the 2D canvas.
//!
//! Each effect owns a fixed pool allocated once per canvas size. Particles
//! that leave the canvas are respawned in place, so the pool never grows.
//! Secondary state (wind, ripples, lightning, stacked deposits) lives in the
//! system that uses it.

pub mod clouds;
pub mod fireflies;
pub mod lightning;
pub mod rain;
pub mod stacking;

use rand::rngs::StdRng;
use rand::Rng;

use crate::audio::features::FeatureVector;
use crate::modes::{ModeRenderer, RenderContext, RenderError};
use crate::render::broker::GpuContextBroker;
use crate::render::canvas::Canvas2d;
use crate::render::FrameInfo;

use clouds::CloudLayer;
use lightning::Lightning;
use rain::{Ripples, Wind};
use stacking::StackedDeposits;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Rain,
    HeavyRain,
    Snow,
    Leaves,
    CherryBlossom,
    Fireflies,
    CloudShadows,
}

/// Per-effect tuning. Speeds are pixels per frame at 60fps.
#[derive(Clone, Copy, Debug)]
pub struct EffectConfig {
    pub count: usize,
    pub speed: (f32, f32),
    pub size: (f32, f32),
    pub opacity: (f32, f32),
    pub palette: &'static [[u8; 3]],
    pub wind: bool,
    pub ripples: bool,
    pub lightning: bool,
    /// Deposit lifetime in milliseconds, when particles stack at the bottom
    pub stack_duration_ms: Option<f64>,
    /// Rotation speed range in radians per frame
    pub spin: (f32, f32),
}

const RAIN_COLORS: &[[u8; 3]] = &[[174, 194, 224]];
const SNOW_COLORS: &[[u8; 3]] = &[[255, 255, 255], [230, 240, 255]];
const LEAF_COLORS: &[[u8; 3]] = &[[204, 85, 0], [230, 140, 30], [160, 60, 20], [200, 160, 40]];
const BLOSSOM_COLORS: &[[u8; 3]] = &[[255, 183, 197], [255, 209, 220], [250, 160, 185]];
const FIREFLY_COLORS: &[[u8; 3]] = &[[255, 240, 130], [210, 255, 120]];
const SHADOW_COLORS: &[[u8; 3]] = &[[0, 0, 0]];

impl EffectKind {
    pub fn config(self) -> EffectConfig {
        let base = EffectConfig {
            count: 100,
            speed: (1.0, 2.0),
            size: (2.0, 4.0),
            opacity: (0.4, 0.9),
            palette: SNOW_COLORS,
            wind: false,
            ripples: false,
            lightning: false,
            stack_duration_ms: None,
            spin: (0.0, 0.0),
        };
        match self {
            EffectKind::Rain => EffectConfig {
                count: 300,
                speed: (8.0, 14.0),
                size: (10.0, 20.0),
                opacity: (0.2, 0.5),
                palette: RAIN_COLORS,
                wind: true,
                ripples: true,
                ..base
            },
            EffectKind::HeavyRain => EffectConfig {
                count: 600,
                speed: (14.0, 22.0),
                size: (15.0, 30.0),
                opacity: (0.25, 0.6),
                palette: RAIN_COLORS,
                wind: true,
                ripples: true,
                lightning: true,
                ..base
            },
            EffectKind::Snow => EffectConfig {
                count: 200,
                speed: (0.5, 2.0),
                size: (1.5, 4.0),
                opacity: (0.5, 1.0),
                stack_duration_ms: Some(4000.0),
                ..base
            },
            EffectKind::Leaves => EffectConfig {
                count: 40,
                speed: (1.0, 2.5),
                size: (6.0, 12.0),
                opacity: (0.7, 1.0),
                palette: LEAF_COLORS,
                wind: true,
                stack_duration_ms: Some(5000.0),
                spin: (-0.05, 0.05),
                ..base
            },
            EffectKind::CherryBlossom => EffectConfig {
                count: 70,
                speed: (0.8, 1.8),
                size: (4.0, 8.0),
                opacity: (0.6, 1.0),
                palette: BLOSSOM_COLORS,
                wind: true,
                stack_duration_ms: Some(3000.0),
                spin: (-0.04, 0.04),
                ..base
            },
            EffectKind::Fireflies => EffectConfig {
                count: 50,
                speed: (0.5, 1.5),
                size: (1.5, 3.5),
                opacity: (0.6, 1.0),
                palette: FIREFLY_COLORS,
                ..base
            },
            EffectKind::CloudShadows => EffectConfig {
                count: 6,
                speed: (0.2, 0.5),
                size: (150.0, 300.0),
                opacity: (0.15, 0.3),
                palette: SHADOW_COLORS,
                ..base
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub speed: f32,
    pub size: f32,
    pub angle: f32,
    pub spin: f32,
    pub opacity: f32,
    /// Twinkle or sway phase
    pub phase: f32,
    pub color: [u8; 3],
}

fn range(rng: &mut StdRng, (lo, hi): (f32, f32)) -> f32 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

impl Particle {
    /// Fresh particle anywhere on the canvas.
    pub fn spawn(config: &EffectConfig, rng: &mut StdRng, width: f32, height: f32) -> Self {
        let color = config.palette[rng.gen_range(0..config.palette.len())];
        Self {
            x: rng.gen_range(0.0..width.max(1.0)),
            y: rng.gen_range(0.0..height.max(1.0)),
            vx: 0.0,
            vy: 0.0,
            speed: range(rng, config.speed),
            size: range(rng, config.size),
            angle: rng.gen_range(0.0..std::f32::consts::TAU),
            spin: range(rng, config.spin),
            opacity: range(rng, config.opacity),
            phase: rng.gen_range(0.0..std::f32::consts::TAU),
            color,
        }
    }

    /// Recycle in place at the top edge with re-randomised properties.
    pub fn respawn_top(&mut self, config: &EffectConfig, rng: &mut StdRng, width: f32) {
        *self = Self::spawn(config, rng, width, 1.0);
        self.y = -self.size;
    }
}

/// Fixed-size particle storage, reallocated only when the canvas size
/// changes.
#[derive(Default)]
pub struct ParticlePool {
    particles: Vec<Particle>,
    size: (u32, u32),
    allocations: usize,
}

impl ParticlePool {
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Times the pool has been (re)built.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    /// Build the pool for this canvas size if it is not already. Returns
    /// true when a reallocation happened.
    pub fn ensure(&mut self, config: &EffectConfig, rng: &mut StdRng, width: u32, height: u32) -> bool {
        if self.size == (width, height) && self.particles.len() == config.count {
            return false;
        }
        self.particles = (0..config.count)
            .map(|_| Particle::spawn(config, rng, width as f32, height as f32))
            .collect();
        self.size = (width, height);
        self.allocations += 1;
        true
    }
}

/// One ambience effect: particle pool plus whatever secondary state the
/// effect type needs.
pub struct ParticleSystem {
    kind: EffectKind,
    config: EffectConfig,
    pool: ParticlePool,
    rng: StdRng,
    wind: Option<Wind>,
    ripples: Option<Ripples>,
    lightning: Option<Lightning>,
    deposits: Option<StackedDeposits>,
    clouds: Option<CloudLayer>,
    now_ms: f64,
}

impl ParticleSystem {
    pub fn new(kind: EffectKind, rng: StdRng) -> Self {
        let config = kind.config();
        Self {
            kind,
            wind: config.wind.then(Wind::new),
            ripples: config.ripples.then(Ripples::default),
            lightning: config.lightning.then(Lightning::new),
            deposits: config.stack_duration_ms.map(StackedDeposits::new),
            clouds: (kind == EffectKind::CloudShadows).then(CloudLayer::default),
            config,
            pool: ParticlePool::default(),
            rng,
            now_ms: 0.0,
        }
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    pub fn pool(&self) -> &ParticlePool {
        &self.pool
    }

    pub fn deposits(&self) -> Option<&StackedDeposits> {
        self.deposits.as_ref()
    }

    pub fn lightning(&self) -> Option<&Lightning> {
        self.lightning.as_ref()
    }

    pub fn wind(&self) -> Option<&Wind> {
        self.wind.as_ref()
    }

    /// Advance the simulation one frame. Zero-sized canvases do nothing.
    pub fn update(&mut self, features: &FeatureVector, frame: &FrameInfo, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.pool.ensure(&self.config, &mut self.rng, width, height);
        let (w, h) = (width as f32, height as f32);
        let scale = frame.frame_scale();
        self.now_ms = frame.now_ms;

        if let Some(wind) = &mut self.wind {
            wind.update(frame.dt, &mut self.rng);
        }
        if let Some(lightning) = &mut self.lightning {
            lightning.update(frame.dt, w, h, &mut self.rng);
        }
        if let Some(ripples) = &mut self.ripples {
            ripples.update(frame.dt);
        }
        if let Some(deposits) = &mut self.deposits {
            deposits.prune(frame.now_ms);
        }

        match self.kind {
            EffectKind::Rain | EffectKind::HeavyRain => rain::update_drops(
                &mut self.pool,
                &self.config,
                &mut self.rng,
                self.wind.as_ref().map_or(0.0, Wind::strength),
                self.ripples.as_mut(),
                features,
                scale,
                w,
                h,
            ),
            EffectKind::Snow | EffectKind::Leaves | EffectKind::CherryBlossom => stacking::update_falling(
                &mut self.pool,
                &self.config,
                &mut self.rng,
                self.wind.as_ref().map_or(0.0, Wind::strength),
                self.deposits.as_mut(),
                features,
                frame,
                w,
                h,
            ),
            EffectKind::Fireflies => fireflies::update(&mut self.pool, &mut self.rng, features, frame, w, h),
            EffectKind::CloudShadows => clouds::update(&mut self.pool, features, scale, w),
        }
    }

    pub fn draw(&mut self, canvas: &mut Canvas2d) {
        if canvas.is_empty() {
            return;
        }
        match self.kind {
            EffectKind::Rain | EffectKind::HeavyRain => {
                let wind = self.wind.as_ref().map_or(0.0, Wind::strength);
                if let Some(lightning) = &self.lightning {
                    lightning.draw_flash(canvas);
                }
                rain::draw_drops(&self.pool, wind, canvas);
                if let Some(ripples) = &self.ripples {
                    ripples.draw(canvas);
                }
                if let Some(lightning) = &self.lightning {
                    lightning.draw_bolt(canvas);
                }
            }
            EffectKind::Snow | EffectKind::Leaves | EffectKind::CherryBlossom => {
                if let Some(deposits) = &self.deposits {
                    deposits.draw(self.kind, self.now_ms, canvas);
                }
                stacking::draw_falling(self.kind, &self.pool, canvas);
            }
            EffectKind::Fireflies => fireflies::draw(&self.pool, canvas),
            EffectKind::CloudShadows => {
                if let Some(layer) = &mut self.clouds {
                    layer.draw(&self.pool, canvas);
                }
            }
        }
    }
}

impl ModeRenderer for ParticleSystem {
    fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<(), RenderError> {
        let (width, height) = (ctx.canvas.width(), ctx.canvas.height());
        self.update(ctx.features, ctx.frame, width, height);
        if !ctx.token.is_live() {
            return Err(RenderError::Cancelled);
        }
        self.draw(ctx.canvas);
        Ok(())
    }

    /// Particle effects hold no GPU state; the pool is kept for the next
    /// activation.
    fn cleanup(&mut self, _broker: &mut GpuContextBroker) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn frame(n: u64) -> FrameInfo {
        FrameInfo {
            time: n as f32 * 0.016,
            dt: 0.016,
            now_ms: n as f64 * 16.0,
            frame: n,
            ..FrameInfo::default()
        }
    }

    #[test]
    fn pool_is_sized_from_config_and_reused() {
        let mut system = ParticleSystem::new(EffectKind::Snow, StdRng::seed_from_u64(3));
        let features = FeatureVector::silent(4);
        for n in 0..50 {
            system.update(&features, &frame(n), 320, 240);
        }
        assert_eq!(system.pool().len(), EffectKind::Snow.config().count);
        assert_eq!(system.pool().allocations(), 1);

        system.update(&features, &frame(51), 640, 480);
        assert_eq!(system.pool().allocations(), 2);
    }

    #[test]
    fn zero_canvas_is_a_no_op() {
        let mut system = ParticleSystem::new(EffectKind::Rain, StdRng::seed_from_u64(3));
        system.update(&FeatureVector::default(), &frame(1), 0, 0);
        assert!(system.pool().is_empty());
        let mut canvas = Canvas2d::new(0, 0);
        system.draw(&mut canvas);
    }

    #[test]
    fn every_effect_draws_something() {
        let features = FeatureVector {
            spectrum: vec![0.5; 2],
            bass: 0.5,
            mid: 0.5,
            high: 0.5,
            ..FeatureVector::default()
        };
        for kind in [
            EffectKind::Rain,
            EffectKind::HeavyRain,
            EffectKind::Snow,
            EffectKind::Leaves,
            EffectKind::CherryBlossom,
            EffectKind::Fireflies,
            EffectKind::CloudShadows,
        ] {
            let mut system = ParticleSystem::new(kind, StdRng::seed_from_u64(11));
            let mut canvas = Canvas2d::new(200, 150);
            for n in 0..5 {
                system.update(&features, &frame(n), 200, 150);
            }
            system.draw(&mut canvas);
            assert!(canvas.pixels().chunks(4).any(|px| px[3] > 0), "{:?}", kind);
        }
    }
}
