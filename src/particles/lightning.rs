use rand::rngs::StdRng;
use rand::Rng;

use crate::render::canvas::{rgba, Canvas2d};

/// Flash sequence for one strike.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightningPhase {
    Idle,
    FirstFlash,
    Dim,
    SecondFlash,
    Fade,
}

impl LightningPhase {
    /// Seconds spent in the phase before advancing.
    fn duration(self) -> f32 {
        match self {
            LightningPhase::Idle => f32::INFINITY,
            LightningPhase::FirstFlash => 0.1,
            LightningPhase::Dim => 0.08,
            LightningPhase::SecondFlash => 0.12,
            LightningPhase::Fade => 0.5,
        }
    }

    fn next(self) -> Self {
        match self {
            LightningPhase::Idle => LightningPhase::FirstFlash,
            LightningPhase::FirstFlash => LightningPhase::Dim,
            LightningPhase::Dim => LightningPhase::SecondFlash,
            LightningPhase::SecondFlash => LightningPhase::Fade,
            LightningPhase::Fade => LightningPhase::Idle,
        }
    }
}

/// Seconds between strikes
pub const STRIKE_INTERVAL: (f32, f32) = (5.0, 25.0);
pub const BRANCH_CHANCE: f64 = 0.3;

#[derive(Clone, Debug)]
pub struct Lightning {
    phase: LightningPhase,
    phase_time: f32,
    until_strike: f32,
    flash: f32,
    bolt: Vec<(f32, f32)>,
    branches: Vec<Vec<(f32, f32)>>,
}

impl Default for Lightning {
    fn default() -> Self {
        Self::new()
    }
}

impl Lightning {
    pub fn new() -> Self {
        Self {
            phase: LightningPhase::Idle,
            phase_time: 0.0,
            until_strike: STRIKE_INTERVAL.0,
            flash: 0.0,
            bolt: Vec::new(),
            branches: Vec::new(),
        }
    }

    pub fn phase(&self) -> LightningPhase {
        self.phase
    }

    /// Full-screen flash alpha for the current phase
    pub fn flash(&self) -> f32 {
        self.flash
    }

    pub fn bolt(&self) -> &[(f32, f32)] {
        &self.bolt
    }

    pub fn branches(&self) -> &[Vec<(f32, f32)>] {
        &self.branches
    }

    /// Begin a strike immediately.
    pub fn strike(&mut self, width: f32, height: f32, rng: &mut StdRng) {
        let (bolt, branches) = generate_bolt(width, height, rng);
        self.bolt = bolt;
        self.branches = branches;
        self.phase = LightningPhase::FirstFlash;
        self.phase_time = 0.0;
        self.flash = 0.8;
    }

    pub fn update(&mut self, dt: f32, width: f32, height: f32, rng: &mut StdRng) {
        if self.phase == LightningPhase::Idle {
            self.until_strike -= dt;
            if self.until_strike <= 0.0 {
                self.until_strike = rng.gen_range(STRIKE_INTERVAL.0..STRIKE_INTERVAL.1);
                self.strike(width, height, rng);
            }
            return;
        }

        self.phase_time += dt;
        if self.phase_time >= self.phase.duration() {
            self.phase_time = 0.0;
            self.phase = self.phase.next();
            if self.phase == LightningPhase::Idle {
                self.bolt.clear();
                self.branches.clear();
            }
        }

        self.flash = match self.phase {
            LightningPhase::Idle => 0.0,
            LightningPhase::FirstFlash => 0.8,
            LightningPhase::Dim => 0.2,
            LightningPhase::SecondFlash => 0.6,
            LightningPhase::Fade => 0.6 * (1.0 - self.phase_time / LightningPhase::Fade.duration()).max(0.0),
        };
    }

    pub fn draw_flash(&self, canvas: &mut Canvas2d) {
        if self.flash > 0.0 {
            canvas.wash(rgba(220, 225, 255, self.flash * 0.5));
        }
    }

    pub fn draw_bolt(&self, canvas: &mut Canvas2d) {
        if self.flash <= 0.0 {
            return;
        }
        let alpha = self.flash.min(1.0);
        for pair in self.bolt.windows(2) {
            let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
            canvas.stroke_line(x0, y0, x1, y1, 3.0, rgba(255, 255, 255, alpha));
        }
        for branch in &self.branches {
            for pair in branch.windows(2) {
                let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
                canvas.stroke_line(x0, y0, x1, y1, 1.5, rgba(230, 230, 255, alpha * 0.7));
            }
        }
    }
}

/// Jagged path from the top edge downward: 12-20 segments whose horizontal
/// jitter shrinks toward the bottom, with a branch chance on interior points.
pub fn generate_bolt(width: f32, height: f32, rng: &mut StdRng) -> (Vec<(f32, f32)>, Vec<Vec<(f32, f32)>>) {
    let segments = rng.gen_range(12..=20);
    let step = height * rng.gen_range(0.5..0.8) / segments as f32;
    let mut x = rng.gen_range(width * 0.2..(width * 0.8).max(width * 0.2 + 1.0));
    let mut y = 0.0;
    let mut bolt = Vec::with_capacity(segments + 1);
    let mut branches = Vec::new();
    bolt.push((x, y));

    for i in 1..=segments {
        let remaining = 1.0 - i as f32 / segments as f32;
        let jitter = width * 0.06 * (0.2 + 0.8 * remaining);
        x += rng.gen_range(-jitter..=jitter);
        y += step;
        bolt.push((x, y));

        if i < segments && rng.gen_bool(BRANCH_CHANCE) {
            let len = rng.gen_range(3..=6);
            let dir = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            let (mut bx, mut by) = (x, y);
            let mut branch = vec![(bx, by)];
            for _ in 0..len {
                bx += dir * rng.gen_range(0.0..=jitter.max(1.0));
                by += step * 0.6;
                branch.push((bx, by));
            }
            branches.push(branch);
        }
    }
    (bolt, branches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn bolt_shape_is_bounded() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let (bolt, branches) = generate_bolt(800.0, 600.0, &mut rng);
            assert!((13..=21).contains(&bolt.len()));
            assert!(bolt.windows(2).all(|p| p[1].1 > p[0].1));
            assert!(branches.iter().all(|b| (4..=7).contains(&b.len())));
        }
    }

    #[test]
    fn strike_walks_all_phases_back_to_idle() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut lightning = Lightning::new();
        lightning.strike(400.0, 300.0, &mut rng);

        let mut seen = vec![lightning.phase()];
        for _ in 0..100 {
            lightning.update(0.01, 400.0, 300.0, &mut rng);
            if seen.last() != Some(&lightning.phase()) {
                seen.push(lightning.phase());
            }
            if lightning.phase() == LightningPhase::Idle {
                break;
            }
        }
        assert_eq!(
            seen,
            vec![
                LightningPhase::FirstFlash,
                LightningPhase::Dim,
                LightningPhase::SecondFlash,
                LightningPhase::Fade,
                LightningPhase::Idle,
            ]
        );
        assert_eq!(lightning.flash(), 0.0);
        assert!(lightning.bolt().is_empty());
    }

    #[test]
    fn strikes_happen_within_interval() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut lightning = Lightning::new();
        let mut struck = false;
        for _ in 0..(STRIKE_INTERVAL.1 / 0.05) as usize + 2 {
            lightning.update(0.05, 400.0, 300.0, &mut rng);
            if lightning.phase() != LightningPhase::Idle {
                struck = true;
                break;
            }
        }
        assert!(struck);
    }
}
