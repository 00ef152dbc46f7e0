//! Per-frame orchestration: capture → features → one visualizer mode → the
//! optional ambience layer.
//!
//! The host calls [`FrameDriver::tick`] once per frame. Teardown goes through
//! [`Liveness`], and every renderer receives a [`RenderToken`] it must check
//! before publishing side effects, so a render that straddles an unmount is
//! discarded instead of drawing into released resources.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::beat::BeatTracker;
use crate::audio::capture::CaptureManager;
use crate::audio::features::FeatureVector;
use crate::modes::registry::ModeRegistry;
use crate::modes::{AmbienceEffect, RenderContext, RenderError, VisualizerMode};
use crate::render::broker::GpuContextBroker;
use crate::render::canvas::{rgba, Canvas2d};
use crate::render::FrameInfo;

/// Visual clock step per tick
pub const FRAME_DT: f32 = 0.016;
/// Smaller step in performance mode, which slows motion along with cost
pub const PERFORMANCE_FRAME_DT: f32 = 0.01;

#[derive(Debug, Default)]
struct LivenessState {
    generation: AtomicU64,
    dead: AtomicBool,
}

/// Owner side of the liveness flag. Killing it invalidates every token
/// handed out so far.
#[derive(Clone, Debug, Default)]
pub struct Liveness {
    state: Arc<LivenessState>,
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> RenderToken {
        RenderToken {
            state: self.state.clone(),
            generation: self.state.generation.load(Ordering::Acquire),
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.state.dead.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.state.generation.load(Ordering::Acquire)
    }

    pub fn kill(&self) {
        self.state.dead.store(true, Ordering::Release);
        self.state.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Bring the flag back for a remount. Tokens from before the kill stay
    /// dead because their generation is stale.
    pub fn revive(&self) {
        self.state.generation.fetch_add(1, Ordering::AcqRel);
        self.state.dead.store(false, Ordering::Release);
    }
}

/// Handed to each render call; checked before any draw or state mutation.
#[derive(Clone, Debug)]
pub struct RenderToken {
    state: Arc<LivenessState>,
    generation: u64,
}

impl RenderToken {
    pub fn is_live(&self) -> bool {
        !self.state.dead.load(Ordering::Acquire)
            && self.state.generation.load(Ordering::Acquire) == self.generation
    }
}

#[derive(Clone, Debug)]
pub struct DriverOptions {
    pub width: u32,
    pub height: u32,
    pub mode: VisualizerMode,
    pub effect: AmbienceEffect,
    pub performance_mode: bool,
    /// Seed for particle systems; entropy when unset
    pub seed: Option<u64>,
    pub background: [u8; 3],
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            mode: VisualizerMode::default(),
            effect: AmbienceEffect::None,
            performance_mode: false,
            seed: None,
            background: [8, 8, 14],
        }
    }
}

/// Result of one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Rendered,
    /// A renderer failed; the frame shows whatever was drawn before the failure
    Degraded,
    /// The driver was unmounted; nothing was drawn
    Stopped,
}

pub struct FrameDriver {
    capture: CaptureManager,
    broker: GpuContextBroker,
    visualizers: ModeRegistry,
    effects: ModeRegistry,
    canvas: Canvas2d,
    beat: BeatTracker,
    features: FeatureVector,
    frame: FrameInfo,
    mode: VisualizerMode,
    effect: AmbienceEffect,
    background: [u8; 3],
    liveness: Liveness,
    /// Mode whose failure has already been logged
    reported_failure: Option<VisualizerMode>,
}

impl FrameDriver {
    pub fn new(capture: CaptureManager, broker: GpuContextBroker, options: DriverOptions) -> Self {
        let mut visualizers = ModeRegistry::new(VisualizerMode::default());
        let mut effects = ModeRegistry::new(VisualizerMode::default());
        if let Some(seed) = options.seed {
            visualizers = visualizers.with_seed(seed);
            effects = effects.with_seed(seed.wrapping_add(1));
        }
        let frame = FrameInfo {
            performance_mode: options.performance_mode,
            mouse: [0.5, 0.5],
            ..FrameInfo::default()
        };
        Self {
            capture,
            broker,
            visualizers,
            effects,
            canvas: Canvas2d::new(options.width, options.height),
            beat: BeatTracker::new(),
            features: FeatureVector::default(),
            frame,
            mode: options.mode,
            effect: options.effect,
            background: options.background,
            liveness: Liveness::new(),
            reported_failure: None,
        }
    }

    pub fn capture(&self) -> &CaptureManager {
        &self.capture
    }

    pub fn capture_mut(&mut self) -> &mut CaptureManager {
        &mut self.capture
    }

    pub fn broker(&self) -> &GpuContextBroker {
        &self.broker
    }

    pub fn canvas(&self) -> &Canvas2d {
        &self.canvas
    }

    pub fn features(&self) -> &FeatureVector {
        &self.features
    }

    pub fn frame_info(&self) -> &FrameInfo {
        &self.frame
    }

    pub fn visualizers(&self) -> &ModeRegistry {
        &self.visualizers
    }

    pub fn effects(&self) -> &ModeRegistry {
        &self.effects
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    pub fn mode(&self) -> VisualizerMode {
        self.mode
    }

    pub fn effect(&self) -> AmbienceEffect {
        self.effect
    }

    /// Select the visualizer by display name or id; unknown keys fall back
    /// to the default mode. Takes effect on the next tick.
    pub fn set_mode(&mut self, key: &str) -> VisualizerMode {
        self.mode = VisualizerMode::from_key_or_default(key);
        self.mode
    }

    pub fn set_visualizer(&mut self, mode: VisualizerMode) {
        self.mode = mode;
    }

    pub fn set_effect(&mut self, effect: AmbienceEffect) {
        if effect != self.effect {
            log::debug!("ambience effect -> {:?}", effect);
        }
        self.effect = effect;
    }

    pub fn set_performance_mode(&mut self, enabled: bool) {
        self.frame.performance_mode = enabled;
    }

    /// Pointer position normalised to 0.0-1.0.
    pub fn set_mouse(&mut self, x: f32, y: f32) {
        self.frame.mouse = [x.clamp(0.0, 1.0), y.clamp(0.0, 1.0)];
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.canvas.resize(width, height) {
            log::debug!("canvas resized to {}x{}", width, height);
        }
    }

    /// Run one frame. `elapsed` is the wall-clock time since the previous
    /// tick and drives the capture clock and effect ages; the visual clock
    /// advances by a fixed step.
    pub fn tick(&mut self, elapsed: Duration) -> TickOutcome {
        let token = self.liveness.token();
        if !token.is_live() {
            return TickOutcome::Stopped;
        }

        let dt = if self.frame.performance_mode {
            PERFORMANCE_FRAME_DT
        } else {
            FRAME_DT
        };
        let elapsed_secs = elapsed.as_secs_f32();
        self.frame.dt = dt;
        self.frame.time += dt;
        self.frame.now_ms += elapsed.as_secs_f64() * 1000.0;
        self.frame.frame += 1;

        self.capture.poll();
        self.capture.advance(elapsed_secs);
        self.capture.extract(&mut self.features);
        self.beat.update(self.features.bass, elapsed_secs);
        self.features.beat_intensity = self.beat.intensity();

        let [r, g, b] = self.background;
        self.canvas.clear(rgba(r, g, b, 1.0));

        let mut ctx = RenderContext {
            features: &self.features,
            frame: &self.frame,
            canvas: &mut self.canvas,
            broker: &mut self.broker,
            token: &token,
        };

        let mut outcome = TickOutcome::Rendered;
        match self.visualizers.render(self.mode, &mut ctx) {
            Ok(()) => {
                if self.reported_failure == Some(self.mode) {
                    self.reported_failure = None;
                }
            }
            Err(RenderError::Cancelled) => return TickOutcome::Stopped,
            Err(err) => {
                if self.reported_failure != Some(self.mode) {
                    log::error!("{} failed to render: {}", self.mode.id(), err);
                    self.reported_failure = Some(self.mode);
                }
                outcome = TickOutcome::Degraded;
            }
        }

        if let Some(layer) = self.effect.mode() {
            match self.effects.render(layer, &mut ctx) {
                Ok(()) => {}
                Err(RenderError::Cancelled) => return TickOutcome::Stopped,
                Err(err) => {
                    log::warn!("{} layer failed: {}", layer.id(), err);
                    outcome = TickOutcome::Degraded;
                }
            }
        }
        outcome
    }

    /// Tear everything down: pending renders are cancelled, every mode's GPU
    /// state and the shared canvas are released, capture stops.
    pub fn unmount(&mut self) {
        self.liveness.kill();
        self.visualizers.cleanup_all(&mut self.broker);
        self.effects.cleanup_all(&mut self.broker);
        self.broker.cleanup_all();
        self.capture.stop_audio_capture();
        self.beat.reset();
        log::info!("visualizer unmounted");
    }

    /// Resume ticking after an unmount.
    pub fn remount(&mut self) {
        self.liveness.revive();
        self.reported_failure = None;
    }
}

impl Drop for FrameDriver {
    fn drop(&mut self) {
        if self.liveness.is_alive() {
            self.unmount();
        }
    }
}
