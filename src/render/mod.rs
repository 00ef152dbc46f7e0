pub mod backend;
pub mod broker;
pub mod canvas;
pub mod frame;
pub mod gpu;
pub mod headless;
pub mod pipeline;

/// Timing and control state for one tick, shared by every renderer.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameInfo {
    /// Visual clock in seconds, advanced by a fixed step per tick
    pub time: f32,
    /// Step applied this tick
    pub dt: f32,
    /// Milliseconds since the driver started (deposit and ripple ages)
    pub now_ms: f64,
    pub performance_mode: bool,
    /// Pointer position normalised to 0.0-1.0
    pub mouse: [f32; 2],
    pub frame: u64,
}

impl FrameInfo {
    /// Multiplier turning per-frame speeds (tuned at 60fps) into this tick's step.
    pub fn frame_scale(&self) -> f32 {
        self.dt * 60.0
    }
}
