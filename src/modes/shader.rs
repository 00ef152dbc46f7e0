use super::{ModeRenderer, RenderContext, RenderError, VisualizerMode};
use crate::render::broker::GpuContextBroker;
use crate::render::pipeline::{compose_shader, ShaderUniforms};

/// Fragment source for a single-pass GPU mode.
pub fn shader_source(mode: VisualizerMode) -> Option<&'static str> {
    use VisualizerMode::*;
    Some(match mode {
        Accretion => include_str!("../../shaders/modes/accretion.wgsl"),
        BlackHole => include_str!("../../shaders/modes/black_hole.wgsl"),
        Cube => include_str!("../../shaders/modes/cube.wgsl"),
        FractalPyramid => include_str!("../../shaders/modes/fractal_pyramid.wgsl"),
        HoloDice => include_str!("../../shaders/modes/holo_dice.wgsl"),
        Plasma => include_str!("../../shaders/modes/plasma.wgsl"),
        Tunnel => include_str!("../../shaders/modes/tunnel.wgsl"),
        Kaleidoscope => include_str!("../../shaders/modes/kaleidoscope.wgsl"),
        Aurora => include_str!("../../shaders/modes/aurora.wgsl"),
        Nebula => include_str!("../../shaders/modes/nebula.wgsl"),
        Warp => include_str!("../../shaders/modes/warp.wgsl"),
        Ocean => include_str!("../../shaders/modes/ocean.wgsl"),
        LavaLamp => include_str!("../../shaders/modes/lava_lamp.wgsl"),
        Voronoi => include_str!("../../shaders/modes/voronoi.wgsl"),
        Ripples => include_str!("../../shaders/modes/ripples.wgsl"),
        Corona => include_str!("../../shaders/modes/corona.wgsl"),
        Synthwave => include_str!("../../shaders/modes/synthwave.wgsl"),
        HexPulse => include_str!("../../shaders/modes/hex_pulse.wgsl"),
        Galaxy => include_str!("../../shaders/modes/galaxy.wgsl"),
        Electric => include_str!("../../shaders/modes/electric.wgsl"),
        Rings => include_str!("../../shaders/modes/rings.wgsl"),
        Flower => include_str!("../../shaders/modes/flower.wgsl"),
        WaveformGlow => include_str!("../../shaders/modes/waveform_glow.wgsl"),
        _ => return None,
    })
}

/// Surface size for a canvas; performance mode renders at half resolution
/// and lets the blit upscale.
pub fn render_size(width: u32, height: u32, performance_mode: bool) -> (u32, u32) {
    if performance_mode {
        ((width / 2).max(1), (height / 2).max(1))
    } else {
        (width, height)
    }
}

/// A fragment source wrapped into a standard render function: compile once,
/// set the shared uniforms, draw the shared quad, copy to the 2D canvas.
pub struct ShaderMode {
    id: &'static str,
    source: &'static str,
}

impl ShaderMode {
    pub fn new(id: &'static str, source: &'static str) -> Self {
        Self { id, source }
    }
}

impl ModeRenderer for ShaderMode {
    fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<(), RenderError> {
        if ctx.canvas.is_empty() {
            return Ok(());
        }
        let (width, height) = render_size(ctx.canvas.width(), ctx.canvas.height(), ctx.frame.performance_mode);
        if !ctx.broker.ensure_shared_canvas_size(width, height) {
            return Ok(());
        }
        let source = self.source;
        let Some(program) = ctx.broker.program(self.id, || compose_shader(source)) else {
            return Ok(());
        };
        let uniforms = ShaderUniforms::new(ctx.features, ctx.frame, width, height);

        if !ctx.token.is_live() {
            return Err(RenderError::Cancelled);
        }
        ctx.broker.draw_shared_quad(program, &uniforms)?;
        ctx.broker.copy_shared_to_canvas2d(ctx.canvas)?;
        Ok(())
    }

    fn cleanup(&mut self, broker: &mut GpuContextBroker) {
        broker.cleanup(self.id);
    }
}
