use super::shader::render_size;
use super::{ModeRenderer, RenderContext, RenderError};
use crate::render::broker::{ContextId, GpuContextBroker};
use crate::render::pipeline::{compose_shader, ShaderUniforms};

const PATTERN_KEY: &str = "fiber:pattern";
const BLUR_KEY: &str = "fiber:blur";
const PATTERN_SOURCE: &str = include_str!("../../shaders/modes/fiber_pattern.wgsl");
const BLUR_SOURCE: &str = include_str!("../../shaders/modes/fiber_blur.wgsl");

/// Two-pass mode on its own context: the fibre pattern goes to an offscreen
/// surface sized to the canvas, then a dithered 3x3 blur pass composites it
/// with audio-reactive brightness.
pub struct FiberMode {
    context: Option<ContextId>,
}

impl Default for FiberMode {
    fn default() -> Self {
        Self::new()
    }
}

impl FiberMode {
    pub fn new() -> Self {
        Self { context: None }
    }

    pub fn holds_context(&self) -> bool {
        self.context.is_some()
    }

    fn context(&mut self, broker: &mut GpuContextBroker) -> Result<ContextId, RenderError> {
        match self.context {
            Some(context) => Ok(context),
            None => {
                let context = broker.create_dedicated_context("fiber")?;
                self.context = Some(context);
                Ok(context)
            }
        }
    }
}

impl ModeRenderer for FiberMode {
    fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<(), RenderError> {
        if ctx.canvas.is_empty() {
            return Ok(());
        }
        let (width, height) = render_size(ctx.canvas.width(), ctx.canvas.height(), ctx.frame.performance_mode);
        let context = self.context(ctx.broker)?;
        let pattern = ctx.broker.context_surface(context, 0, width, height)?;
        let output = ctx.broker.context_surface(context, 1, width, height)?;

        let Some(pattern_program) = ctx.broker.program(PATTERN_KEY, || compose_shader(PATTERN_SOURCE)) else {
            return Ok(());
        };
        let Some(blur_program) = ctx.broker.program(BLUR_KEY, || compose_shader(BLUR_SOURCE)) else {
            return Ok(());
        };
        let uniforms = ShaderUniforms::new(ctx.features, ctx.frame, width, height);

        if !ctx.token.is_live() {
            return Err(RenderError::Cancelled);
        }
        ctx.broker
            .draw_quad_to(pattern, pattern_program, &uniforms.with_pass(0), None)?;
        ctx.broker
            .draw_quad_to(output, blur_program, &uniforms.with_pass(1), Some(pattern))?;
        ctx.broker.copy_to_canvas2d(output, ctx.canvas)?;
        Ok(())
    }

    fn cleanup(&mut self, broker: &mut GpuContextBroker) {
        broker.cleanup("fiber");
        if let Some(context) = self.context.take() {
            broker.release_context(context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::FeatureVector;
    use crate::driver::Liveness;
    use crate::render::canvas::Canvas2d;
    use crate::render::headless::{GpuEvent, HeadlessBackend};
    use crate::render::FrameInfo;

    #[test]
    fn renders_two_passes_and_releases_context() {
        let backend = HeadlessBackend::new();
        let probe = backend.probe();
        let mut broker = GpuContextBroker::with_backend(backend);
        let mut canvas = Canvas2d::new(16, 16);
        let features = FeatureVector {
            bass: 0.5,
            ..FeatureVector::silent(8)
        };
        let frame = FrameInfo::default();
        let liveness = Liveness::new();
        let token = liveness.token();
        let mut mode = FiberMode::new();

        for _ in 0..2 {
            let mut ctx = RenderContext {
                features: &features,
                frame: &frame,
                canvas: &mut canvas,
                broker: &mut broker,
                token: &token,
            };
            mode.render(&mut ctx).unwrap();
        }
        assert_eq!(probe.count(|e| matches!(e, GpuEvent::Draw { .. })), 4);
        assert_eq!(probe.live_surfaces(), 2);
        assert_eq!(broker.live_context_count(), 1);
        assert_ne!(canvas.pixel(0, 0), Some([0, 0, 0, 0]));

        mode.cleanup(&mut broker);
        assert!(!mode.holds_context());
        assert_eq!(broker.live_context_count(), 0);
        assert_eq!(broker.live_program_count(), 0);
        assert_eq!(probe.live_surfaces(), 0);
    }
}
