use super::pipeline::ShaderUniforms;

/// Offscreen colour target (the GPU side of a "canvas").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

/// A compiled fullscreen-quad program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u64);

#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no suitable GPU adapter")]
    NoAdapter,
    #[error("failed to create GPU device: {0}")]
    Device(String),
    #[error("shader compilation failed for {label}: {message}")]
    Compile { label: String, message: String },
    #[error("live context limit of {0} reached")]
    ContextLimit(usize),
    #[error("unknown surface {0:?}")]
    UnknownSurface(SurfaceId),
    #[error("unknown program {0:?}")]
    UnknownProgram(ProgramId),
    #[error("fullscreen quad has not been created")]
    MissingQuad,
    #[error("surface readback failed: {0}")]
    Readback(String),
}

/// Low-level graphics operations the context broker is built on.
pub trait GpuBackend {
    fn name(&self) -> &str;

    fn create_surface(&mut self, label: &str, width: u32, height: u32) -> Result<SurfaceId, GpuError>;

    /// Change a surface's dimensions, keeping its identity.
    fn resize_surface(&mut self, surface: SurfaceId, width: u32, height: u32) -> Result<(), GpuError>;

    fn destroy_surface(&mut self, surface: SurfaceId);

    /// Upload the shared fullscreen quad geometry.
    fn create_quad(&mut self) -> Result<(), GpuError>;

    /// Compile a complete WGSL module exposing `vs_main` and `fs_main`.
    fn compile_program(&mut self, label: &str, source: &str) -> Result<ProgramId, GpuError>;

    fn destroy_program(&mut self, program: ProgramId);

    /// Draw the fullscreen quad into `target`, optionally sampling `input`.
    fn draw_quad(
        &mut self,
        target: SurfaceId,
        program: ProgramId,
        uniforms: &ShaderUniforms,
        input: Option<SurfaceId>,
    ) -> Result<(), GpuError>;

    /// Read a surface back as tightly packed RGBA rows.
    fn read_pixels(&mut self, surface: SurfaceId, out: &mut Vec<u8>) -> Result<(u32, u32), GpuError>;
}
