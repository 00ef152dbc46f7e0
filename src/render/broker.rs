use std::collections::HashMap;

use super::backend::{GpuBackend, GpuError, ProgramId, SurfaceId};
use super::canvas::Canvas2d;
use super::pipeline::ShaderUniforms;

/// Browsers hard-fail somewhere past this many live graphics contexts.
pub const MAX_LIVE_CONTEXTS: usize = 16;

pub type BackendFactory = Box<dyn FnMut() -> Result<Box<dyn GpuBackend>, GpuError>>;

/// Handle to a context owned by a single multi-pass mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Surfaces created from scratch (shared and dedicated)
    pub surface_creations: usize,
    /// In-place surface resizes
    pub surface_resizes: usize,
    pub program_compiles: usize,
    pub compile_failures: usize,
}

enum ProgramSlot {
    Ready(ProgramId),
    /// Compilation failed; stays empty until `reset_program`.
    Failed,
}

struct SharedCanvas {
    surface: SurfaceId,
    width: u32,
    height: u32,
}

struct DedicatedContext {
    label: String,
    surfaces: Vec<(SurfaceId, u32, u32)>,
}

enum BackendState {
    Pending(BackendFactory),
    Ready(Box<dyn GpuBackend>),
    Unavailable(String),
}

/// Owns the one shared graphics context every single-pass GPU mode draws
/// through, plus the per-mode program cache and any dedicated contexts.
pub struct GpuContextBroker {
    backend: BackendState,
    shared: Option<SharedCanvas>,
    quad_ready: bool,
    programs: HashMap<String, ProgramSlot>,
    dedicated: HashMap<ContextId, DedicatedContext>,
    next_context: u64,
    pixels: Vec<u8>,
    stats: BrokerStats,
}

impl GpuContextBroker {
    /// The backend is created on first use, not here.
    pub fn new(factory: BackendFactory) -> Self {
        Self {
            backend: BackendState::Pending(factory),
            shared: None,
            quad_ready: false,
            programs: HashMap::new(),
            dedicated: HashMap::new(),
            next_context: 1,
            pixels: Vec::new(),
            stats: BrokerStats::default(),
        }
    }

    pub fn with_backend(backend: impl GpuBackend + 'static) -> Self {
        let mut backend = Some(Box::new(backend) as Box<dyn GpuBackend>);
        Self::new(Box::new(move || backend.take().ok_or(GpuError::NoAdapter)))
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.backend, BackendState::Ready(_))
    }

    pub fn backend_name(&self) -> Option<&str> {
        match &self.backend {
            BackendState::Ready(backend) => Some(backend.name()),
            _ => None,
        }
    }

    pub fn stats(&self) -> BrokerStats {
        self.stats
    }

    /// Shared context (if created) plus every unreleased dedicated one.
    pub fn live_context_count(&self) -> usize {
        usize::from(self.shared.is_some()) + self.dedicated.len()
    }

    pub fn live_program_count(&self) -> usize {
        self.programs
            .values()
            .filter(|slot| matches!(slot, ProgramSlot::Ready(_)))
            .count()
    }

    pub fn has_program(&self, key: &str) -> bool {
        matches!(self.programs.get(key), Some(ProgramSlot::Ready(_)))
    }

    fn backend(&mut self) -> Result<&mut dyn GpuBackend, GpuError> {
        if let BackendState::Pending(factory) = &mut self.backend {
            self.backend = match factory() {
                Ok(backend) => {
                    log::info!("GPU backend initialised: {}", backend.name());
                    BackendState::Ready(backend)
                }
                Err(err) => {
                    log::error!("GPU backend unavailable: {}", err);
                    BackendState::Unavailable(err.to_string())
                }
            };
        }
        match &mut self.backend {
            BackendState::Ready(backend) => Ok(backend.as_mut()),
            BackendState::Unavailable(reason) => Err(GpuError::Device(reason.clone())),
            BackendState::Pending(_) => Err(GpuError::NoAdapter),
        }
    }

    fn check_context_limit(&self) -> Result<(), GpuError> {
        if self.live_context_count() >= MAX_LIVE_CONTEXTS {
            return Err(GpuError::ContextLimit(MAX_LIVE_CONTEXTS));
        }
        Ok(())
    }

    /// Make the shared canvas exactly `width` x `height`, creating it on
    /// first use. Same-size calls do nothing. Returns false when the canvas
    /// cannot be used this frame.
    pub fn ensure_shared_canvas_size(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        match self.try_ensure_shared_canvas(width, height) {
            Ok(()) => true,
            Err(err) => {
                log::debug!("shared canvas unavailable: {}", err);
                false
            }
        }
    }

    fn try_ensure_shared_canvas(&mut self, width: u32, height: u32) -> Result<(), GpuError> {
        if let Some(shared) = &self.shared {
            if shared.width == width && shared.height == height {
                return Ok(());
            }
            let surface = shared.surface;
            self.backend()?.resize_surface(surface, width, height)?;
            self.stats.surface_resizes += 1;
            log::debug!("shared canvas resized to {}x{}", width, height);
        } else {
            self.check_context_limit()?;
            let surface = self.backend()?.create_surface("shared_canvas", width, height)?;
            self.stats.surface_creations += 1;
            log::debug!("shared canvas created at {}x{}", width, height);
            self.shared = Some(SharedCanvas { surface, width, height });
        }
        if let Some(shared) = &mut self.shared {
            shared.width = width;
            shared.height = height;
        }
        Ok(())
    }

    pub fn shared_canvas(&self) -> Option<SurfaceId> {
        self.shared.as_ref().map(|shared| shared.surface)
    }

    pub fn shared_canvas_size(&self) -> Option<(u32, u32)> {
        self.shared.as_ref().map(|shared| (shared.width, shared.height))
    }

    pub fn ensure_shared_quad(&mut self) -> Result<(), GpuError> {
        if !self.quad_ready {
            self.backend()?.create_quad()?;
            self.quad_ready = true;
        }
        Ok(())
    }

    /// Cached program for `key`, compiling `source` on first request. A failed
    /// compile is logged once and yields `None` until `reset_program`.
    pub fn program(&mut self, key: &str, source: impl FnOnce() -> String) -> Option<ProgramId> {
        match self.programs.get(key) {
            Some(ProgramSlot::Ready(program)) => return Some(*program),
            Some(ProgramSlot::Failed) => return None,
            None => {}
        }

        let compiled = self
            .backend()
            .and_then(|backend| backend.compile_program(key, &source()));
        match compiled {
            Ok(program) => {
                self.stats.program_compiles += 1;
                log::debug!("compiled program {}", key);
                self.programs.insert(key.to_string(), ProgramSlot::Ready(program));
                Some(program)
            }
            Err(err) => {
                self.stats.compile_failures += 1;
                log::error!("program {} failed: {}", key, err);
                self.programs.insert(key.to_string(), ProgramSlot::Failed);
                None
            }
        }
    }

    /// Forget a program (compiled or failed) so the next request recompiles.
    pub fn reset_program(&mut self, key: &str) {
        if let Some(ProgramSlot::Ready(program)) = self.programs.remove(key) {
            if let Ok(backend) = self.backend() {
                backend.destroy_program(program);
            }
        }
    }

    pub fn draw_shared_quad(&mut self, program: ProgramId, uniforms: &ShaderUniforms) -> Result<(), GpuError> {
        let surface = self.shared_canvas().ok_or(GpuError::MissingQuad)?;
        self.draw_quad_to(surface, program, uniforms, None)
    }

    pub fn draw_quad_to(
        &mut self,
        target: SurfaceId,
        program: ProgramId,
        uniforms: &ShaderUniforms,
        input: Option<SurfaceId>,
    ) -> Result<(), GpuError> {
        self.ensure_shared_quad()?;
        self.backend()?.draw_quad(target, program, uniforms, input)
    }

    /// Blit a GPU surface onto the visible 2D canvas, scaling to fit.
    pub fn copy_to_canvas2d(&mut self, surface: SurfaceId, target: &mut Canvas2d) -> Result<(), GpuError> {
        if target.is_empty() {
            return Ok(());
        }
        let mut pixels = std::mem::take(&mut self.pixels);
        let result = self.backend().and_then(|backend| backend.read_pixels(surface, &mut pixels));
        if let Ok((width, height)) = result {
            target.blit_rgba(&pixels, width, height);
        }
        self.pixels = pixels;
        result.map(|_| ())
    }

    pub fn copy_shared_to_canvas2d(&mut self, target: &mut Canvas2d) -> Result<(), GpuError> {
        let surface = self.shared_canvas().ok_or(GpuError::MissingQuad)?;
        self.copy_to_canvas2d(surface, target)
    }

    pub fn create_dedicated_context(&mut self, label: &str) -> Result<ContextId, GpuError> {
        self.check_context_limit()?;
        self.backend()?;
        let id = ContextId(self.next_context);
        self.next_context += 1;
        self.dedicated.insert(
            id,
            DedicatedContext {
                label: label.to_string(),
                surfaces: Vec::new(),
            },
        );
        log::debug!("dedicated context {} created ({} live)", label, self.live_context_count());
        Ok(id)
    }

    /// Surface `slot` of a dedicated context, created or resized to match.
    pub fn context_surface(
        &mut self,
        context: ContextId,
        slot: usize,
        width: u32,
        height: u32,
    ) -> Result<SurfaceId, GpuError> {
        let (existing, label) = {
            let ctx = self
                .dedicated
                .get(&context)
                .ok_or(GpuError::Device("context released".to_string()))?;
            (ctx.surfaces.get(slot).copied(), format!("{}_{}", ctx.label, slot))
        };

        match existing {
            Some((surface, w, h)) if w == width && h == height => Ok(surface),
            Some((surface, _, _)) => {
                self.backend()?.resize_surface(surface, width, height)?;
                self.stats.surface_resizes += 1;
                if let Some(ctx) = self.dedicated.get_mut(&context) {
                    ctx.surfaces[slot] = (surface, width, height);
                }
                Ok(surface)
            }
            None => {
                let surface = self.backend()?.create_surface(&label, width, height)?;
                self.stats.surface_creations += 1;
                if let Some(ctx) = self.dedicated.get_mut(&context) {
                    ctx.surfaces.push((surface, width, height));
                }
                Ok(surface)
            }
        }
    }

    pub fn release_context(&mut self, context: ContextId) {
        let Some(ctx) = self.dedicated.remove(&context) else {
            return;
        };
        if let Ok(backend) = self.backend() {
            for (surface, _, _) in ctx.surfaces {
                backend.destroy_surface(surface);
            }
        }
        log::debug!("dedicated context {} released", ctx.label);
    }

    /// Release every program belonging to `mode` (its key and `mode:*` passes).
    pub fn cleanup(&mut self, mode: &str) {
        let prefix = format!("{}:", mode);
        let keys: Vec<String> = self
            .programs
            .keys()
            .filter(|key| key.as_str() == mode || key.starts_with(&prefix))
            .cloned()
            .collect();
        if keys.is_empty() {
            return;
        }
        for key in &keys {
            self.reset_program(key);
        }
        log::debug!("released {} program(s) for {}", keys.len(), mode);
    }

    /// Full teardown: programs, dedicated contexts, the shared canvas.
    pub fn cleanup_all(&mut self) {
        let keys: Vec<String> = self.programs.keys().cloned().collect();
        for key in &keys {
            self.reset_program(key);
        }
        let contexts: Vec<ContextId> = self.dedicated.keys().copied().collect();
        for context in contexts {
            self.release_context(context);
        }
        if let Some(shared) = self.shared.take() {
            if let Ok(backend) = self.backend() {
                backend.destroy_surface(shared.surface);
            }
        }
        self.pixels = Vec::new();
        log::info!("GPU resources released");
    }
}
