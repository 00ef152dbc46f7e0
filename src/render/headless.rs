use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::backend::{GpuBackend, GpuError, ProgramId, SurfaceId};
use super::pipeline::ShaderUniforms;

/// One recorded backend call.
#[derive(Clone, Debug, PartialEq)]
pub enum GpuEvent {
    CreateSurface { surface: SurfaceId, label: String, width: u32, height: u32 },
    ResizeSurface { surface: SurfaceId, width: u32, height: u32 },
    DestroySurface(SurfaceId),
    CreateQuad,
    Compile { label: String, ok: bool },
    DestroyProgram { program: ProgramId, label: String },
    Draw { target: SurfaceId, program: ProgramId, label: String },
    ReadPixels(SurfaceId),
}

#[derive(Default)]
struct HeadlessState {
    events: Vec<GpuEvent>,
    surfaces: HashMap<SurfaceId, HeadlessSurface>,
    programs: HashMap<ProgramId, String>,
    quad: bool,
    next_id: u64,
}

struct HeadlessSurface {
    width: u32,
    height: u32,
    color: [u8; 4],
}

/// Backend without a device. Draws fill the target with a flat colour
/// tinted by the band energies; sources without an `fs_main` entry point
/// fail to compile.
#[derive(Default)]
pub struct HeadlessBackend {
    state: Rc<RefCell<HeadlessState>>,
}

/// Read-only view into a `HeadlessBackend` that outlives the boxed backend.
#[derive(Clone)]
pub struct HeadlessProbe {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            state: Rc::clone(&self.state),
        }
    }
}

impl HeadlessProbe {
    pub fn events(&self) -> Vec<GpuEvent> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    pub fn live_surfaces(&self) -> usize {
        self.state.borrow().surfaces.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    pub fn count(&self, pred: impl Fn(&GpuEvent) -> bool) -> usize {
        self.state.borrow().events.iter().filter(|e| pred(e)).count()
    }
}

impl HeadlessState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl GpuBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_surface(&mut self, label: &str, width: u32, height: u32) -> Result<SurfaceId, GpuError> {
        let mut state = self.state.borrow_mut();
        let surface = SurfaceId(state.next_id());
        state.surfaces.insert(
            surface,
            HeadlessSurface {
                width,
                height,
                color: [0, 0, 0, 255],
            },
        );
        state.events.push(GpuEvent::CreateSurface {
            surface,
            label: label.to_string(),
            width,
            height,
        });
        Ok(surface)
    }

    fn resize_surface(&mut self, surface: SurfaceId, width: u32, height: u32) -> Result<(), GpuError> {
        let mut state = self.state.borrow_mut();
        let target = state
            .surfaces
            .get_mut(&surface)
            .ok_or(GpuError::UnknownSurface(surface))?;
        target.width = width;
        target.height = height;
        state.events.push(GpuEvent::ResizeSurface { surface, width, height });
        Ok(())
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        let mut state = self.state.borrow_mut();
        if state.surfaces.remove(&surface).is_some() {
            state.events.push(GpuEvent::DestroySurface(surface));
        }
    }

    fn create_quad(&mut self) -> Result<(), GpuError> {
        let mut state = self.state.borrow_mut();
        if !state.quad {
            state.quad = true;
            state.events.push(GpuEvent::CreateQuad);
        }
        Ok(())
    }

    fn compile_program(&mut self, label: &str, source: &str) -> Result<ProgramId, GpuError> {
        let mut state = self.state.borrow_mut();
        let ok = source.contains("fn fs_main") && source.contains("fn vs_main");
        state.events.push(GpuEvent::Compile {
            label: label.to_string(),
            ok,
        });
        if !ok {
            return Err(GpuError::Compile {
                label: label.to_string(),
                message: "missing entry point".to_string(),
            });
        }
        let program = ProgramId(state.next_id());
        state.programs.insert(program, label.to_string());
        Ok(program)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        let mut state = self.state.borrow_mut();
        if let Some(label) = state.programs.remove(&program) {
            state.events.push(GpuEvent::DestroyProgram { program, label });
        }
    }

    fn draw_quad(
        &mut self,
        target: SurfaceId,
        program: ProgramId,
        uniforms: &ShaderUniforms,
        input: Option<SurfaceId>,
    ) -> Result<(), GpuError> {
        let mut state = self.state.borrow_mut();
        if !state.quad {
            return Err(GpuError::MissingQuad);
        }
        let label = state
            .programs
            .get(&program)
            .cloned()
            .ok_or(GpuError::UnknownProgram(program))?;
        let base = match input {
            Some(id) => {
                state
                    .surfaces
                    .get(&id)
                    .ok_or(GpuError::UnknownSurface(id))?
                    .color
            }
            None => [24, 24, 32, 255],
        };
        let channel = |base: u8, energy: f32| base.saturating_add((energy.clamp(0.0, 1.0) * 200.0) as u8);
        let color = [
            channel(base[0], uniforms.bass),
            channel(base[1], uniforms.mid),
            channel(base[2], uniforms.high),
            255,
        ];
        state
            .surfaces
            .get_mut(&target)
            .ok_or(GpuError::UnknownSurface(target))?
            .color = color;
        state.events.push(GpuEvent::Draw { target, program, label });
        Ok(())
    }

    fn read_pixels(&mut self, surface: SurfaceId, out: &mut Vec<u8>) -> Result<(u32, u32), GpuError> {
        let mut state = self.state.borrow_mut();
        let target = state
            .surfaces
            .get(&surface)
            .ok_or(GpuError::UnknownSurface(surface))?;
        let (width, height, color) = (target.width, target.height, target.color);
        out.clear();
        for _ in 0..(width as usize * height as usize) {
            out.extend_from_slice(&color);
        }
        state.events.push(GpuEvent::ReadPixels(surface));
        Ok((width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::pipeline::compose_shader;

    #[test]
    fn draw_tints_target_by_bands() {
        let mut backend = HeadlessBackend::new();
        let surface = backend.create_surface("shared", 2, 2).unwrap();
        backend.create_quad().unwrap();
        let program = backend
            .compile_program("test", &compose_shader("@fragment fn fs_main() {}"))
            .unwrap();
        let uniforms = ShaderUniforms {
            bass: 1.0,
            ..ShaderUniforms::default()
        };
        backend.draw_quad(surface, program, &uniforms, None).unwrap();

        let mut pixels = Vec::new();
        assert_eq!(backend.read_pixels(surface, &mut pixels).unwrap(), (2, 2));
        assert_eq!(pixels.len(), 16);
        assert_eq!(&pixels[..4], &[224, 24, 32, 255]);
    }

    #[test]
    fn source_without_fragment_entry_fails() {
        let mut backend = HeadlessBackend::new();
        let probe = backend.probe();
        let err = backend.compile_program("broken", "fn nothing() {}").unwrap_err();
        assert!(matches!(err, GpuError::Compile { .. }));
        assert_eq!(probe.live_programs(), 0);
    }

    #[test]
    fn draw_without_quad_is_rejected() {
        let mut backend = HeadlessBackend::new();
        let surface = backend.create_surface("shared", 1, 1).unwrap();
        let program = backend
            .compile_program("test", &compose_shader("@fragment fn fs_main() {}"))
            .unwrap();
        let err = backend
            .draw_quad(surface, program, &ShaderUniforms::default(), None)
            .unwrap_err();
        assert!(matches!(err, GpuError::MissingQuad));
    }
}
