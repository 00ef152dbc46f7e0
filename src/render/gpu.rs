use std::collections::HashMap;
use wgpu;
use wgpu::util::DeviceExt;

use super::backend::{GpuBackend, GpuError, ProgramId, SurfaceId};
use super::frame::{GpuSurface, TEXTURE_FORMAT};
use super::pipeline::{build_render_pipeline, create_bind_group_layout, ShaderUniforms, QUAD_VERTICES};

pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    pub fn new() -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async())
    }

    async fn init_async() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::METAL
                | wgpu::Backends::VULKAN
                | wgpu::Backends::DX12
                | wgpu::Backends::GL,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        log::info!("Using GPU: {}", adapter.get_info().name);
        log::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("ambience_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| GpuError::Device(e.to_string()))?;

        Ok(Self { device, queue })
    }
}

/// `GpuBackend` on a real wgpu device. Every program shares one bind group
/// layout: uniforms, an input texture and a linear sampler.
pub struct WgpuBackend {
    gpu: GpuContext,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    blank: GpuSurface,
    quad: Option<wgpu::Buffer>,
    surfaces: HashMap<SurfaceId, (String, GpuSurface)>,
    programs: HashMap<ProgramId, wgpu::RenderPipeline>,
    next_id: u64,
}

impl WgpuBackend {
    pub fn new() -> Result<Self, GpuError> {
        let gpu = GpuContext::new()?;
        let bind_group_layout = create_bind_group_layout(&gpu.device);
        let pipeline_layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mode_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let uniform_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("mode_uniforms"),
            size: std::mem::size_of::<ShaderUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("mode_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });
        let blank = GpuSurface::new(&gpu, "blank_input", 1, 1);

        Ok(Self {
            gpu,
            bind_group_layout,
            pipeline_layout,
            uniform_buffer,
            sampler,
            blank,
            quad: None,
            surfaces: HashMap::new(),
            programs: HashMap::new(),
            next_id: 1,
        })
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn create_surface(&mut self, label: &str, width: u32, height: u32) -> Result<SurfaceId, GpuError> {
        let id = SurfaceId(self.next_id());
        let surface = GpuSurface::new(&self.gpu, label, width, height);
        self.surfaces.insert(id, (label.to_string(), surface));
        Ok(id)
    }

    fn resize_surface(&mut self, surface: SurfaceId, width: u32, height: u32) -> Result<(), GpuError> {
        let (label, target) = self
            .surfaces
            .get_mut(&surface)
            .ok_or(GpuError::UnknownSurface(surface))?;
        target.resize(&self.gpu, label, width, height);
        Ok(())
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        if let Some((_, target)) = self.surfaces.remove(&surface) {
            target.destroy();
        }
    }

    fn create_quad(&mut self) -> Result<(), GpuError> {
        if self.quad.is_none() {
            let buffer = self.gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("fullscreen_quad"),
                contents: bytemuck::cast_slice(&QUAD_VERTICES),
                usage: wgpu::BufferUsages::VERTEX,
            });
            self.quad = Some(buffer);
        }
        Ok(())
    }

    fn compile_program(&mut self, label: &str, source: &str) -> Result<ProgramId, GpuError> {
        self.gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = build_render_pipeline(
            &self.gpu.device,
            &self.pipeline_layout,
            label,
            source,
            TEXTURE_FORMAT,
        );
        if let Some(err) = pollster::block_on(self.gpu.device.pop_error_scope()) {
            return Err(GpuError::Compile {
                label: label.to_string(),
                message: err.to_string(),
            });
        }

        let id = ProgramId(self.next_id());
        self.programs.insert(id, pipeline);
        Ok(id)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
    }

    fn draw_quad(
        &mut self,
        target: SurfaceId,
        program: ProgramId,
        uniforms: &ShaderUniforms,
        input: Option<SurfaceId>,
    ) -> Result<(), GpuError> {
        let quad = self.quad.as_ref().ok_or(GpuError::MissingQuad)?;
        let pipeline = self
            .programs
            .get(&program)
            .ok_or(GpuError::UnknownProgram(program))?;
        let (_, target_surface) = self
            .surfaces
            .get(&target)
            .ok_or(GpuError::UnknownSurface(target))?;
        let input_view = match input {
            Some(id) => &self.surfaces.get(&id).ok_or(GpuError::UnknownSurface(id))?.1.view,
            None => &self.blank.view,
        };

        self.gpu
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mode_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(input_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("mode_encoder"),
        });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("mode_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target_surface.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.set_vertex_buffer(0, quad.slice(..));
            render_pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn read_pixels(&mut self, surface: SurfaceId, out: &mut Vec<u8>) -> Result<(u32, u32), GpuError> {
        let (_, target) = self
            .surfaces
            .get_mut(&surface)
            .ok_or(GpuError::UnknownSurface(surface))?;
        target.read_pixels(&self.gpu, out)?;
        Ok((target.width, target.height))
    }
}
