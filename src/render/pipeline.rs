use bytemuck::{Pod, Zeroable};
use wgpu;

use super::FrameInfo;
use crate::audio::features::FeatureVector;

/// Number of spectrum values exposed to shaders (packed as vec4s)
pub const SHADER_SPECTRUM_BINS: usize = 64;

/// Uniform block, binding, and fullscreen-quad vertex stage shared by every
/// shader-based mode. Mode sources only supply `fs_main` and helpers.
pub const SHADER_HEADER: &str = include_str!("../../shaders/common.wgsl");

pub const QUAD_VERTICES: [[f32; 2]; 6] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [1.0, 1.0],
    [-1.0, -1.0],
    [1.0, 1.0],
    [-1.0, 1.0],
];

pub const QUAD_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &[wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x2,
        offset: 0,
        shader_location: 0,
    }],
};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ShaderUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    pub intensity: f32,
    pub beat_intensity: f32,
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
    pub mouse: [f32; 2],
    pub performance: f32,
    pub pass_index: f32,
    pub spectrum: [[f32; 4]; SHADER_SPECTRUM_BINS / 4],
}

impl Default for ShaderUniforms {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl ShaderUniforms {
    pub fn new(features: &FeatureVector, frame: &FrameInfo, width: u32, height: u32) -> Self {
        let mut spectrum = [[0.0f32; 4]; SHADER_SPECTRUM_BINS / 4];
        for i in 0..SHADER_SPECTRUM_BINS {
            let t = i as f32 / (SHADER_SPECTRUM_BINS - 1) as f32;
            spectrum[i / 4][i % 4] = features.sample(t);
        }
        Self {
            resolution: [width as f32, height as f32],
            time: frame.time,
            intensity: features.intensity,
            beat_intensity: features.beat_intensity,
            bass: features.bass,
            mid: features.mid,
            high: features.high,
            mouse: frame.mouse,
            performance: if frame.performance_mode { 1.0 } else { 0.0 },
            pass_index: 0.0,
            spectrum,
        }
    }

    pub fn with_pass(mut self, pass: u32) -> Self {
        self.pass_index = pass as f32;
        self
    }
}

/// Prepend the shared header to a mode's fragment source.
pub fn compose_shader(fragment: &str) -> String {
    format!("{}\n{}", SHADER_HEADER, fragment)
}

pub fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("mode_bind_group_layout"),
        entries: &[
            // @binding(0): ShaderUniforms
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            // @binding(1): previous pass output (1x1 black when unused)
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            // @binding(2): linear sampler
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

pub fn build_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    label: &str,
    source: &str,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[QUAD_LAYOUT],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_is_sixteen_byte_aligned() {
        assert_eq!(std::mem::size_of::<ShaderUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<ShaderUniforms>(), 48 + SHADER_SPECTRUM_BINS * 4);
    }

    #[test]
    fn spectrum_is_resampled_into_uniforms() {
        let features = FeatureVector {
            spectrum: vec![0.0, 1.0],
            ..FeatureVector::default()
        };
        let uniforms = ShaderUniforms::new(&features, &FrameInfo::default(), 4, 4);
        assert_eq!(uniforms.spectrum[0][0], 0.0);
        assert_eq!(uniforms.spectrum[SHADER_SPECTRUM_BINS / 4 - 1][3], 1.0);
    }

    #[test]
    fn composed_shader_has_entry_points() {
        let source = compose_shader("@fragment fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> { return vec4<f32>(1.0); }");
        assert!(source.contains("fn vs_main"));
        assert!(source.contains("fn fs_main"));
    }
}
