use wgpu;

use super::backend::GpuError;
use super::gpu::GpuContext;

pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Offscreen render target plus the staging buffer used to read it back.
pub struct GpuSurface {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    readback: Option<wgpu::Buffer>,
}

impl GpuSurface {
    pub fn new(gpu: &GpuContext, label: &str, width: u32, height: u32) -> Self {
        let texture = create_texture(gpu, label, width, height);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
            readback: None,
        }
    }

    /// Reallocate the backing texture at a new size. The readback buffer is
    /// rebuilt lazily on the next read.
    pub fn resize(&mut self, gpu: &GpuContext, label: &str, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        self.texture.destroy();
        self.texture = create_texture(gpu, label, width, height);
        self.view = self.texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.width = width;
        self.height = height;
        if let Some(buffer) = self.readback.take() {
            buffer.destroy();
        }
    }

    pub fn destroy(self) {
        self.texture.destroy();
        if let Some(buffer) = self.readback {
            buffer.destroy();
        }
    }

    fn padded_bytes_per_row(&self) -> u32 {
        let unpadded = self.width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        (unpadded + align - 1) / align * align
    }

    /// Copy the texture into tightly packed RGBA rows.
    pub fn read_pixels(&mut self, gpu: &GpuContext, out: &mut Vec<u8>) -> Result<(), GpuError> {
        let padded_bytes_per_row = self.padded_bytes_per_row();
        let unpadded_bytes_per_row = self.width * 4;

        let buffer = self.readback.get_or_insert_with(|| {
            gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("surface_readback"),
                size: (padded_bytes_per_row * self.height) as u64,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            })
        });

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| GpuError::Readback(e.to_string()))?
            .map_err(|e| GpuError::Readback(e.to_string()))?;

        {
            let data = buffer_slice.get_mapped_range();
            out.clear();
            out.reserve((unpadded_bytes_per_row * self.height) as usize);
            for row in 0..self.height {
                let start = (row * padded_bytes_per_row) as usize;
                let end = start + unpadded_bytes_per_row as usize;
                out.extend_from_slice(&data[start..end]);
            }
        }
        buffer.unmap();
        Ok(())
    }
}

fn create_texture(gpu: &GpuContext, label: &str, width: u32, height: u32) -> wgpu::Texture {
    gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    })
}
