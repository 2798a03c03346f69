//! wgpu implementation of the glint [`RenderBackend`].
//!
//! One textured, tinted triangle-list pipeline drives everything; a small
//! cache holds one pipeline variant per blend mode. Each submission writes
//! the batch into a grow-only vertex buffer and records a single render
//! pass that loads the existing target contents.
//!
//! The host owns the surface: call [`WgpuBackend::set_target`] with the
//! frame's texture view before driving the renderer, and present afterwards.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glint_gfx::backend::{
    BackendTextureId, ClipRect, Filtering, RenderBackend, Submission, TextureUpload,
};
use glint_gfx::pack::Vertex;
use glint_gfx::state::BlendMode;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct ResolutionUniform {
    size: [f32; 2],
    _pad: [f32; 2],
}

struct TextureEntry {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    size: (u32, u32),
    filtering: Filtering,
    repeat: bool,
}

struct Target {
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,

    shader: wgpu::ShaderModule,
    texture_bgl: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    // One variant per blend mode, indexed by `blend_index`.
    pipelines: [Option<wgpu::RenderPipeline>; 5],

    resolution_ubo: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,

    vbo: Option<wgpu::Buffer>,
    vbo_capacity: usize,

    textures: HashMap<BackendTextureId, TextureEntry>,
    next_id: BackendTextureId,

    blend: BlendMode,
    clip: Option<ClipRect>,
    target: Option<Target>,
    warned_no_target: bool,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, surface_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("glint batch shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/batch.wgsl").into()),
        });

        let uniform_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glint resolution bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: Some(
                        std::num::NonZeroU64::new(std::mem::size_of::<ResolutionUniform>() as u64)
                            .unwrap(),
                    ),
                },
                count: None,
            }],
        });

        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glint texture bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("glint pipeline layout"),
            bind_group_layouts: &[&uniform_bgl, &texture_bgl],
            immediate_size: 0,
        });

        let resolution_ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("glint resolution ubo"),
            size: std::mem::size_of::<ResolutionUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("glint resolution bind group"),
            layout: &uniform_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: resolution_ubo.as_entire_binding(),
            }],
        });

        Self {
            device,
            queue,
            surface_format,
            shader,
            texture_bgl,
            pipeline_layout,
            pipelines: [None, None, None, None, None],
            resolution_ubo,
            uniform_bind_group,
            vbo: None,
            vbo_capacity: 0,
            textures: HashMap::new(),
            next_id: 0,
            blend: BlendMode::Alpha,
            clip: None,
            target: None,
            warned_no_target: false,
        }
    }

    /// Points the backend at this frame's render target. `width`/`height`
    /// are the target's physical pixel dimensions (used to clamp scissor
    /// rects).
    pub fn set_target(&mut self, view: wgpu::TextureView, width: u32, height: u32) {
        self.target = Some(Target { view, width, height });
    }

    /// Drops the target reference; call after presenting.
    pub fn clear_target(&mut self) {
        self.target = None;
    }

    fn ensure_pipeline(&mut self, mode: BlendMode) {
        let idx = blend_index(mode);
        if self.pipelines[idx].is_some() {
            return;
        }

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("glint batch pipeline"),
            layout: Some(&self.pipeline_layout),

            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[vertex_layout()],
            },

            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.surface_format,
                    blend: blend_state(mode),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        self.pipelines[idx] = Some(pipeline);
    }

    fn ensure_vbo_capacity(&mut self, required_vertices: usize) {
        if required_vertices <= self.vbo_capacity && self.vbo.is_some() {
            return;
        }
        let new_cap = required_vertices.next_power_of_two().max(1024);
        self.vbo = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("glint batch vbo"),
            size: (new_cap * std::mem::size_of::<Vertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.vbo_capacity = new_cap;
    }

    fn make_entry(&self, upload: &TextureUpload<'_>) -> TextureEntry {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glint texture"),
            size: wgpu::Extent3d {
                width: upload.width,
                height: upload.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let address_mode = if upload.repeat {
            wgpu::AddressMode::Repeat
        } else {
            wgpu::AddressMode::ClampToEdge
        };
        let (filter, mip_filter) = match upload.filtering {
            Filtering::Nearest => (wgpu::FilterMode::Nearest, wgpu::MipmapFilterMode::Nearest),
            Filtering::Linear => (wgpu::FilterMode::Linear, wgpu::MipmapFilterMode::Nearest),
            Filtering::Trilinear => (wgpu::FilterMode::Linear, wgpu::MipmapFilterMode::Linear),
        };
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("glint sampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: mip_filter,
            ..Default::default()
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("glint texture bind group"),
            layout: &self.texture_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        TextureEntry {
            texture,
            bind_group,
            size: (upload.width, upload.height),
            filtering: upload.filtering,
            repeat: upload.repeat,
        }
    }

    fn write_pixels(&self, entry: &TextureEntry, upload: &TextureUpload<'_>) {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            upload.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(upload.width * 4),
                rows_per_image: Some(upload.height),
            },
            wgpu::Extent3d {
                width: upload.width,
                height: upload.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn scissor(&self, target: &Target) -> Option<(u32, u32, u32, u32)> {
        let clip = self.clip?;
        let x0 = clip.x.clamp(0, target.width as i32) as u32;
        let y0 = clip.y.clamp(0, target.height as i32) as u32;
        let x1 = (clip.x + clip.w).clamp(0, target.width as i32) as u32;
        let y1 = (clip.y + clip.h).clamp(0, target.height as i32) as u32;
        Some((x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0)))
    }

    fn warn_no_target(&mut self) {
        if !self.warned_no_target {
            log::warn!("WgpuBackend used without a render target; call set_target first");
            self.warned_no_target = true;
        }
    }
}

impl RenderBackend for WgpuBackend {
    fn create_texture(&mut self, upload: &TextureUpload<'_>) -> BackendTextureId {
        let entry = self.make_entry(upload);
        self.write_pixels(&entry, upload);
        self.next_id += 1;
        self.textures.insert(self.next_id, entry);
        self.next_id
    }

    fn update_texture(&mut self, id: BackendTextureId, upload: &TextureUpload<'_>) {
        let Some(entry) = self.textures.get(&id) else {
            log::warn!("update_texture: unknown texture id {id}");
            return;
        };
        // Dimension or sampler changes need a fresh texture and bind group.
        if entry.size != (upload.width, upload.height)
            || entry.filtering != upload.filtering
            || entry.repeat != upload.repeat
        {
            let entry = self.make_entry(upload);
            self.write_pixels(&entry, upload);
            self.textures.insert(id, entry);
        } else {
            self.write_pixels(entry, upload);
        }
    }

    fn delete_texture(&mut self, id: BackendTextureId) {
        self.textures.remove(&id);
    }

    fn set_blend(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    fn set_clip(&mut self, clip: Option<ClipRect>) {
        self.clip = clip;
    }

    fn clear(&mut self, color: [f32; 4]) {
        let Some(target) = self.target.as_ref() else {
            self.warn_no_target();
            return;
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("glint clear") });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("glint clear pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: color[0] as f64,
                        g: color[1] as f64,
                        b: color[2] as f64,
                        a: color[3] as f64,
                    }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        self.queue.submit(Some(encoder.finish()));
    }

    fn submit(&mut self, submission: Submission<'_>) {
        if submission.vertices.is_empty() {
            return;
        }
        if self.target.is_none() {
            self.warn_no_target();
            return;
        }
        if !self.textures.contains_key(&submission.texture) {
            log::warn!("submit with unknown texture id {}", submission.texture);
            return;
        }

        self.ensure_pipeline(self.blend);
        self.ensure_vbo_capacity(submission.vertices.len());

        let u = ResolutionUniform {
            size: [submission.resolution[0].max(1.0), submission.resolution[1].max(1.0)],
            _pad: [0.0; 2],
        };
        self.queue.write_buffer(&self.resolution_ubo, 0, bytemuck::bytes_of(&u));

        // Immutable borrows only from here on.
        let Some(vbo) = self.vbo.as_ref() else { return };
        self.queue.write_buffer(vbo, 0, bytemuck::cast_slice(submission.vertices));

        let Some(target) = self.target.as_ref() else { return };
        let Some(pipeline) = self.pipelines[blend_index(self.blend)].as_ref() else { return };
        let Some(entry) = self.textures.get(&submission.texture) else { return };
        let bind_group = &entry.bind_group;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("glint batch") });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("glint batch pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &self.uniform_bind_group, &[]);
            rpass.set_bind_group(1, bind_group, &[]);
            rpass.set_vertex_buffer(0, vbo.slice(..));
            if let Some((sx, sy, sw, sh)) = self.scissor(target) {
                if sw == 0 || sh == 0 {
                    return;
                }
                rpass.set_scissor_rect(sx, sy, sw, sh);
            }
            rpass.draw(0..submission.vertices.len() as u32, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
    }
}

fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x2, // pos
        1 => Unorm8x4,  // color
        2 => Sint16x2   // uv, shader divides by 16383
    ];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRS,
    }
}

#[inline]
fn blend_index(mode: BlendMode) -> usize {
    match mode {
        BlendMode::None => 0,
        BlendMode::Alpha => 1,
        BlendMode::Add => 2,
        BlendMode::Modulate => 3,
        BlendMode::Multiply => 4,
    }
}

fn blend_state(mode: BlendMode) -> Option<wgpu::BlendState> {
    match mode {
        BlendMode::None => None,
        BlendMode::Alpha => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
        }),
        BlendMode::Add => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        }),
        // Destination scaled by source color, destination alpha kept.
        BlendMode::Modulate => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Zero,
                dst_factor: wgpu::BlendFactor::Src,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Zero,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        }),
        BlendMode::Multiply => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Dst,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Dst,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_packed_vertex() {
        let layout = vertex_layout();
        assert_eq!(layout.array_stride, 16);
        assert_eq!(layout.attributes.len(), 3);
        assert_eq!(layout.attributes[1].offset, 8);
        assert_eq!(layout.attributes[2].offset, 12);
    }

    #[test]
    fn every_blend_mode_has_a_slot() {
        let modes = [
            BlendMode::None,
            BlendMode::Alpha,
            BlendMode::Add,
            BlendMode::Modulate,
            BlendMode::Multiply,
        ];
        let mut seen = [false; 5];
        for m in modes {
            seen[blend_index(m)] = true;
        }
        assert!(seen.iter().all(|s| *s));
        assert!(blend_state(BlendMode::None).is_none());
        assert!(blend_state(BlendMode::Alpha).is_some());
    }
}
