//! # WgpuDevice — The Batch Engine on a Real GPU
//!
//! [`WgpuDevice`] implements [`RenderDevice`] on top of a headless
//! [`GpuContext`] and renders into an offscreen target.
//!
//! ## Frame Flow
//!
//! ```text
//!  apply_frame_state ──► new segment { FrameState, draws: [] } if the state changed
//!  map_vertices      ──► CPU staging slice handed to the fill workers
//!  unmap_vertices    ──► queue.write_buffer(staging → pooled vertex buffer #slot)
//!  draw_indexed      ──► segment.draws.push(texture, slot, index_count)
//!  finish_frame      ──► one render pass:
//!                          per segment: pipeline, camera, scissor
//!                          per draw:    texture bind group, vertex buffer, draw
//!                        submit, recycle slots
//! ```
//!
//! ## What Each Piece Does
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Pipelines  keyed by (blend, depth, rasterizer), built lazily │
//! │ Samplers   one per SamplerMode, built lazily                 │
//! │ Bind group 0: camera uniform (view-projection, vertex only)  │
//! │ Bind group 1: texture + sampler, cached per (texture, mode)  │
//! │ Index buffer: uploaded once, 16-bit                          │
//! │ Vertex pool: one buffer per chunk slot, grown, never shrunk  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Decisions
//!
//! **Staged writes instead of mapped GPU memory.** wgpu has no synchronous
//! map for write on all backends, so `map_vertices` hands out a CPU slice
//! and `unmap_vertices` copies it with `queue.write_buffer`. The engine sees
//! the same map/fill/unmap/draw contract either way.
//!
//! **One pooled buffer per chunk.** Every draw in a frame owns its own
//! vertex buffer slot, so the writes for all chunks can be staged before the
//! single submit without overwriting each other.
//!
//! **Front face is clockwise.** Quads are wound top-left, top-right,
//! bottom-right in a y-down space, which is clockwise once projected.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::device::{RenderDevice, TextureDesc};
use super::gpu::GpuContext;
use super::texture::{Texture, TextureHandle, TextureTable};
use crate::error::{DeviceError, DeviceResult};
use crate::math::{AtlasRect, Mat4};
use crate::sprite::state::{BlendMode, DepthMode, FrameState, RasterizerMode, SamplerMode};
use crate::sprite::vertex::{AtlasSpriteVertex, QuadVertex, SpriteVertex};
use crate::sprite::Color;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// A vertex format the wgpu backend can draw: its buffer layout, the view
/// dimension its shader samples, and the shader itself.
pub trait GpuVertex: QuadVertex {
    const LAYOUT: wgpu::VertexBufferLayout<'static>;
    const VIEW_DIMENSION: wgpu::TextureViewDimension;
    const SHADER: &'static str;
}

impl GpuVertex for SpriteVertex {
    const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<SpriteVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x4,
            },
            // color
            wgpu::VertexAttribute {
                offset: 16,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x4,
            },
            // uv
            wgpu::VertexAttribute {
                offset: 32,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x2,
            },
        ],
    };
    const VIEW_DIMENSION: wgpu::TextureViewDimension = wgpu::TextureViewDimension::D2;
    const SHADER: &'static str = include_str!("shaders/sprite.wgsl");
}

impl GpuVertex for AtlasSpriteVertex {
    const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<AtlasSpriteVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x4,
            },
            wgpu::VertexAttribute {
                offset: 16,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x4,
            },
            wgpu::VertexAttribute {
                offset: 32,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x2,
            },
            // slice
            wgpu::VertexAttribute {
                offset: 40,
                shader_location: 3,
                format: wgpu::VertexFormat::Float32,
            },
        ],
    };
    const VIEW_DIMENSION: wgpu::TextureViewDimension = wgpu::TextureViewDimension::D2Array;
    const SHADER: &'static str = include_str!("shaders/sprite_array.wgsl");
}

/// View-projection matrix uploaded as a uniform buffer.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
}

struct GpuTexture {
    texture: wgpu::Texture,
    width: u32,
    height: u32,
    layers: u32,
}

struct Target {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    blend: BlendMode,
    depth: DepthMode,
    rasterizer: RasterizerMode,
}

impl PipelineKey {
    fn of(frame: &FrameState) -> Self {
        let state = frame.render_state;
        Self {
            blend: state.blend,
            depth: state.depth,
            rasterizer: state.rasterizer,
        }
    }
}

struct PendingDraw {
    texture: TextureHandle,
    slot: usize,
    index_count: u32,
}

/// Draws recorded under one frame state.
struct Segment {
    frame: FrameState,
    draws: Vec<PendingDraw>,
}

/// A [`RenderDevice`] backed by wgpu, rendering offscreen.
pub struct WgpuDevice<V: GpuVertex = SpriteVertex> {
    gpu: GpuContext,
    shader: wgpu::ShaderModule,
    camera_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    samplers: HashMap<SamplerMode, wgpu::Sampler>,
    bind_groups: HashMap<(TextureHandle, SamplerMode), wgpu::BindGroup>,
    textures: TextureTable<GpuTexture>,
    index_buffer: Option<(wgpu::Buffer, usize)>,
    vertex_pool: Vec<wgpu::Buffer>,
    camera_pool: Vec<(wgpu::Buffer, wgpu::BindGroup)>,
    staging: Vec<V>,
    mapped: Option<Texture>,
    unmapped: Option<(TextureHandle, usize)>,
    segments: Vec<Segment>,
    next_slot: usize,
    target: Option<Target>,
    clear: Option<wgpu::Color>,
}

impl<V: GpuVertex> WgpuDevice<V> {
    pub fn new(gpu: GpuContext) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sprite shader"),
            source: wgpu::ShaderSource::Wgsl(V::SHADER.into()),
        });

        // Bind group layout 0: camera uniform
        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("camera bind group layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        // Bind group layout 1: texture + sampler
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: V::VIEW_DIMENSION,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
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
            label: Some("sprite pipeline layout"),
            bind_group_layouts: &[&camera_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        Self {
            shader,
            camera_layout,
            texture_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
            samplers: HashMap::new(),
            bind_groups: HashMap::new(),
            textures: TextureTable::new(),
            index_buffer: None,
            vertex_pool: Vec::new(),
            camera_pool: Vec::new(),
            staging: Vec::new(),
            mapped: None,
            unmapped: None,
            segments: Vec::new(),
            next_slot: 0,
            target: None,
            clear: None,
            gpu,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Render into a fresh `width × height` offscreen target.
    pub fn set_target(&mut self, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let color = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        self.target = Some(Target {
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
            width,
            height,
        });
        // A new target starts transparent.
        self.clear = Some(wgpu::Color::TRANSPARENT);
        log::debug!("offscreen target set to {width}x{height}");
    }

    /// Clear the target to `color` at the start of the next `finish_frame`.
    pub fn clear(&mut self, color: Color) {
        self.clear = Some(wgpu::Color {
            r: color.r as f64,
            g: color.g as f64,
            b: color.b as f64,
            a: color.a as f64,
        });
    }

    /// Copy the target back to the CPU as tightly packed RGBA8 rows.
    pub fn read_target(&self) -> DeviceResult<Vec<u8>> {
        let target = self.target.as_ref().ok_or(DeviceError::NoTarget)?;
        let device = &self.gpu.device;
        let unpadded = target.width * 4;
        let bytes_per_row = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let output = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("offscreen readback"),
            size: bytes_per_row as u64 * target.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(target.height),
                },
            },
            wgpu::Extent3d {
                width: target.width,
                height: target.height,
                depth_or_array_layers: 1,
            },
        );
        self.gpu.queue.submit(Some(encoder.finish()));

        let slice = output.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        let mapped = loop {
            let _ = device.poll(wgpu::PollType::Poll);
            match rx.try_recv() {
                Ok(result) => break result,
                Err(std::sync::mpsc::TryRecvError::Empty) => std::thread::yield_now(),
                Err(std::sync::mpsc::TryRecvError::Disconnected) => {
                    return Err(DeviceError::Readback("map callback dropped".into()));
                }
            }
        };
        mapped.map_err(|e| DeviceError::Readback(e.to_string()))?;

        let view = slice.get_mapped_range();
        let mut rgba = Vec::with_capacity((unpadded * target.height) as usize);
        for row in view.chunks(bytes_per_row as usize) {
            rgba.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(view);
        output.unmap();
        Ok(rgba)
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }

        let polygon_mode = match key.rasterizer {
            RasterizerMode::Wireframe if self.gpu.supports_wireframe() => wgpu::PolygonMode::Line,
            RasterizerMode::Wireframe => {
                log::warn!("wireframe rasterization unsupported by adapter, drawing filled");
                wgpu::PolygonMode::Fill
            }
            _ => wgpu::PolygonMode::Fill,
        };
        let cull_mode = match key.rasterizer {
            RasterizerMode::CullBack => Some(wgpu::Face::Back),
            _ => None,
        };
        let (depth_write_enabled, depth_compare) = match key.depth {
            DepthMode::None => (false, wgpu::CompareFunction::Always),
            DepthMode::Read => (false, wgpu::CompareFunction::LessEqual),
            DepthMode::ReadWrite => (true, wgpu::CompareFunction::LessEqual),
        };

        let pipeline = self
            .gpu
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("sprite pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.shader,
                    entry_point: Some("vs_main"),
                    buffers: &[V::LAYOUT],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &self.shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: COLOR_FORMAT,
                        blend: blend_state(key.blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Cw,
                    cull_mode,
                    polygon_mode,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled,
                    depth_compare,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        log::debug!("sprite pipeline built for {key:?}");
        self.pipelines.insert(key, pipeline);
    }

    fn ensure_bind_group(&mut self, handle: TextureHandle, mode: SamplerMode) -> bool {
        if self.bind_groups.contains_key(&(handle, mode)) {
            return true;
        }
        let Some(entry) = self.textures.get(handle) else {
            return false;
        };

        let sampler = self
            .samplers
            .entry(mode)
            .or_insert_with(|| create_sampler(&self.gpu.device, mode));
        let array_layer_count = match V::VIEW_DIMENSION {
            wgpu::TextureViewDimension::D2 => Some(1),
            _ => Some(entry.layers),
        };
        let view = entry.texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(V::VIEW_DIMENSION),
            array_layer_count,
            ..Default::default()
        });
        let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sprite texture bind group"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        self.bind_groups.insert((handle, mode), bind_group);
        true
    }

    fn ensure_camera_slot(&mut self, slot: usize) {
        while self.camera_pool.len() <= slot {
            let buffer = self
                .gpu
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("camera uniform buffer"),
                    contents: bytemuck::cast_slice(&[CameraUniform {
                        view_proj: Mat4::IDENTITY.to_cols_array_2d(),
                    }]),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                });
            let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("camera bind group"),
                layout: &self.camera_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            self.camera_pool.push((buffer, bind_group));
        }
    }

    /// Make sure vertex slot `slot` can hold `bytes` bytes.
    fn ensure_vertex_slot(&mut self, slot: usize, bytes: u64) {
        let too_small = self
            .vertex_pool
            .get(slot)
            .is_none_or(|buffer| buffer.size() < bytes);
        if !too_small {
            return;
        }
        let buffer = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sprite vertex buffer"),
            size: bytes,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if slot < self.vertex_pool.len() {
            self.vertex_pool[slot] = buffer;
        } else {
            self.vertex_pool.push(buffer);
        }
    }
}

impl<V: GpuVertex> RenderDevice for WgpuDevice<V> {
    type Vertex = V;

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> DeviceResult<Texture> {
        let layers = desc.layers.max(1);
        if let Some(data) = desc.data {
            let expected = desc.byte_len();
            if data.len() != expected {
                return Err(DeviceError::TextureDataSize {
                    expected,
                    actual: data.len(),
                });
            }
        }
        let descriptor = wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        };
        let texture = match desc.data {
            Some(data) => self.gpu.device.create_texture_with_data(
                &self.gpu.queue,
                &descriptor,
                wgpu::util::TextureDataOrder::LayerMajor,
                data,
            ),
            None => self.gpu.device.create_texture(&descriptor),
        };

        let handle = self.textures.insert(GpuTexture {
            texture,
            width: desc.width,
            height: desc.height,
            layers,
        });
        Ok(Texture::new(handle, desc.width, desc.height, layers))
    }

    fn write_texture_region(
        &mut self,
        texture: Texture,
        layer: u32,
        region: AtlasRect,
        data: &[u8],
    ) -> DeviceResult<()> {
        let entry = self
            .textures
            .get(texture.handle)
            .ok_or(DeviceError::UnknownTexture(texture.handle))?;
        let expected = region.area() as usize * 4;
        if data.len() != expected {
            return Err(DeviceError::TextureDataSize {
                expected,
                actual: data.len(),
            });
        }
        if region.right() > entry.width || region.bottom() > entry.height || layer >= entry.layers {
            return Err(DeviceError::RegionOutOfBounds {
                region,
                width: entry.width,
                height: entry.height,
                layers: entry.layers,
            });
        }
        if region.area() == 0 {
            return Ok(());
        }

        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.x,
                    y: region.y,
                    z: layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * region.width),
                rows_per_image: Some(region.height),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn destroy_texture(&mut self, texture: Texture) -> DeviceResult<()> {
        let entry = self
            .textures
            .remove(texture.handle)
            .ok_or(DeviceError::UnknownTexture(texture.handle))?;
        entry.texture.destroy();
        self.bind_groups.retain(|(handle, _), _| *handle != texture.handle);
        Ok(())
    }

    fn texture(&self, handle: TextureHandle) -> Option<Texture> {
        self.textures
            .get(handle)
            .map(|e| Texture::new(handle, e.width, e.height, e.layers))
    }

    fn upload_indices(&mut self, indices: &[u16]) {
        // Engines sharing this device reuse the longest pattern uploaded.
        if self
            .index_buffer
            .as_ref()
            .is_some_and(|(_, len)| *len >= indices.len())
        {
            return;
        }
        let buffer = self
            .gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad index buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        self.index_buffer = Some((buffer, indices.len()));
    }

    fn apply_frame_state(&mut self, state: &FrameState) {
        // Chunks re-bind their state; only a change opens a new segment.
        if self.segments.last().is_some_and(|s| s.frame == *state) {
            return;
        }
        self.segments.push(Segment {
            frame: state.clone(),
            draws: Vec::new(),
        });
    }

    fn map_vertices(&mut self, texture: Texture, quad_count: usize) -> DeviceResult<&mut [V]> {
        if !self.textures.contains(texture.handle) {
            return Err(DeviceError::UnknownTexture(texture.handle));
        }
        self.staging.clear();
        self.staging.resize(quad_count * 4, V::zeroed());
        self.mapped = Some(texture);
        Ok(&mut self.staging)
    }

    fn unmap_vertices(&mut self) {
        let Some(texture) = self.mapped.take() else {
            log::error!("unmap_vertices without a mapped region");
            return;
        };
        let slot = self.next_slot;
        self.next_slot += 1;

        let len = std::mem::size_of_val(self.staging.as_slice()) as u64;
        self.ensure_vertex_slot(slot, len);
        self.gpu
            .queue
            .write_buffer(&self.vertex_pool[slot], 0, bytemuck::cast_slice(&self.staging));
        self.unmapped = Some((texture.handle, slot));
    }

    fn draw_indexed(&mut self, index_count: u32) {
        let Some((texture, slot)) = self.unmapped.take() else {
            log::error!("draw_indexed without an unmapped vertex region");
            return;
        };
        match self.segments.last_mut() {
            Some(segment) => segment.draws.push(PendingDraw {
                texture,
                slot,
                index_count,
            }),
            None => log::error!("draw_indexed before apply_frame_state"),
        }
    }

    fn finish_frame(&mut self) -> DeviceResult<()> {
        let segments = std::mem::take(&mut self.segments);
        self.next_slot = 0;
        if self.target.is_none() {
            return Err(DeviceError::NoTarget);
        }

        // Build everything the pass needs before it borrows the encoder.
        for (i, segment) in segments.iter().enumerate() {
            self.ensure_pipeline(PipelineKey::of(&segment.frame));
            self.ensure_camera_slot(i);
            let uniform = CameraUniform {
                view_proj: segment.frame.view_projection().to_cols_array_2d(),
            };
            self.gpu
                .queue
                .write_buffer(&self.camera_pool[i].0, 0, bytemuck::cast_slice(&[uniform]));
            for draw in &segment.draws {
                if !self.ensure_bind_group(draw.texture, segment.frame.render_state.sampler) {
                    log::warn!("texture {:?} destroyed before its draw was submitted", draw.texture);
                }
            }
        }

        let (Some(target), Some((index_buffer, _))) = (&self.target, &self.index_buffer) else {
            return if segments.iter().all(|s| s.draws.is_empty()) {
                Ok(())
            } else {
                Err(DeviceError::NoIndexBuffer)
            };
        };

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sprite frame encoder"),
            });
        {
            let clear = self.clear.take();
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("sprite pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: if clear.is_some() {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            for (i, segment) in segments.iter().enumerate() {
                let Some(pipeline) = self.pipelines.get(&PipelineKey::of(&segment.frame)) else {
                    continue;
                };
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &self.camera_pool[i].1, &[]);
                match segment.frame.scissor {
                    Some(s) => {
                        let x = s.x.min(target.width);
                        let y = s.y.min(target.height);
                        pass.set_scissor_rect(
                            x,
                            y,
                            s.width.min(target.width - x),
                            s.height.min(target.height - y),
                        );
                    }
                    None => pass.set_scissor_rect(0, 0, target.width, target.height),
                }

                let sampler = segment.frame.render_state.sampler;
                for draw in &segment.draws {
                    let Some(bind_group) = self.bind_groups.get(&(draw.texture, sampler)) else {
                        continue;
                    };
                    let bytes = (draw.index_count as u64 / 6)
                        * 4
                        * std::mem::size_of::<V>() as u64;
                    pass.set_bind_group(1, bind_group, &[]);
                    pass.set_vertex_buffer(0, self.vertex_pool[draw.slot].slice(..bytes));
                    pass.draw_indexed(0..draw.index_count, 0, 0..1);
                }
            }
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

fn blend_state(mode: BlendMode) -> Option<wgpu::BlendState> {
    match mode {
        BlendMode::AlphaBlend => Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
        BlendMode::NonPremultiplied => Some(wgpu::BlendState::ALPHA_BLENDING),
        BlendMode::Additive => {
            let add = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            Some(wgpu::BlendState {
                color: add,
                alpha: add,
            })
        }
        BlendMode::Opaque => Some(wgpu::BlendState::REPLACE),
    }
}

fn create_sampler(device: &wgpu::Device, mode: SamplerMode) -> wgpu::Sampler {
    let (address, filter) = match mode {
        SamplerMode::LinearClamp => (wgpu::AddressMode::ClampToEdge, wgpu::FilterMode::Linear),
        SamplerMode::PointClamp => (wgpu::AddressMode::ClampToEdge, wgpu::FilterMode::Nearest),
        SamplerMode::LinearWrap => (wgpu::AddressMode::Repeat, wgpu::FilterMode::Linear),
        SamplerMode::PointWrap => (wgpu::AddressMode::Repeat, wgpu::FilterMode::Nearest),
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("sprite sampler"),
        address_mode_u: address,
        address_mode_v: address,
        mag_filter: filter,
        min_filter: filter,
        ..Default::default()
    })
}
