//! GPU mesh backend (wgpu, headless).
//!
//! Lips, eyebrows and eyeshadow are drawn as indexed triangle fans over one
//! persistent vertex buffer holding every projected landmark. The mouth is
//! kept clear with the stencil buffer:
//!
//! 1. color writes off: outer lip fan writes stencil 1, inner fan increments
//!    (2 where they overlap);
//! 2. color on, stencil test `== 1`, outer lip fan again;
//! 3. the next region's pass starts from a cleared stencil.
//!
//! Each region is read back, then feathered and cut again on the CPU with
//! [`feather_and_cut`] before it is composited. Every other region, and any
//! region whose GPU draw fails, goes through an embedded [`CanvasRenderer`].

use wgpu::util::DeviceExt;

use super::{draw_selection, feather_and_cut, CanvasRenderer, FrameContext, OverlayRenderer};
use crate::canvas::{pixmap_from_rgba, Canvas};
use crate::color::Rgb;
use crate::decal::DecalOverlayManager;
use crate::error::{Result, TryOnError};
use crate::geometry::{
    eye, Side, LEFT_BROW_FAN, LEFT_EYESHADOW, LEFT_EYESHADOW_FAN, LIPS_INNER_FAN, LIPS_OUTER,
    LIPS_OUTER_FAN, RIGHT_BROW_FAN, RIGHT_EYESHADOW, RIGHT_EYESHADOW_FAN,
};
use crate::landmarks::{Bounds, Point, ProjectedFace, LANDMARK_COUNT};
use crate::region::{Region, RegionSelection};
use crate::style::StyleResolver;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;
const VERTEX_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct RegionUniform {
    color: [f32; 4],
    viewport: [f32; 2],
    _pad: [f32; 2],
}

struct IndexSet {
    buffer: wgpu::Buffer,
    count: u32,
}

impl IndexSet {
    fn new(device: &wgpu::Device, label: &str, fan: &[u16]) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(fan),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self { buffer, count: fan.len() as u32 }
    }
}

struct Fans {
    lips_outer: IndexSet,
    lips_inner: IndexSet,
    left_brow: IndexSet,
    right_brow: IndexSet,
    left_shadow: IndexSet,
    right_shadow: IndexSet,
}

struct Pipelines {
    /// Plain color fill.
    fill: wgpu::RenderPipeline,
    /// Color off, stencil := ref.
    mark: wgpu::RenderPipeline,
    /// Color off, stencil += 1.
    punch: wgpu::RenderPipeline,
    /// Color where stencil == ref.
    masked: wgpu::RenderPipeline,
}

/// Size-dependent GPU surfaces, rebuilt on resize.
struct Targets {
    width: u32,
    height: u32,
    padded_row: u32,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    stencil_view: wgpu::TextureView,
    readback: wgpu::Buffer,
}

impl Targets {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("overlay-color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let stencil = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("overlay-stencil"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: STENCIL_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        // Buffer copies need 256-byte aligned rows.
        let padded_row = (4 * width + 255) & !255;
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("overlay-readback"),
            size: (padded_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            width,
            height,
            padded_row,
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            stencil_view: stencil.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
            readback,
        }
    }
}

fn pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    label: &str,
    write_mask: wgpu::ColorWrites,
    compare: wgpu::CompareFunction,
    pass_op: wgpu::StencilOperation,
) -> wgpu::RenderPipeline {
    let face = wgpu::StencilFaceState {
        compare,
        fail_op: wgpu::StencilOperation::Keep,
        depth_fail_op: wgpu::StencilOperation::Keep,
        pass_op,
    };
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &VERTEX_ATTRS,
            }],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            // No blending: overlapping fan triangles must not stack.
            targets: &[Some(wgpu::ColorTargetState { format: COLOR_FORMAT, blend: None, write_mask })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: Some(wgpu::DepthStencilState {
            format: STENCIL_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Always,
            stencil: wgpu::StencilState { front: face, back: face, read_mask: 0xff, write_mask: 0xff },
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

pub struct MeshRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipelines: Pipelines,
    uniforms: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    vertices: wgpu::Buffer,
    fans: Fans,
    targets: Targets,
    staging: Vec<[f32; 2]>,
    scratch: Vec<u8>,
    fallback: CanvasRenderer,
}

impl MeshRenderer {
    /// Bring up a headless device. Any failure, including a shader that does
    /// not validate, is `BackendUnavailable`.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        pollster::block_on(Self::init(width.max(1), height.max(1)))
    }

    async fn init(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .map_err(|e| TryOnError::BackendUnavailable(format!("adapter: {e}")))?;
        log::debug!("[MESH] adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("makeup-overlay"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| TryOnError::BackendUnavailable(format!("device: {e}")))?;
        device.on_uncaptured_error(Box::new(|e: wgpu::Error| log::warn!("[MESH] uncaptured GPU error: {e}")));

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("overlay-mesh"),
            source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Borrowed(include_str!("mesh.wgsl"))),
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("region-uniform-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("overlay-pipeline-layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });

        use wgpu::{ColorWrites as W, CompareFunction as C, StencilOperation as S};
        let pipelines = Pipelines {
            fill: pipeline(&device, &layout, &shader, "fill", W::ALL, C::Always, S::Keep),
            mark: pipeline(&device, &layout, &shader, "stencil-mark", W::empty(), C::Always, S::Replace),
            punch: pipeline(&device, &layout, &shader, "stencil-punch", W::empty(), C::Always, S::IncrementClamp),
            masked: pipeline(&device, &layout, &shader, "stencil-masked", W::ALL, C::Equal, S::Keep),
        };
        if let Some(err) = device.pop_error_scope().await {
            return Err(TryOnError::BackendUnavailable(format!("shader: {err}")));
        }

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("region-uniform"),
            size: std::mem::size_of::<RegionUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("region-uniform-group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: uniforms.as_entire_binding() }],
        });
        let vertices = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("landmark-vertices"),
            size: (LANDMARK_COUNT * std::mem::size_of::<[f32; 2]>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let fans = Fans {
            lips_outer: IndexSet::new(&device, "lips-outer", &LIPS_OUTER_FAN),
            lips_inner: IndexSet::new(&device, "lips-inner", &LIPS_INNER_FAN),
            left_brow: IndexSet::new(&device, "left-brow", &LEFT_BROW_FAN),
            right_brow: IndexSet::new(&device, "right-brow", &RIGHT_BROW_FAN),
            left_shadow: IndexSet::new(&device, "left-eyeshadow", &LEFT_EYESHADOW_FAN),
            right_shadow: IndexSet::new(&device, "right-eyeshadow", &RIGHT_EYESHADOW_FAN),
        };
        let targets = Targets::new(&device, width, height);

        Ok(Self {
            device,
            queue,
            pipelines,
            uniforms,
            bind_group,
            vertices,
            fans,
            targets,
            staging: Vec::with_capacity(LANDMARK_COUNT),
            scratch: Vec::new(),
            fallback: CanvasRenderer::default(),
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.targets.width, self.targets.height)
    }

    /// Refresh the landmark vertex buffer; once per frame.
    fn upload(&mut self, face: &ProjectedFace) {
        self.staging.clear();
        self.staging.extend(face.points().iter().map(|p| [p.x, p.y]));
        self.queue.write_buffer(&self.vertices, 0, bytemuck::cast_slice(&self.staging));
    }

    fn encode_region(&self, pass: &mut wgpu::RenderPass<'_>, region: Region) -> Result<()> {
        let f = &self.fans;
        let draw = |pass: &mut wgpu::RenderPass<'_>, set: &IndexSet| {
            pass.set_index_buffer(set.buffer.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..set.count, 0, 0..1);
        };
        match region {
            Region::Lips => {
                pass.set_stencil_reference(1);
                pass.set_pipeline(&self.pipelines.mark);
                draw(pass, &f.lips_outer);
                pass.set_pipeline(&self.pipelines.punch);
                draw(pass, &f.lips_inner);
                pass.set_pipeline(&self.pipelines.masked);
                draw(pass, &f.lips_outer);
            }
            Region::Eyebrows => {
                pass.set_pipeline(&self.pipelines.fill);
                draw(pass, &f.left_brow);
                draw(pass, &f.right_brow);
            }
            Region::Eyeshadow => {
                pass.set_pipeline(&self.pipelines.fill);
                draw(pass, &f.left_shadow);
                draw(pass, &f.right_shadow);
            }
            other => return Err(TryOnError::draw(other.as_str(), "no mesh for region")),
        }
        Ok(())
    }

    /// Draw one region into the overlay target and read it back as
    /// premultiplied RGBA.
    fn draw_mesh(&self, region: Region, color: Rgb, opacity: f32) -> Result<Vec<u8>> {
        let t = &self.targets;
        let [r, g, b] = color.to_f32();
        let uniform = RegionUniform {
            color: [r, g, b, opacity.clamp(0.0, 1.0)],
            viewport: [t.width as f32, t.height as f32],
            _pad: [0.0; 2],
        };
        self.queue.write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&uniform));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("overlay-region") });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(region.as_str()),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &t.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &t.stencil_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0),
                        store: wgpu::StoreOp::Discard,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.set_vertex_buffer(0, self.vertices.slice(..));
            self.encode_region(&mut pass, region)?;
        }
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &t.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &t.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(t.padded_row),
                    rows_per_image: Some(t.height),
                },
            },
            wgpu::Extent3d { width: t.width, height: t.height, depth_or_array_layers: 1 },
        );
        self.queue.submit(Some(encoder.finish()));
        self.read_back()
    }

    fn read_back(&self) -> Result<Vec<u8>> {
        let t = &self.targets;
        let slice = t.readback.slice(..);
        let (tx, rx) = flume::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| TryOnError::BackendUnavailable(format!("poll: {e}")))?;
        rx.recv()
            .map_err(|_| TryOnError::BackendUnavailable("readback dropped".into()))?
            .map_err(|e| TryOnError::BackendUnavailable(format!("map: {e}")))?;

        let row = (4 * t.width) as usize;
        let mut out = Vec::with_capacity(row * t.height as usize);
        {
            let data = slice.get_mapped_range();
            for y in 0..t.height as usize {
                let start = y * t.padded_row as usize;
                out.extend_from_slice(&data[start..start + row]);
            }
        }
        t.readback.unmap();
        Ok(out)
    }

    fn draw_gpu_region(&mut self, canvas: &mut Canvas, ctx: &FrameContext<'_>, region: Region, color: Rgb) -> Result<()> {
        let style = ctx.styles.resolve(region);
        let data = self.draw_mesh(region, color, style.opacity)?;
        let mut layer = pixmap_from_rgba(data, self.targets.width, self.targets.height)?;
        let face = ctx.face;
        let outline: Vec<Point> = match region {
            Region::Lips => face.polygon(&LIPS_OUTER),
            Region::Eyebrows => Side::BOTH.iter().flat_map(|s| face.polygon(eye(*s).brow)).collect(),
            _ => face.polygon(&LEFT_EYESHADOW).into_iter().chain(face.polygon(&RIGHT_EYESHADOW)).collect(),
        };
        let short = Bounds::of(&outline).map(|b| b.width().min(b.height())).unwrap_or(0.0);
        feather_and_cut(&mut layer, face, region, style.feather_radius(short), &mut self.scratch);
        canvas.composite(&layer, style.blend);
        Ok(())
    }
}

impl OverlayRenderer for MeshRenderer {
    fn name(&self) -> &'static str {
        "MESH"
    }

    fn is_gpu(&self) -> bool {
        true
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) != self.size() {
            log::debug!("[MESH] overlay target {width}x{height}");
            self.targets = Targets::new(&self.device, width, height);
        }
        self.fallback.resize(width, height)
    }

    fn draw_region(&mut self, canvas: &mut Canvas, ctx: &mut FrameContext<'_>, region: Region, color: Rgb) -> Result<()> {
        if !matches!(region, Region::Lips | Region::Eyebrows | Region::Eyeshadow) {
            return self.fallback.draw_region(canvas, ctx, region, color);
        }
        // Same pixel size as the canvas, always.
        self.resize(canvas.width(), canvas.height())?;
        match self.draw_gpu_region(canvas, ctx, region, color) {
            Ok(()) => Ok(()),
            Err(e) => {
                log::debug!("[MESH] {region} via 2D: {e}");
                self.fallback.draw_region(canvas, ctx, region, color)
            }
        }
    }

    fn clear(&mut self) {
        self.fallback.clear();
    }

    fn render(
        &mut self,
        canvas: &mut Canvas,
        face: Option<&ProjectedFace>,
        selection: &RegionSelection,
        styles: &StyleResolver,
        decals: &mut DecalOverlayManager,
    ) -> usize {
        let Some(face) = face else {
            return 0;
        };
        self.upload(face);
        let mut ctx = FrameContext { face, styles, decals };
        draw_selection(self, canvas, &mut ctx, selection)
    }
}
