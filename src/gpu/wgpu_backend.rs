//! [`GpuDevice`] on top of `wgpu`.
//!
//! The immediate-mode commands are mapped onto wgpu as follows:
//!
//! - every clear and every draw is its own render pass with `LoadOp::Load`
//!   (or `Clear`) on the attachments of the bound framebuffer
//! - uniforms live in a CPU copy per program and are snapshotted into a fresh
//!   uniform buffer at each draw, so consecutive draws never alias
//! - pipelines are created lazily per (program, target formats, sample count,
//!   depth state, color masks) and cached on the program
//! - the visible target is an offscreen `Rgba8UnormSrgb` texture that can be
//!   read back with [`WgpuDevice::read_screen`]
//!
//! A program's WGSL is prefixed with a generated declaration block: the
//! uniforms become the fields of `u` (dots and brackets turn into `_`, so
//! `pointLights[2].position` is `u.pointLights_2_position`, booleans are `u32`)
//! and texture slot `N` is visible as `t_N` with sampler `s_N`. Entry points
//! are `vs_main` and `fs_main`; vertices follow
//! [`ModelVertex`](crate::data_structures::model::ModelVertex).

use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap, HashSet},
    time::Duration,
};

use anyhow::{Context as _, bail};
use wgpu::util::DeviceExt;

use crate::{
    data_structures::model::{MeshData, ModelVertex, Vertex},
    resources::texture::ImageData,
};

use super::{
    AttachedImage, AttachedImageInfo, AttachmentPoint, BlitSource, ClearFlags, ClipSpace, DepthFunc,
    FilterMode, FramebufferId, FramebufferStatus, FramebufferTarget, GpuDevice, MeshId, ProgramId,
    ProgramSource, ReleaseQueue, Releaser, RenderBufferDesc, RenderBufferId, ResourceId, SamplerDecl,
    SamplerDesc, TextureDesc, TextureDimension, TextureFormat, TextureId, UniformDecl, UniformKind,
    UniformValue, WrapMode, check_completeness,
};

const SCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const MAX_COLOR_MASKS: usize = 8;

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TextureFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
        TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        TextureFormat::R16Float => wgpu::TextureFormat::R16Float,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        TextureFormat::Depth24Stencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
    }
}

fn texel_size(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::R8Unorm => 1,
        TextureFormat::R16Float => 2,
        TextureFormat::Rgba8Unorm
        | TextureFormat::Rgba8UnormSrgb
        | TextureFormat::Rg16Float
        | TextureFormat::Depth32Float
        | TextureFormat::Depth24Stencil8 => 4,
        TextureFormat::Rgba16Float => 8,
        TextureFormat::Rgba32Float => 16,
    }
}

/// Sample count a multisampled attachment is allocated with.
///
/// Without adapter specific format features wgpu only guarantees 1 and 4
/// samples for every renderable format, so any multisampled request uses 4.
pub fn sample_count(requested: u32) -> u32 {
    if requested > 1 { 4 } else { 1 }
}

fn address_mode(wrap: WrapMode) -> wgpu::AddressMode {
    match wrap {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        // Border clamping needs an optional feature, edge clamping reads the same for shadow maps.
        WrapMode::ClampToEdge | WrapMode::ClampToBorder => wgpu::AddressMode::ClampToEdge,
    }
}

fn filter_mode(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn create_sampler(device: &wgpu::Device, desc: &SamplerDesc) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: None,
        address_mode_u: address_mode(desc.wrap_s),
        address_mode_v: address_mode(desc.wrap_t),
        address_mode_w: address_mode(desc.wrap_r),
        mag_filter: filter_mode(desc.mag_filter),
        min_filter: filter_mode(desc.min_filter),
        mipmap_filter: match desc.mipmap_filter {
            Some(FilterMode::Linear) => wgpu::MipmapFilterMode::Linear,
            _ => wgpu::MipmapFilterMode::Nearest,
        },
        compare: desc.compare.then_some(wgpu::CompareFunction::LessEqual),
        ..Default::default()
    })
}

/// A device texture together with its sampling view and sampler.
struct GpuImage {
    desc: TextureDesc,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

impl GpuImage {
    fn new(device: &wgpu::Device, desc: &TextureDesc) -> Self {
        let format = wgpu_format(desc.format);
        let usage = if desc.samples > 1 {
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
        } else {
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: desc.dimension.layers(),
            },
            mip_level_count: desc.mip_levels.max(1),
            sample_count: sample_count(desc.samples),
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(match desc.dimension {
                TextureDimension::D2 => wgpu::TextureViewDimension::D2,
                TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
            }),
            ..Default::default()
        });
        let sampler = create_sampler(device, &desc.sampler);
        Self {
            desc: desc.clone(),
            texture,
            view,
            sampler,
        }
    }

    fn from_render_buffer(device: &wgpu::Device, desc: &RenderBufferDesc) -> Self {
        Self::new(
            device,
            &TextureDesc {
                label: desc.label.clone(),
                dimension: TextureDimension::D2,
                width: desc.width,
                height: desc.height,
                format: desc.format,
                samples: desc.samples,
                mip_levels: 1,
                sampler: SamplerDesc {
                    mag_filter: FilterMode::Nearest,
                    min_filter: FilterMode::Nearest,
                    mipmap_filter: None,
                    wrap_s: WrapMode::ClampToEdge,
                    wrap_t: WrapMode::ClampToEdge,
                    wrap_r: WrapMode::ClampToEdge,
                    compare: false,
                },
            },
        )
    }

    /// Single layer, single mip view for rendering into.
    fn attachment_view(&self, layer: u32, mip: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: mip,
            mip_level_count: Some(1),
            base_array_layer: layer,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }
}

fn wgsl_type(kind: UniformKind) -> &'static str {
    match kind {
        UniformKind::Bool => "u32",
        UniformKind::Int => "i32",
        UniformKind::Float => "f32",
        UniformKind::Vec3 => "vec3<f32>",
        UniformKind::Vec4 => "vec4<f32>",
        UniformKind::Mat4 => "mat4x4<f32>",
    }
}

/// (alignment, size) in the uniform address space.
fn align_and_size(kind: UniformKind) -> (usize, usize) {
    match kind {
        UniformKind::Bool | UniformKind::Int | UniformKind::Float => (4, 4),
        UniformKind::Vec3 => (16, 12),
        UniformKind::Vec4 => (16, 16),
        UniformKind::Mat4 => (16, 64),
    }
}

/// `pointLights[2].position` becomes `pointLights_2_position`.
pub fn wgsl_field_name(name: &str) -> String {
    let mut field = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            field.push(c);
        } else if !field.ends_with('_') {
            field.push('_');
        }
    }
    field.trim_end_matches('_').to_string()
}

/// Byte layout of a program's uniform block plus its WGSL declaration.
#[derive(Debug, Default)]
pub struct UniformLayout {
    fields: HashMap<String, (usize, UniformKind)>,
    size: usize,
    wgsl: String,
}

impl UniformLayout {
    pub fn new(decls: &[UniformDecl], samplers: &[SamplerDecl]) -> Self {
        let mut fields = HashMap::new();
        let mut wgsl = String::from("struct Uniforms {\n");
        let mut offset: usize = 0;
        for decl in decls {
            let (align, size) = align_and_size(decl.kind);
            offset = offset.next_multiple_of(align);
            fields.insert(decl.name.clone(), (offset, decl.kind));
            wgsl.push_str(&format!("    {}: {},\n", wgsl_field_name(&decl.name), wgsl_type(decl.kind)));
            offset += size;
        }
        if decls.is_empty() {
            wgsl.push_str("    reserved: vec4<f32>,\n");
            offset = 16;
        }
        wgsl.push_str("}\n@group(0) @binding(0) var<uniform> u: Uniforms;\n");
        for (i, sampler) in samplers.iter().enumerate() {
            let (texture, sampler_type) = match (sampler.dimension, sampler.depth) {
                (_, true) => ("texture_depth_2d", "sampler_comparison"),
                (TextureDimension::D2, false) => ("texture_2d<f32>", "sampler"),
                (TextureDimension::Cube, false) => ("texture_cube<f32>", "sampler"),
            };
            let binding = 1 + 2 * i;
            wgsl.push_str(&format!(
                "@group(0) @binding({binding}) var t_{slot}: {texture};\n@group(0) @binding({}) var s_{slot}: {sampler_type};\n",
                binding + 1,
                slot = sampler.slot,
            ));
        }
        Self {
            fields,
            size: offset.next_multiple_of(16),
            wgsl,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.fields.get(name).map(|(offset, _)| *offset)
    }

    pub fn declarations(&self) -> &str {
        &self.wgsl
    }

    /// Writes `value` into `data`. Unknown names are ignored, like GL does for inactive uniforms.
    fn write(&self, data: &mut [u8], name: &str, value: UniformValue) -> anyhow::Result<()> {
        let Some((offset, kind)) = self.fields.get(name) else {
            return Ok(());
        };
        if *kind != value.kind() {
            bail!("uniform {name} is {kind:?}, got {:?}", value.kind());
        }
        let bytes: Vec<u8> = match value {
            UniformValue::Bool(v) => bytemuck::bytes_of(&(v as u32)).to_vec(),
            UniformValue::Int(v) => bytemuck::bytes_of(&v).to_vec(),
            UniformValue::Float(v) => bytemuck::bytes_of(&v).to_vec(),
            UniformValue::Vec3(v) => bytemuck::bytes_of(&v).to_vec(),
            UniformValue::Vec4(v) => bytemuck::bytes_of(&v).to_vec(),
            UniformValue::Mat4(v) => bytemuck::bytes_of(&v).to_vec(),
        };
        data[*offset..*offset + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    colors: Vec<(wgpu::TextureFormat, bool)>,
    depth: Option<wgpu::TextureFormat>,
    samples: u32,
    depth_test: bool,
    depth_func: DepthFunc,
}

struct Program {
    source: ProgramSource,
    module: Option<wgpu::ShaderModule>,
    layout: UniformLayout,
    data: Vec<u8>,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    count: u32,
}

#[derive(Default)]
struct Framebuffer {
    attachments: BTreeMap<AttachmentPoint, AttachedImage>,
    draw_buffers: Vec<AttachmentPoint>,
}

/// Views and formats of the target a pass renders into.
struct PassTarget {
    colors: Vec<(wgpu::TextureView, wgpu::TextureFormat)>,
    depth: Option<(wgpu::TextureView, wgpu::TextureFormat)>,
    samples: u32,
    extent: (u32, u32),
}

struct DrawState {
    bound: FramebufferTarget,
    viewport: (u32, u32),
    depth_test: bool,
    depth_func: DepthFunc,
    clear_color: [f32; 4],
    color_masks: [bool; MAX_COLOR_MASKS],
    program: Option<ProgramId>,
    slots: BTreeMap<u32, TextureId>,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            bound: FramebufferTarget::Default,
            viewport: (1, 1),
            depth_test: false,
            depth_func: DepthFunc::Less,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            color_masks: [true; MAX_COLOR_MASKS],
            program: None,
            slots: BTreeMap::new(),
        }
    }
}

/// Fallbacks bound to declared slots that have no matching texture.
struct Fallbacks {
    d2: GpuImage,
    cube: GpuImage,
    depth: GpuImage,
    filtering: wgpu::Sampler,
    comparison: wgpu::Sampler,
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    encoder: Option<wgpu::CommandEncoder>,
    next_id: u64,
    release: ReleaseQueue,
    textures: HashMap<TextureId, GpuImage>,
    render_buffers: HashMap<RenderBufferId, GpuImage>,
    framebuffers: HashMap<FramebufferId, Framebuffer>,
    meshes: HashMap<MeshId, MeshBuffers>,
    programs: HashMap<ProgramId, Program>,
    screen: GpuImage,
    screen_depth: GpuImage,
    fallbacks: Fallbacks,
    state: DrawState,
    warned: HashSet<String>,
}

fn screen_images(device: &wgpu::Device, width: u32, height: u32) -> (GpuImage, GpuImage) {
    let attachment = |label: &str, format| TextureDesc {
        label: label.to_string(),
        dimension: TextureDimension::D2,
        width,
        height,
        format,
        samples: 1,
        mip_levels: 1,
        sampler: SamplerDesc {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: None,
            wrap_s: WrapMode::ClampToEdge,
            wrap_t: WrapMode::ClampToEdge,
            wrap_r: WrapMode::ClampToEdge,
            compare: false,
        },
    };
    (
        GpuImage::new(device, &attachment("screen", TextureFormat::Rgba8UnormSrgb)),
        GpuImage::new(device, &attachment("screen_depth", TextureFormat::Depth32Float)),
    )
}

impl WgpuDevice {
    /// Device without a window. The visible target is a `width` x `height` texture.
    pub async fn new_headless(width: u32, height: u32) -> anyhow::Result<Self> {
        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("No graphics adapter available")?;
        log::info!("device and queue");
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("flow-render"),
                // Rgba32Float textures are sampled through filtering samplers.
                required_features: adapter.features() & wgpu::Features::FLOAT32_FILTERABLE,
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                ..Default::default()
            })
            .await
            .context("Cannot open graphics device")?;
        Ok(Self::from_device(device, queue, width, height))
    }

    /// Blocking [`new_headless`](Self::new_headless).
    pub fn new_headless_blocking(width: u32, height: u32) -> anyhow::Result<Self> {
        futures::executor::block_on(Self::new_headless(width, height))
    }

    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Self {
        let (screen, screen_depth) = screen_images(&device, width, height);
        let fallback = |label: &str, dimension, format, compare| TextureDesc {
            label: label.to_string(),
            dimension,
            width: 1,
            height: 1,
            format,
            samples: 1,
            mip_levels: 1,
            sampler: SamplerDesc {
                mag_filter: FilterMode::Linear,
                min_filter: FilterMode::Linear,
                mipmap_filter: None,
                wrap_s: WrapMode::Repeat,
                wrap_t: WrapMode::Repeat,
                wrap_r: WrapMode::Repeat,
                compare,
            },
        };
        let d2 = GpuImage::new(&device, &fallback("fallback_2d", TextureDimension::D2, TextureFormat::Rgba8Unorm, false));
        let cube = GpuImage::new(&device, &fallback("fallback_cube", TextureDimension::Cube, TextureFormat::Rgba8Unorm, false));
        let depth = GpuImage::new(&device, &fallback("fallback_depth", TextureDimension::D2, TextureFormat::Depth32Float, true));
        let filtering = create_sampler(&device, &d2.desc.sampler);
        let comparison = create_sampler(&device, &depth.desc.sampler);
        Self {
            device,
            queue,
            encoder: None,
            next_id: 1,
            release: ReleaseQueue::new(),
            textures: HashMap::new(),
            render_buffers: HashMap::new(),
            framebuffers: HashMap::new(),
            meshes: HashMap::new(),
            programs: HashMap::new(),
            screen,
            screen_depth,
            fallbacks: Fallbacks {
                d2,
                cube,
                depth,
                filtering,
                comparison,
            },
            state: DrawState::default(),
            warned: HashSet::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn warn_once(&mut self, message: String) {
        if self.warned.insert(message.clone()) {
            log::warn!("{message}");
        }
    }

    fn take_encoder(&mut self) -> wgpu::CommandEncoder {
        self.encoder.take().unwrap_or_else(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("frame") })
        })
    }

    fn image(&self, image: &AttachedImage) -> Option<(&GpuImage, u32, u32)> {
        match image {
            AttachedImage::Texture { id, layer, mip } => {
                let img = self.textures.get(id)?;
                (*layer < img.desc.dimension.layers() && *mip < img.desc.mip_levels).then_some((img, *layer, *mip))
            }
            AttachedImage::RenderBuffer(id) => self.render_buffers.get(id).map(|img| (img, 0, 0)),
        }
    }

    fn pass_target(&mut self, target: FramebufferTarget) -> Option<PassTarget> {
        let FramebufferTarget::Offscreen(id) = target else {
            return Some(PassTarget {
                colors: vec![(self.screen.attachment_view(0, 0), SCREEN_FORMAT)],
                depth: Some((self.screen_depth.attachment_view(0, 0), DEPTH_FORMAT)),
                samples: 1,
                extent: (self.screen.desc.width, self.screen.desc.height),
            });
        };
        let status = self.framebuffer_status(id);
        if !status.is_complete() {
            self.warn_once(format!("Skipping work on framebuffer {}: {status}", id.0));
            return None;
        }
        let fb = self.framebuffers.get(&id)?;
        let mut colors = Vec::new();
        let mut samples = 1;
        let mut extent = (1, 1);
        for point in &fb.draw_buffers {
            let (img, layer, mip) = self.image(fb.attachments.get(point)?)?;
            colors.push((img.attachment_view(layer, mip), wgpu_format(img.desc.format)));
            samples = sample_count(img.desc.samples);
            extent = img.desc.mip_extent(mip);
        }
        let depth_image = fb
            .attachments
            .get(&AttachmentPoint::Depth)
            .or_else(|| fb.attachments.get(&AttachmentPoint::DepthStencil));
        let depth = match depth_image {
            Some(image) => {
                let (img, layer, mip) = self.image(image)?;
                samples = sample_count(img.desc.samples);
                extent = img.desc.mip_extent(mip);
                Some((img.attachment_view(layer, mip), wgpu_format(img.desc.format)))
            }
            None => None,
        };
        Some(PassTarget {
            colors,
            depth,
            samples,
            extent,
        })
    }

    fn ensure_pipeline(&mut self, program: ProgramId, key: &PipelineKey) -> anyhow::Result<()> {
        let program = self.programs.get_mut(&program).context("unknown program")?;
        if program.pipelines.contains_key(key) {
            return Ok(());
        }
        let module = program
            .module
            .as_ref()
            .with_context(|| format!("program {} has no shading code", program.source.label))?;
        let targets: Vec<_> = key
            .colors
            .iter()
            .map(|(format, write)| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: None,
                    write_mask: if *write { wgpu::ColorWrites::ALL } else { wgpu::ColorWrites::empty() },
                })
            })
            .collect();
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            cache: None,
            label: Some(&program.source.label),
            layout: Some(&program.pipeline_layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs_main"),
                buffers: &[ModelVertex::desc()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some("fs_main"),
                targets: &targets,
                compilation_options: Default::default(),
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
            depth_stencil: key.depth.map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: Some(key.depth_test),
                depth_compare: Some(match (key.depth_test, key.depth_func) {
                    (false, _) => wgpu::CompareFunction::Always,
                    (true, DepthFunc::Less) => wgpu::CompareFunction::Less,
                    (true, DepthFunc::LessEqual) => wgpu::CompareFunction::LessEqual,
                }),
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: key.samples,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview_mask: None,
        });
        program.pipelines.insert(key.clone(), pipeline);
        Ok(())
    }

    fn bind_group(&self, program: &Program) -> wgpu::BindGroup {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&program.source.label),
            contents: &program.data,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let mut resources = Vec::with_capacity(program.source.samplers.len());
        for decl in &program.source.samplers {
            let bound = self
                .state
                .slots
                .get(&decl.slot)
                .and_then(|id| self.textures.get(id))
                .filter(|img| {
                    img.desc.dimension == decl.dimension
                        && img.desc.format.is_depth() == decl.depth
                        && img.desc.samples == 1
                });
            let view = match (bound, decl.dimension, decl.depth) {
                (Some(img), _, _) => &img.view,
                (None, _, true) => &self.fallbacks.depth.view,
                (None, TextureDimension::Cube, false) => &self.fallbacks.cube.view,
                (None, TextureDimension::D2, false) => &self.fallbacks.d2.view,
            };
            let sampler = match bound {
                Some(img) if img.desc.sampler.compare == decl.depth => &img.sampler,
                _ if decl.depth => &self.fallbacks.comparison,
                _ => &self.fallbacks.filtering,
            };
            resources.push((view, sampler));
        }
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }];
        for (i, (view, sampler)) in resources.into_iter().enumerate() {
            let binding = 1 + 2 * i as u32;
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: binding + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&program.source.label),
            layout: &program.bind_group_layout,
            entries: &entries,
        })
    }

    fn bind_group_layout(&self, source: &ProgramSource) -> wgpu::BindGroupLayout {
        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for (i, decl) in source.samplers.iter().enumerate() {
            let binding = 1 + 2 * i as u32;
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: if decl.depth {
                        wgpu::TextureSampleType::Depth
                    } else {
                        wgpu::TextureSampleType::Float { filterable: true }
                    },
                    view_dimension: match decl.dimension {
                        TextureDimension::D2 => wgpu::TextureViewDimension::D2,
                        TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
                    },
                    multisampled: false,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: binding + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(if decl.depth {
                    wgpu::SamplerBindingType::Comparison
                } else {
                    wgpu::SamplerBindingType::Filtering
                }),
                count: None,
            });
        }
        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&source.label),
            entries: &entries,
        })
    }

    fn clear_color(&self) -> wgpu::Color {
        let [r, g, b, a] = self.state.clear_color;
        wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        }
    }

    /// Copies the visible target into an RGBA8 image.
    pub fn read_screen(&mut self) -> anyhow::Result<image::RgbaImage> {
        let (width, height) = (self.screen.desc.width, self.screen.desc.height);
        let unpadded = 4 * width;
        let padded = unpadded.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let output = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("screen readback"),
            size: (padded * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self.take_encoder();
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &self.screen.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = output.slice(..);
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: Some(Duration::from_secs(3)),
        })?;
        futures::executor::block_on(rx.receive())
            .context("Readback channel closed")?
            .context("Cannot map readback buffer")?;

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        for row in data.chunks(padded as usize) {
            pixels.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(data);
        output.unmap();
        image::RgbaImage::from_raw(width, height, pixels).context("Readback size mismatch")
    }
}

impl GpuDevice for WgpuDevice {
    fn clip_space(&self) -> ClipSpace {
        ClipSpace::ZeroToOne
    }

    fn releaser(&self) -> Releaser {
        self.release.releaser()
    }

    fn maintain(&mut self) {
        for id in self.release.drain_reverse_creation() {
            match id {
                ResourceId::Texture(t) => {
                    self.textures.remove(&t);
                    self.state.slots.retain(|_, bound| *bound != t);
                }
                ResourceId::RenderBuffer(r) => {
                    self.render_buffers.remove(&r);
                }
                ResourceId::Framebuffer(f) => {
                    self.framebuffers.remove(&f);
                    if self.state.bound == FramebufferTarget::Offscreen(f) {
                        self.state.bound = FramebufferTarget::Default;
                    }
                }
                ResourceId::Mesh(m) => {
                    self.meshes.remove(&m);
                }
                ResourceId::Program(p) => {
                    self.programs.remove(&p);
                    if self.state.program == Some(p) {
                        self.state.program = None;
                    }
                }
            }
            log::trace!("Released {id:?}");
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        let id = TextureId(self.next());
        self.textures.insert(id, GpuImage::new(&self.device, desc));
        id
    }

    fn resize_texture(&mut self, id: TextureId, desc: &TextureDesc) {
        if self.textures.contains_key(&id) {
            self.textures.insert(id, GpuImage::new(&self.device, desc));
        }
    }

    fn upload_texture(&mut self, id: TextureId, layer: u32, mip: u32, image: &ImageData) {
        let Some(img) = self.textures.get(&id) else {
            return;
        };
        if texel_size(img.desc.format) != image.bytes_per_pixel() || img.desc.samples > 1 {
            self.warn_once(format!("Upload format mismatch on texture {}", img.desc.label));
            return;
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &img.texture,
                mip_level: mip,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            image.as_bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(image.bytes_per_pixel() * image.width()),
                rows_per_image: Some(image.height()),
            },
            wgpu::Extent3d {
                width: image.width(),
                height: image.height(),
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_render_buffer(&mut self, desc: &RenderBufferDesc) -> RenderBufferId {
        let id = RenderBufferId(self.next());
        self.render_buffers
            .insert(id, GpuImage::from_render_buffer(&self.device, desc));
        id
    }

    fn resize_render_buffer(&mut self, id: RenderBufferId, desc: &RenderBufferDesc) {
        if self.render_buffers.contains_key(&id) {
            self.render_buffers
                .insert(id, GpuImage::from_render_buffer(&self.device, desc));
        }
    }

    fn create_framebuffer(&mut self, _label: &str) -> FramebufferId {
        let id = FramebufferId(self.next());
        self.framebuffers.insert(id, Framebuffer::default());
        id
    }

    fn attach(&mut self, framebuffer: FramebufferId, point: AttachmentPoint, image: Option<AttachedImage>) {
        if let Some(fb) = self.framebuffers.get_mut(&framebuffer) {
            match image {
                Some(image) => fb.attachments.insert(point, image),
                None => fb.attachments.remove(&point),
            };
        }
    }

    fn set_draw_buffers(&mut self, framebuffer: FramebufferId, buffers: &[AttachmentPoint]) {
        if let Some(fb) = self.framebuffers.get_mut(&framebuffer) {
            fb.draw_buffers = buffers.to_vec();
        }
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        let Some(fb) = self.framebuffers.get(&framebuffer) else {
            return FramebufferStatus::Unsupported(format!("unknown framebuffer {}", framebuffer.0));
        };
        let info = |image: &AttachedImage| {
            self.image(image).map(|(img, _, mip)| {
                let (width, height) = img.desc.mip_extent(mip);
                AttachedImageInfo {
                    width,
                    height,
                    samples: img.desc.samples,
                    format: img.desc.format,
                }
            })
        };
        let status = check_completeness(
            fb.attachments.iter().map(|(point, image)| (*point, info(image))),
            &fb.draw_buffers,
        );
        if status.is_complete() && fb.draw_buffers.len() > MAX_COLOR_MASKS {
            return FramebufferStatus::Unsupported(format!("more than {MAX_COLOR_MASKS} draw buffers"));
        }
        status
    }

    fn blit(&mut self, src: FramebufferId, dst: FramebufferId, width: u32, height: u32, source: BlitSource) {
        let point = match source {
            BlitSource::Color(i) => AttachmentPoint::Color(i),
            BlitSource::Depth => AttachmentPoint::Depth,
        };
        let images = self
            .framebuffers
            .get(&src)
            .and_then(|fb| fb.attachments.get(&point))
            .zip(self.framebuffers.get(&dst).and_then(|fb| fb.attachments.get(&point)))
            .map(|(a, b)| (*a, *b));
        let Some((from, to)) = images else {
            self.warn_once(format!("Blit of {point} between {} and {} has no images", src.0, dst.0));
            return;
        };
        let mut encoder = self.take_encoder();
        match (self.image(&from), self.image(&to)) {
            (Some((a, a_layer, a_mip)), Some((b, b_layer, b_mip))) => {
                if a.desc.samples != b.desc.samples && a.desc.format.is_depth() {
                    log::warn!("Depth blit between {} and {} needs equal sample counts", a.desc.label, b.desc.label);
                } else if a.desc.samples > 1 && b.desc.samples == 1 {
                    // Multisample resolve.
                    let view = a.attachment_view(a_layer, a_mip);
                    let resolve = b.attachment_view(b_layer, b_mip);
                    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("resolve"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: &view,
                            resolve_target: Some(&resolve),
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Load,
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        })],
                        depth_stencil_attachment: None,
                        occlusion_query_set: None,
                        timestamp_writes: None,
                        ..Default::default()
                    });
                } else {
                    let (aw, ah) = a.desc.mip_extent(a_mip);
                    let (bw, bh) = b.desc.mip_extent(b_mip);
                    let extent = wgpu::Extent3d {
                        width: width.min(aw).min(bw),
                        height: height.min(ah).min(bh),
                        depth_or_array_layers: 1,
                    };
                    encoder.copy_texture_to_texture(
                        wgpu::TexelCopyTextureInfo {
                            texture: &a.texture,
                            mip_level: a_mip,
                            origin: wgpu::Origin3d { x: 0, y: 0, z: a_layer },
                            aspect: wgpu::TextureAspect::All,
                        },
                        wgpu::TexelCopyTextureInfo {
                            texture: &b.texture,
                            mip_level: b_mip,
                            origin: wgpu::Origin3d { x: 0, y: 0, z: b_layer },
                            aspect: wgpu::TextureAspect::All,
                        },
                        extent,
                    );
                }
            }
            _ => log::warn!("Blit source or destination was released"),
        }
        self.encoder = Some(encoder);
    }

    fn upload_mesh(&mut self, mesh: &MeshData) -> MeshId {
        let id = MeshId(self.next());
        let vertex = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertex Buffer", mesh.label)),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Index Buffer", mesh.label)),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.meshes.insert(
            id,
            MeshBuffers {
                vertex,
                index,
                count: mesh.indices.len() as u32,
            },
        );
        id
    }

    fn create_program(&mut self, source: &ProgramSource) -> anyhow::Result<ProgramId> {
        let layout = UniformLayout::new(&source.uniforms, &source.samplers);
        let module = match &source.wgsl {
            Some(wgsl) => {
                for entry in ["fn vs_main", "fn fs_main"] {
                    if !wgsl.contains(entry) {
                        bail!("program {} lacks `{entry}`", source.label);
                    }
                }
                let code = format!("{}\n{}", layout.declarations(), wgsl);
                Some(self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(&source.label),
                    source: wgpu::ShaderSource::Wgsl(Cow::Owned(code)),
                }))
            }
            None => {
                log::debug!("Program {} has no shading code, its draws are skipped", source.label);
                None
            }
        };
        let bind_group_layout = self.bind_group_layout(source);
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&source.label),
            bind_group_layouts: &[Some(&bind_group_layout)],
            immediate_size: 0,
        });
        let id = ProgramId(self.next());
        self.programs.insert(
            id,
            Program {
                source: source.clone(),
                module,
                data: vec![0; layout.size()],
                layout,
                bind_group_layout,
                pipeline_layout,
                pipelines: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn bind_framebuffer(&mut self, target: FramebufferTarget) {
        self.state.bound = target;
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.state.viewport = (width, height);
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.state.depth_test = enabled;
    }

    fn set_depth_func(&mut self, func: DepthFunc) {
        self.state.depth_func = func;
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.state.clear_color = color;
    }

    fn clear(&mut self, flags: ClearFlags) {
        let Some(target) = self.pass_target(self.state.bound) else {
            return;
        };
        let color_load = if flags.color {
            wgpu::LoadOp::Clear(self.clear_color())
        } else {
            wgpu::LoadOp::Load
        };
        let color_attachments: Vec<_> = target
            .colors
            .iter()
            .map(|(view, _)| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();
        let mut encoder = self.take_encoder();
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("clear"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: target.depth.as_ref().map(|(view, _)| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: if flags.depth {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
            ..Default::default()
        });
        self.encoder = Some(encoder);
    }

    fn color_mask(&mut self, attachment: u8, enabled: bool) {
        if let Some(mask) = self.state.color_masks.get_mut(attachment as usize) {
            *mask = enabled;
        }
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureId) {
        self.state.slots.insert(slot, texture);
    }

    fn use_program(&mut self, program: ProgramId) {
        self.state.program = Some(program);
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue) {
        let Some(p) = self.programs.get_mut(&program) else {
            return;
        };
        if let Err(e) = p.layout.write(&mut p.data, name, value) {
            let message = format!("{}: {e}", p.source.label);
            self.warn_once(message);
        }
    }

    fn draw_mesh(&mut self, mesh: MeshId) {
        let Some(program_id) = self.state.program else {
            self.warn_once("Draw without an active program".to_string());
            return;
        };
        let Some(target) = self.pass_target(self.state.bound) else {
            return;
        };
        let key = PipelineKey {
            colors: target
                .colors
                .iter()
                .enumerate()
                .map(|(i, (_, format))| (*format, self.state.color_masks[i]))
                .collect(),
            depth: target.depth.as_ref().map(|(_, format)| *format),
            samples: target.samples,
            depth_test: self.state.depth_test,
            depth_func: self.state.depth_func,
        };
        if let Err(e) = self.ensure_pipeline(program_id, &key) {
            self.warn_once(format!("Draw skipped: {e:#}"));
            return;
        }
        let (Some(program), Some(buffers)) = (self.programs.get(&program_id), self.meshes.get(&mesh)) else {
            return;
        };
        let Some(pipeline) = program.pipelines.get(&key) else {
            return;
        };
        if buffers.count == 0 {
            return;
        }
        let bind_group = self.bind_group(program);
        let (vw, vh) = (
            self.state.viewport.0.min(target.extent.0).max(1),
            self.state.viewport.1.min(target.extent.1).max(1),
        );

        let mut encoder = self
            .encoder
            .take()
            .unwrap_or_else(|| self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("frame") }));
        {
            let color_attachments: Vec<_> = target
                .colors
                .iter()
                .map(|(view, _)| {
                    Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })
                })
                .collect();
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&program.source.label),
                color_attachments: &color_attachments,
                depth_stencil_attachment: target.depth.as_ref().map(|(view, _)| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
                ..Default::default()
            });
            pass.set_viewport(0.0, 0.0, vw as f32, vh as f32, 0.0, 1.0);
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, buffers.vertex.slice(..));
            pass.set_index_buffer(buffers.index.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..buffers.count, 0, 0..1);
        }
        self.encoder = Some(encoder);
    }

    fn resize_screen(&mut self, width: u32, height: u32) {
        let (screen, depth) = screen_images(&self.device, width, height);
        self.screen = screen;
        self.screen_depth = depth;
    }

    fn end_frame(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }
}

