//! Immediate-mode GPU command interface.
//!
//! Every pass in this crate talks to the graphics hardware exclusively through
//! the [`GpuDevice`] trait: a small, GL-flavoured command surface with bound
//! framebuffers, texture slots, an active program and named uniforms. Two
//! implementations ship with the crate:
//!
//! - [`recording::RecordingDevice`] is headless and keeps an inspectable log of
//!   every command (used by the tests and for frame captures)
//! - [`wgpu_backend::WgpuDevice`] executes the commands on top of `wgpu`
//!
//! GPU objects created through the device are wrapped into owning handles
//! ([`GpuTexture`], [`GpuRenderBuffer`], [`GpuFramebuffer`], [`GpuMesh`],
//! [`GpuProgram`]).
//! Dropping a handle queues its id on the device's release channel and
//! [`GpuDevice::maintain`] frees queued objects in reverse creation order.

pub mod recording;
pub mod wgpu_backend;

use std::{borrow::Cow, fmt};

use crate::{data_structures::model::MeshData, resources::texture::ImageData};

macro_rules! resource_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);
        )*
    };
}

resource_id!(
    /// Device-side name of a texture.
    TextureId,
    /// Device-side name of a render buffer (non-sampled attachment storage).
    RenderBufferId,
    /// Device-side name of a framebuffer object.
    FramebufferId,
    /// Device-side name of an uploaded vertex/index buffer pair.
    MeshId,
    /// Device-side name of a shader program.
    ProgramId,
);

/// Any releasable GPU object.
///
/// Ids are drawn from one monotonic counter per device, so the numeric value
/// doubles as the creation sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Texture(TextureId),
    RenderBuffer(RenderBufferId),
    Framebuffer(FramebufferId),
    Mesh(MeshId),
    Program(ProgramId),
}

impl ResourceId {
    pub fn sequence(&self) -> u64 {
        match self {
            ResourceId::Texture(id) => id.0,
            ResourceId::RenderBuffer(id) => id.0,
            ResourceId::Framebuffer(id) => id.0,
            ResourceId::Mesh(id) => id.0,
            ResourceId::Program(id) => id.0,
        }
    }
}

/// Sending half of a device's release queue.
#[derive(Clone, Debug)]
pub struct Releaser(flume::Sender<ResourceId>);

impl Releaser {
    pub fn release(&self, id: ResourceId) {
        // The device may already be gone during teardown, nothing left to free then.
        let _ = self.0.send(id);
    }
}

/// Receiving half of a device's release queue.
#[derive(Debug)]
pub struct ReleaseQueue {
    tx: flume::Sender<ResourceId>,
    rx: flume::Receiver<ResourceId>,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    pub fn releaser(&self) -> Releaser {
        Releaser(self.tx.clone())
    }

    /// Takes every queued id, newest first.
    pub fn drain_reverse_creation(&self) -> Vec<ResourceId> {
        let mut released: Vec<ResourceId> = self.rx.try_iter().collect();
        released.sort_by(|a, b| b.sequence().cmp(&a.sequence()));
        released
    }
}

impl Default for ReleaseQueue {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! owned_handle {
    ($(#[$meta:meta])* $name:ident, $id:ident, $variant:ident) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            id: $id,
            releaser: Releaser,
        }

        impl $name {
            pub fn new(id: $id, releaser: Releaser) -> Self {
                Self { id, releaser }
            }

            pub fn id(&self) -> $id {
                self.id
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.releaser.release(ResourceId::$variant(self.id));
            }
        }
    };
}

owned_handle!(
    /// Owning handle of a device texture.
    GpuTexture,
    TextureId,
    Texture
);
owned_handle!(
    /// Owning handle of a device render buffer.
    GpuRenderBuffer,
    RenderBufferId,
    RenderBuffer
);
owned_handle!(
    /// Owning handle of a device framebuffer.
    GpuFramebuffer,
    FramebufferId,
    Framebuffer
);
owned_handle!(
    /// Owning handle of uploaded mesh buffers.
    GpuMesh,
    MeshId,
    Mesh
);
owned_handle!(
    /// Owning handle of a compiled program.
    GpuProgram,
    ProgramId,
    Program
);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    Rg16Float,
    R8Unorm,
    R16Float,
    Depth32Float,
    Depth24Stencil8,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float | TextureFormat::Depth24Stencil8)
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, TextureFormat::Depth24Stencil8)
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            TextureFormat::Rgba16Float
                | TextureFormat::Rgba32Float
                | TextureFormat::Rg16Float
                | TextureFormat::R16Float
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    Cube,
}

impl TextureDimension {
    pub fn layers(&self) -> u32 {
        match self {
            TextureDimension::D2 => 1,
            TextureDimension::Cube => 6,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum WrapMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    /// `None` disables filtering between mip levels.
    pub mipmap_filter: Option<FilterMode>,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub wrap_r: WrapMode,
    /// Depth comparison sampling (shadow maps).
    pub compare: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub dimension: TextureDimension,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub samples: u32,
    pub mip_levels: u32,
    pub sampler: SamplerDesc,
}

impl TextureDesc {
    /// Extent of mip `level`, never smaller than one texel.
    pub fn mip_extent(&self, level: u32) -> (u32, u32) {
        ((self.width >> level).max(1), (self.height >> level).max(1))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderBufferDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub samples: u32,
}

/// Named attachment point of a framebuffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttachmentPoint {
    Color(u8),
    Depth,
    DepthStencil,
}

impl fmt::Display for AttachmentPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentPoint::Color(i) => write!(f, "COLOR_ATTACHMENT{i}"),
            AttachmentPoint::Depth => f.write_str("DEPTH_ATTACHMENT"),
            AttachmentPoint::DepthStencil => f.write_str("DEPTH_STENCIL_ATTACHMENT"),
        }
    }
}

/// Image bound at an attachment point. `layer` selects a cube face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttachedImage {
    Texture {
        id: TextureId,
        layer: u32,
        mip: u32,
    },
    RenderBuffer(RenderBufferId),
}

/// Result of a framebuffer completeness check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    MissingAttachment,
    IncompleteAttachment(AttachmentPoint),
    IncompleteDimensions,
    IncompleteMultisample,
    IncompleteDrawBuffer(AttachmentPoint),
    Unsupported(String),
}

impl FramebufferStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, FramebufferStatus::Complete)
    }
}

impl fmt::Display for FramebufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramebufferStatus::Complete => f.write_str("complete"),
            FramebufferStatus::MissingAttachment => f.write_str("no attachments"),
            FramebufferStatus::IncompleteAttachment(p) => write!(f, "{p} is not attachable"),
            FramebufferStatus::IncompleteDimensions => f.write_str("attachment sizes differ"),
            FramebufferStatus::IncompleteMultisample => f.write_str("attachment sample counts differ"),
            FramebufferStatus::IncompleteDrawBuffer(p) => {
                write!(f, "draw buffer {p} has no attachment")
            }
            FramebufferStatus::Unsupported(reason) => write!(f, "unsupported: {reason}"),
        }
    }
}

/// What a device knows about one attached image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachedImageInfo {
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub format: TextureFormat,
}

/// Completeness rules shared by every backend.
///
/// `attachments` yields `None` for images that no longer exist on the device.
pub fn check_completeness<'a>(
    attachments: impl IntoIterator<Item = (AttachmentPoint, Option<AttachedImageInfo>)>,
    draw_buffers: impl IntoIterator<Item = &'a AttachmentPoint>,
) -> FramebufferStatus {
    let attachments: Vec<_> = attachments.into_iter().collect();
    if attachments.is_empty() {
        return FramebufferStatus::MissingAttachment;
    }
    let mut extent = None;
    let mut samples = None;
    for (point, info) in &attachments {
        let Some(info) = info else {
            return FramebufferStatus::IncompleteAttachment(*point);
        };
        let fits = match point {
            AttachmentPoint::Color(_) => !info.format.is_depth(),
            AttachmentPoint::Depth => info.format.is_depth(),
            AttachmentPoint::DepthStencil => info.format.has_stencil(),
        };
        if !fits || info.width == 0 || info.height == 0 {
            return FramebufferStatus::IncompleteAttachment(*point);
        }
        match extent {
            None => extent = Some((info.width, info.height)),
            Some(e) if e != (info.width, info.height) => {
                return FramebufferStatus::IncompleteDimensions;
            }
            Some(_) => (),
        }
        match samples {
            None => samples = Some(info.samples),
            Some(s) if s != info.samples => return FramebufferStatus::IncompleteMultisample,
            Some(_) => (),
        }
    }
    for buffer in draw_buffers {
        if !attachments.iter().any(|(point, _)| point == buffer) {
            return FramebufferStatus::IncompleteDrawBuffer(*buffer);
        }
    }
    FramebufferStatus::Complete
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FramebufferTarget {
    /// The visible target (window surface or screen texture).
    Default,
    Offscreen(FramebufferId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClearFlags {
    pub color: bool,
    pub depth: bool,
    pub stencil: bool,
}

impl ClearFlags {
    pub const COLOR: Self = Self { color: true, depth: false, stencil: false };
    pub const DEPTH: Self = Self { color: false, depth: true, stencil: false };
    pub const COLOR_DEPTH: Self = Self { color: true, depth: true, stencil: false };
    pub const ALL: Self = Self { color: true, depth: true, stencil: true };

    pub fn is_empty(&self) -> bool {
        !(self.color || self.depth || self.stencil)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    Less,
    LessEqual,
}

/// Which buffer a blit copies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlitSource {
    Color(u8),
    Depth,
}

/// Depth range the device expects from projection matrices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipSpace {
    /// OpenGL convention, z in [-1, 1].
    NegativeOneToOne,
    /// wgpu/Vulkan/Metal/D3D convention, z in [0, 1].
    ZeroToOne,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4([[f32; 4]; 4]),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Bool(_) => UniformKind::Bool,
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Bool,
    Int,
    Float,
    Vec3,
    Vec4,
    Mat4,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub kind: UniformKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerDecl {
    pub slot: u32,
    pub dimension: TextureDimension,
    pub depth: bool,
}

/// Description of an opaque shader program.
///
/// The shading code itself is supplied by the caller. Backends that need it
/// (wgpu) read `wgsl`, the declared uniform block and sampler slots, headless
/// backends only keep the label.
#[derive(Clone, Debug, Default)]
pub struct ProgramSource {
    pub label: String,
    pub wgsl: Option<Cow<'static, str>>,
    pub uniforms: Vec<UniformDecl>,
    pub samplers: Vec<SamplerDecl>,
}

impl ProgramSource {
    pub fn opaque(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Default::default()
        }
    }

    pub fn with_wgsl(mut self, wgsl: impl Into<Cow<'static, str>>) -> Self {
        self.wgsl = Some(wgsl.into());
        self
    }

    pub fn uniform(mut self, name: &str, kind: UniformKind) -> Self {
        self.uniforms.push(UniformDecl {
            name: name.to_string(),
            kind,
        });
        self
    }

    /// Declares `base[i].field` for every element and field, element-major.
    pub fn uniform_struct_array(
        mut self,
        base: &str,
        count: usize,
        fields: &[(&str, UniformKind)],
    ) -> Self {
        for i in 0..count {
            for (field, kind) in fields {
                self = self.uniform(&format!("{base}[{i}].{field}"), *kind);
            }
        }
        self
    }

    pub fn sampler(mut self, slot: u32, dimension: TextureDimension) -> Self {
        self.samplers.push(SamplerDecl {
            slot,
            dimension,
            depth: false,
        });
        self
    }

    pub fn depth_sampler(mut self, slot: u32) -> Self {
        self.samplers.push(SamplerDecl {
            slot,
            dimension: TextureDimension::D2,
            depth: true,
        });
        self
    }
}

/// The command surface every pass is written against.
///
/// State set through this trait (bound framebuffer, viewport, depth state,
/// color masks, texture slots, active program) stays in effect until it is
/// changed again, exactly like a GL context. Texture slot bindings are scratch
/// state for the next draw, they do not express ownership.
pub trait GpuDevice {
    fn clip_space(&self) -> ClipSpace;

    fn releaser(&self) -> Releaser;

    /// Frees every released object, newest first.
    fn maintain(&mut self);

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId;

    /// Reallocates the storage of `id` with `desc`. Content is undefined afterwards.
    fn resize_texture(&mut self, id: TextureId, desc: &TextureDesc);

    fn upload_texture(&mut self, id: TextureId, layer: u32, mip: u32, image: &ImageData);

    fn create_render_buffer(&mut self, desc: &RenderBufferDesc) -> RenderBufferId;

    fn resize_render_buffer(&mut self, id: RenderBufferId, desc: &RenderBufferDesc);

    fn create_framebuffer(&mut self, label: &str) -> FramebufferId;

    /// Binds `image` at `point`, `None` detaches whatever was there.
    fn attach(
        &mut self,
        framebuffer: FramebufferId,
        point: AttachmentPoint,
        image: Option<AttachedImage>,
    );

    fn set_draw_buffers(&mut self, framebuffer: FramebufferId, buffers: &[AttachmentPoint]);

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus;

    /// Copies a `width` x `height` region anchored at the origin.
    fn blit(
        &mut self,
        src: FramebufferId,
        dst: FramebufferId,
        width: u32,
        height: u32,
        source: BlitSource,
    );

    fn upload_mesh(&mut self, mesh: &MeshData) -> MeshId;

    fn create_program(&mut self, source: &ProgramSource) -> anyhow::Result<ProgramId>;

    fn bind_framebuffer(&mut self, target: FramebufferTarget);

    fn viewport(&mut self, width: u32, height: u32);

    fn set_depth_test(&mut self, enabled: bool);

    fn set_depth_func(&mut self, func: DepthFunc);

    fn set_clear_color(&mut self, color: [f32; 4]);

    fn clear(&mut self, flags: ClearFlags);

    fn color_mask(&mut self, attachment: u8, enabled: bool);

    fn bind_texture(&mut self, slot: u32, texture: TextureId);

    fn use_program(&mut self, program: ProgramId);

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue);

    fn draw_mesh(&mut self, mesh: MeshId);

    /// Resizes the default (visible) target.
    fn resize_screen(&mut self, width: u32, height: u32);

    /// Submits everything recorded since the last call.
    fn end_frame(&mut self);
}
