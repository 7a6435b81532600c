//! GPU textures owned by the pipeline.
//!
//! [`TextureResource`] wraps a device texture together with the configuration
//! it was created from. The family covers sampled images loaded from storage,
//! single- and multi-sample color attachments, single-channel ("mono")
//! attachments, depth attachments and cubemaps.
//!
//! A texture's format and sampling state only change through an explicit
//! [`set_config`](TextureResource::set_config) followed by
//! [`resize`](TextureResource::resize). Binding to a texture slot is scratch
//! state for the next draw and is not remembered by the texture.

use std::path::Path;

use crate::{
    gpu::{
        AttachedImage, FilterMode, GpuDevice, GpuTexture, SamplerDesc, TextureDesc,
        TextureDimension, TextureFormat, TextureId, WrapMode,
    },
    resources::texture::{ImageData, load_image, mip_chain, mip_level_count},
};

/// What a sampled texture means to the shading programs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TextureSemantic {
    Diffuse,
    Specular,
    Normal,
    Albedo,
    Metallic,
    Roughness,
    Ao,
}

impl TextureSemantic {
    /// Maps that only make sense for physically based shading.
    pub fn is_pbr(&self) -> bool {
        matches!(
            self,
            TextureSemantic::Albedo
                | TextureSemantic::Metallic
                | TextureSemantic::Roughness
                | TextureSemantic::Ao
        )
    }
}

/// Channel of a packed texture that carries a scalar map (e.g. metallic in blue).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ColorChannel {
    #[default]
    None,
    Red,
    Green,
    Blue,
    Alpha,
}

impl ColorChannel {
    /// RGB selector sent to the shaders. Alpha and `None` select nothing.
    pub fn one_hot(&self) -> [f32; 3] {
        match self {
            ColorChannel::Red => [1.0, 0.0, 0.0],
            ColorChannel::Green => [0.0, 1.0, 0.0],
            ColorChannel::Blue => [0.0, 0.0, 1.0],
            ColorChannel::None | ColorChannel::Alpha => [0.0; 3],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// Sampled image uploaded from the CPU.
    Image,
    ColorAttachment,
    MultisampleAttachment,
    MonoAttachment,
    DepthAttachment,
    CubeMap,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureConfig {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: Option<FilterMode>,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub wrap_r: WrapMode,
    /// Allocate (and for images, fill) a mip chain.
    pub gen_mipmap: bool,
    /// Caps the mip chain, `None` means the full chain down to 1x1.
    pub mip_levels: Option<u32>,
    /// Sample count of multisample attachments.
    pub msaa_multiplier: u32,
    pub srgb: bool,
    pub hdr: bool,
    /// Flip loaded images vertically.
    pub flip: bool,
    pub associated_channel: ColorChannel,
    /// Overrides the format derived from `hdr`/`srgb`.
    pub format: Option<TextureFormat>,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: Some(FilterMode::Linear),
            wrap_s: WrapMode::Repeat,
            wrap_t: WrapMode::Repeat,
            wrap_r: WrapMode::Repeat,
            gen_mipmap: false,
            mip_levels: None,
            msaa_multiplier: 4,
            srgb: true,
            hdr: false,
            flip: true,
            associated_channel: ColorChannel::None,
            format: None,
        }
    }
}

impl TextureConfig {
    /// Render attachment defaults: linear, no mips, clamped.
    pub fn attachment() -> Self {
        Self {
            mipmap_filter: None,
            wrap_s: WrapMode::ClampToEdge,
            wrap_t: WrapMode::ClampToEdge,
            wrap_r: WrapMode::ClampToEdge,
            srgb: false,
            flip: false,
            ..Default::default()
        }
    }

    pub fn nearest(mut self) -> Self {
        self.mag_filter = FilterMode::Nearest;
        self.min_filter = FilterMode::Nearest;
        self.mipmap_filter = None;
        self
    }

    pub fn clamped(mut self) -> Self {
        self.wrap_s = WrapMode::ClampToEdge;
        self.wrap_t = WrapMode::ClampToEdge;
        self.wrap_r = WrapMode::ClampToEdge;
        self
    }

    fn sampler(&self, compare: bool) -> SamplerDesc {
        SamplerDesc {
            mag_filter: self.mag_filter,
            min_filter: self.min_filter,
            mipmap_filter: self.mipmap_filter,
            wrap_s: self.wrap_s,
            wrap_t: self.wrap_t,
            wrap_r: self.wrap_r,
            compare,
        }
    }
}

/// An owned GPU image plus the configuration it was built from.
#[derive(Debug)]
pub struct TextureResource {
    kind: TextureKind,
    label: String,
    config: TextureConfig,
    desc: TextureDesc,
    usable: bool,
    handle: GpuTexture,
}

impl TextureResource {
    fn allocate(
        gpu: &mut impl GpuDevice,
        kind: TextureKind,
        label: &str,
        width: u32,
        height: u32,
        config: TextureConfig,
    ) -> Self {
        let desc = describe(kind, label, width, height, &config);
        let id = gpu.create_texture(&desc);
        Self {
            kind,
            label: label.to_string(),
            config,
            desc,
            usable: true,
            handle: GpuTexture::new(id, gpu.releaser()),
        }
    }

    pub fn color_attachment(
        gpu: &mut impl GpuDevice,
        label: &str,
        width: u32,
        height: u32,
        config: TextureConfig,
    ) -> Self {
        Self::allocate(gpu, TextureKind::ColorAttachment, label, width, height, config)
    }

    /// Sample count comes from `config.msaa_multiplier`.
    pub fn multisample_attachment(
        gpu: &mut impl GpuDevice,
        label: &str,
        width: u32,
        height: u32,
        config: TextureConfig,
    ) -> Self {
        Self::allocate(gpu, TextureKind::MultisampleAttachment, label, width, height, config)
    }

    pub fn mono_attachment(gpu: &mut impl GpuDevice, label: &str, width: u32, height: u32) -> Self {
        let config = TextureConfig::attachment().nearest();
        Self::allocate(gpu, TextureKind::MonoAttachment, label, width, height, config)
    }

    /// Depth texture sampled with comparison, used for shadow maps.
    pub fn depth_attachment(gpu: &mut impl GpuDevice, label: &str, width: u32, height: u32) -> Self {
        let mut config = TextureConfig::attachment().nearest();
        config.wrap_s = WrapMode::ClampToBorder;
        config.wrap_t = WrapMode::ClampToBorder;
        Self::allocate(gpu, TextureKind::DepthAttachment, label, width, height, config)
    }

    pub fn cube_map(gpu: &mut impl GpuDevice, label: &str, size: u32, config: TextureConfig) -> Self {
        Self::allocate(gpu, TextureKind::CubeMap, label, size, size, config)
    }

    /// Uploads `image` (and its mip chain when the config asks for one).
    pub fn from_image(
        gpu: &mut impl GpuDevice,
        label: &str,
        image: &ImageData,
        mut config: TextureConfig,
    ) -> Self {
        config.hdr |= image.is_hdr();
        let texture = Self::allocate(
            gpu,
            TextureKind::Image,
            label,
            image.width(),
            image.height(),
            config,
        );
        let upload = if texture.config.hdr {
            image.to_half()
        } else {
            image.clone()
        };
        for (level, mip) in mip_chain(&upload, texture.desc.mip_levels)
            .iter()
            .enumerate()
        {
            gpu.upload_texture(texture.id(), 0, level as u32, mip);
        }
        texture
    }

    /// Loads an image file. Failures are logged and yield an allocated but unusable texture.
    pub fn from_path(gpu: &mut impl GpuDevice, path: impl AsRef<Path>, config: TextureConfig) -> Self {
        let path = path.as_ref();
        let label = path.display().to_string();
        let mut config = config;
        // Files always get a mip chain.
        config.gen_mipmap = true;
        match load_image(path, config.flip) {
            Ok(image) => Self::from_image(gpu, &label, &image, config),
            Err(e) => {
                log::error!("Texture failed to load at path {label}: {e:#}");
                let mut texture = Self::allocate(gpu, TextureKind::Image, &label, 1, 1, config);
                texture.usable = false;
                texture
            }
        }
    }

    pub fn id(&self) -> TextureId {
        self.handle.id()
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    pub fn samples(&self) -> u32 {
        self.desc.samples
    }

    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn config(&self) -> &TextureConfig {
        &self.config
    }

    /// `false` if the backing image could not be loaded.
    pub fn is_usable(&self) -> bool {
        self.usable
    }

    pub fn mip_extent(&self, level: u32) -> (u32, u32) {
        self.desc.mip_extent(level)
    }

    /// Stores a new configuration. Takes effect on the next [`resize`](Self::resize).
    pub fn set_config(&mut self, config: TextureConfig) {
        self.config = config;
    }

    /// Reallocates backing storage with the current configuration.
    pub fn resize(&mut self, gpu: &mut impl GpuDevice, width: u32, height: u32) {
        let (width, height) = match self.kind {
            TextureKind::CubeMap => (width.max(height), width.max(height)),
            _ => (width, height),
        };
        self.desc = describe(self.kind, &self.label, width, height, &self.config);
        gpu.resize_texture(self.id(), &self.desc);
    }

    /// Binds the texture to `slot` for the next draw.
    pub fn bind_to(&self, gpu: &mut impl GpuDevice, slot: u32) {
        gpu.bind_texture(slot, self.id());
    }

    /// Attachable image of a cube `face` (ignored for 2D textures) at `mip`.
    pub fn image(&self, face: u32, mip: u32) -> AttachedImage {
        AttachedImage::Texture {
            id: self.id(),
            layer: match self.kind {
                TextureKind::CubeMap => face.min(5),
                _ => 0,
            },
            mip,
        }
    }
}

fn describe(kind: TextureKind, label: &str, width: u32, height: u32, config: &TextureConfig) -> TextureDesc {
    let color_format = if config.hdr {
        TextureFormat::Rgba16Float
    } else if config.srgb {
        TextureFormat::Rgba8UnormSrgb
    } else {
        TextureFormat::Rgba8Unorm
    };
    let format = config.format.unwrap_or(match kind {
        TextureKind::MonoAttachment => TextureFormat::R16Float,
        TextureKind::DepthAttachment => TextureFormat::Depth32Float,
        TextureKind::CubeMap => TextureFormat::Rgba16Float,
        TextureKind::Image | TextureKind::ColorAttachment | TextureKind::MultisampleAttachment => {
            color_format
        }
    });
    let samples = match kind {
        TextureKind::MultisampleAttachment => config.msaa_multiplier.max(1),
        _ => 1,
    };
    let full_chain = mip_level_count(width, height);
    let mip_levels = if config.gen_mipmap && samples == 1 {
        config.mip_levels.unwrap_or(full_chain).clamp(1, full_chain)
    } else {
        1
    };
    TextureDesc {
        label: label.to_string(),
        dimension: match kind {
            TextureKind::CubeMap => TextureDimension::Cube,
            _ => TextureDimension::D2,
        },
        width: width.max(1),
        height: height.max(1),
        format,
        samples,
        mip_levels,
        sampler: config.sampler(kind == TextureKind::DepthAttachment),
    }
}
