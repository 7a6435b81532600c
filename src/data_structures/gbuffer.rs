//! Geometry buffer for deferred shading.

use crate::{
    data_structures::{
        render_target::{RenderBuffer, RenderTarget},
        texture::{TextureConfig, TextureResource},
    },
    gpu::{AttachmentPoint, GpuDevice, TextureFormat},
    pipelines::slots,
};

/// Position, normal, albedo+specular and light-space position, plus depth.
#[derive(Debug)]
pub struct GBuffer {
    pub target: RenderTarget,
    pub position: TextureResource,
    pub normal: TextureResource,
    pub albedo_spec: TextureResource,
    pub position_light_space: TextureResource,
    pub depth: RenderBuffer,
}

impl GBuffer {
    pub fn new(gpu: &mut impl GpuDevice, width: u32, height: u32) -> Self {
        let float = TextureConfig {
            format: Some(TextureFormat::Rgba16Float),
            ..TextureConfig::attachment().nearest()
        };
        let position = TextureResource::color_attachment(gpu, "gPosition", width, height, float.clone());
        let normal = TextureResource::color_attachment(gpu, "gNormal", width, height, float.clone());
        let albedo_spec = TextureResource::color_attachment(
            gpu,
            "gAlbedoSpec",
            width,
            height,
            TextureConfig {
                format: Some(TextureFormat::Rgba8Unorm),
                ..TextureConfig::attachment().nearest()
            },
        );
        let position_light_space =
            TextureResource::color_attachment(gpu, "gPositionLightSpace", width, height, float);
        let depth = RenderBuffer::depth(gpu, "gDepth", width, height, 1);

        let mut target = RenderTarget::new(gpu, "G-buffer");
        target.attach_texture(gpu, AttachmentPoint::Color(0), &position);
        target.attach_texture(gpu, AttachmentPoint::Color(1), &normal);
        target.attach_texture(gpu, AttachmentPoint::Color(2), &albedo_spec);
        target.attach_texture(gpu, AttachmentPoint::Color(3), &position_light_space);
        target.attach_render_buffer(gpu, AttachmentPoint::Depth, &depth);
        target.set_draw_buffers(
            gpu,
            &[
                AttachmentPoint::Color(0),
                AttachmentPoint::Color(1),
                AttachmentPoint::Color(2),
                AttachmentPoint::Color(3),
            ],
        );

        Self {
            target,
            position,
            normal,
            albedo_spec,
            position_light_space,
            depth,
        }
    }

    pub fn resize(&mut self, gpu: &mut impl GpuDevice, width: u32, height: u32) {
        self.position.resize(gpu, width, height);
        self.normal.resize(gpu, width, height);
        self.albedo_spec.resize(gpu, width, height);
        self.position_light_space.resize(gpu, width, height);
        self.depth.resize(gpu, width, height);
        self.target.check(&*gpu);
    }

    /// Binds every geometry texture to its deferred-lighting slot.
    pub fn bind_textures(&self, gpu: &mut impl GpuDevice) {
        self.position.bind_to(gpu, slots::deferred::POSITION);
        self.normal.bind_to(gpu, slots::deferred::NORMAL);
        self.albedo_spec.bind_to(gpu, slots::deferred::ALBEDO_SPEC);
        self.position_light_space
            .bind_to(gpu, slots::deferred::POSITION_LIGHT_SPACE);
    }
}
