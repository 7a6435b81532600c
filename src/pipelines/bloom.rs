//! Ping-pong Gaussian blur of the bright buffer.

use crate::{
    config::EngineConfig,
    context::Context,
    data_structures::{render_target::RenderTarget, texture::{TextureConfig, TextureResource}},
    gpu::{AttachmentPoint, ClearFlags, GpuDevice},
};

use super::slots;

/// Blur passes per frame, alternating horizontal and vertical.
pub const BLOOM_ITERATIONS: u32 = 10;

pub struct BlurTarget {
    pub target: RenderTarget,
    pub texture: TextureResource,
}

impl BlurTarget {
    fn new(gpu: &mut impl GpuDevice, label: &str, config: &EngineConfig) -> Self {
        let texture = TextureResource::color_attachment(
            gpu,
            label,
            config.render_width,
            config.render_height,
            blur_config(config),
        );
        let mut target = RenderTarget::new(gpu, label);
        target.attach_texture(gpu, AttachmentPoint::Color(0), &texture);
        target.set_draw_buffers(gpu, &[AttachmentPoint::Color(0)]);
        Self { target, texture }
    }
}

fn blur_config(config: &EngineConfig) -> TextureConfig {
    let mut blur = TextureConfig::attachment();
    blur.hdr = config.hdr;
    blur
}

pub struct BloomPass {
    pub horizontal: BlurTarget,
    pub vertical: BlurTarget,
}

impl BloomPass {
    pub fn new(gpu: &mut impl GpuDevice, config: &EngineConfig) -> Self {
        let mut bloom = Self {
            horizontal: BlurTarget::new(gpu, "bloom_horizontal", config),
            vertical: BlurTarget::new(gpu, "bloom_vertical", config),
        };
        if !config.bloom {
            bloom.clear(gpu);
        }
        bloom
    }

    /// Resizes both buffers. With bloom off they are cleared so the composite adds nothing.
    pub fn regenerate(&mut self, gpu: &mut impl GpuDevice, config: &EngineConfig) {
        for blur in [&mut self.horizontal, &mut self.vertical] {
            blur.texture.set_config(blur_config(config));
            blur.texture.resize(gpu, config.render_width, config.render_height);
            blur.target.check(&*gpu);
        }
        if !config.bloom {
            self.clear(gpu);
        }
    }

    fn clear(&mut self, gpu: &mut impl GpuDevice) {
        gpu.set_clear_color([0.0, 0.0, 0.0, 1.0]);
        for blur in [&mut self.horizontal, &mut self.vertical] {
            blur.target.bind(gpu);
            gpu.clear(ClearFlags::COLOR);
        }
    }

    /// Texture the composite samples. The last iteration is always vertical.
    pub fn output(&self) -> &TextureResource {
        &self.vertical.texture
    }
}

impl<D: GpuDevice> Context<D> {
    /// Returns the number of blur iterations run.
    pub(crate) fn bloom_pass(&mut self) -> u32 {
        if !self.config.bloom {
            return 0;
        }
        let gpu = &mut self.gpu;
        let shader = self.shaders.blur;
        gpu.viewport(self.config.render_width, self.config.render_height);
        gpu.set_depth_test(false);
        shader.use_program(gpu);

        let mut horizontal = true;
        for i in 0..BLOOM_ITERATIONS {
            let (dst, src) = if horizontal {
                let src = if i == 0 { &self.offscreen.bright } else { &self.bloom.vertical.texture };
                (&mut self.bloom.horizontal.target, src)
            } else {
                (&mut self.bloom.vertical.target, &self.bloom.horizontal.texture)
            };
            dst.bind(gpu);
            shader.set_bool(gpu, "horizontal", horizontal);
            src.bind_to(gpu, slots::SOURCE);
            gpu.draw_mesh(self.shapes.quad.id());
            horizontal = !horizontal;
        }
        BLOOM_ITERATIONS
    }
}
