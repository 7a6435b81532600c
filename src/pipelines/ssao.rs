//! Screen-space ambient occlusion over the G-buffer.
//!
//! Kernel and rotation noise are generated once from a fixed seed so frames
//! are reproducible. The occlusion term is blurred and fed to the deferred
//! lighting pass.

use cgmath::{InnerSpace, Vector3};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    context::Context,
    data_structures::{
        render_target::RenderTarget,
        texture::{TextureConfig, TextureResource},
    },
    gpu::{AttachmentPoint, ClearFlags, GpuDevice},
    resources::texture::ImageData,
};

use super::{Shader, programs::SSAO_KERNEL_SIZE, slots::ssao};

pub const SSAO_SEED: u64 = 0x5510;
/// Side of the square rotation noise texture.
pub const NOISE_SIZE: u32 = 4;

/// Hemisphere samples along +Z, denser close to the origin.
pub fn ssao_kernel(rng: &mut impl Rng) -> Vec<Vector3<f32>> {
    (0..SSAO_KERNEL_SIZE)
        .map(|i| {
            let sample = Vector3::new(
                rng.gen_range(0.0..1.0f32) * 2.0 - 1.0,
                rng.gen_range(0.0..1.0f32) * 2.0 - 1.0,
                rng.gen_range(0.0..1.0f32),
            );
            let sample = sample.normalize() * rng.gen_range(0.0..1.0f32);
            let t = i as f32 / SSAO_KERNEL_SIZE as f32;
            sample * (0.1 + t * t * 0.9)
        })
        .collect()
}

/// Random rotations around +Z, tiled over the screen.
pub fn ssao_noise(rng: &mut impl Rng) -> Vec<Vector3<f32>> {
    (0..NOISE_SIZE * NOISE_SIZE)
        .map(|_| {
            Vector3::new(
                rng.gen_range(0.0..1.0f32) * 2.0 - 1.0,
                rng.gen_range(0.0..1.0f32) * 2.0 - 1.0,
                0.0,
            )
        })
        .collect()
}

fn noise_texture(gpu: &mut impl GpuDevice, noise: &[Vector3<f32>]) -> TextureResource {
    let pixels = noise.iter().flat_map(|v| [v.x, v.y, v.z, 1.0]).collect();
    let image = ImageData::Rgba32F {
        width: NOISE_SIZE,
        height: NOISE_SIZE,
        pixels,
    };
    let config = TextureConfig {
        hdr: true,
        srgb: false,
        flip: false,
        ..TextureConfig::default().nearest()
    };
    TextureResource::from_image(gpu, "ssao_noise", &image, config)
}

fn occlusion_target(gpu: &mut impl GpuDevice, label: &str, width: u32, height: u32) -> (RenderTarget, TextureResource) {
    let texture = TextureResource::mono_attachment(gpu, label, width, height);
    let mut target = RenderTarget::new(gpu, label);
    target.attach_texture(gpu, AttachmentPoint::Color(0), &texture);
    target.set_draw_buffers(gpu, &[AttachmentPoint::Color(0)]);
    (target, texture)
}

pub struct SsaoPass {
    pub target: RenderTarget,
    pub occlusion: TextureResource,
    pub blur_target: RenderTarget,
    pub blurred: TextureResource,
    pub noise: TextureResource,
    kernel: Vec<Vector3<f32>>,
}

impl SsaoPass {
    /// Allocates the occlusion buffers and uploads the kernel to `shader`.
    pub fn new(gpu: &mut impl GpuDevice, shader: &Shader, width: u32, height: u32) -> Self {
        let mut rng = StdRng::seed_from_u64(SSAO_SEED);
        let kernel = ssao_kernel(&mut rng);
        let noise = noise_texture(gpu, &ssao_noise(&mut rng));
        let (target, occlusion) = occlusion_target(gpu, "ssao", width, height);
        let (blur_target, blurred) = occlusion_target(gpu, "ssao_blur", width, height);

        for (i, sample) in kernel.iter().enumerate() {
            shader.set_vec3(gpu, &format!("samples[{i}]"), *sample);
        }
        shader.set_slot(gpu, "gPosition", ssao::POSITION);
        shader.set_slot(gpu, "gNormal", ssao::NORMAL);
        shader.set_slot(gpu, "texNoise", ssao::NOISE);

        Self {
            target,
            occlusion,
            blur_target,
            blurred,
            noise,
            kernel,
        }
    }

    pub fn kernel(&self) -> &[Vector3<f32>] {
        &self.kernel
    }

    pub fn resize(&mut self, gpu: &mut impl GpuDevice, width: u32, height: u32) {
        self.occlusion.resize(gpu, width, height);
        self.blurred.resize(gpu, width, height);
        self.target.check(&*gpu);
        self.blur_target.check(&*gpu);
    }

    /// Blurred occlusion, what the lighting pass samples.
    pub fn output(&self) -> &TextureResource {
        &self.blurred
    }
}

impl<D: GpuDevice> Context<D> {
    pub(crate) fn ssao_pass(&mut self) {
        let (w, h) = (self.config.render_width, self.config.render_height);
        let gpu = &mut self.gpu;
        let quad = self.shapes.quad.id();
        gpu.viewport(w, h);
        gpu.set_depth_test(false);
        gpu.set_clear_color([1.0, 1.0, 1.0, 1.0]);

        let shader = self.shaders.ssao;
        self.ssao.target.bind(gpu);
        gpu.clear(ClearFlags::COLOR);
        shader.use_program(gpu);
        shader.set_mat4(gpu, "projection", self.frame.projection);
        let scale = Vector3::new(w as f32 / NOISE_SIZE as f32, h as f32 / NOISE_SIZE as f32, 1.0);
        shader.set_vec3(gpu, "noiseScale", scale);
        self.gbuffer.position.bind_to(gpu, ssao::POSITION);
        self.gbuffer.normal.bind_to(gpu, ssao::NORMAL);
        self.ssao.noise.bind_to(gpu, ssao::NOISE);
        gpu.draw_mesh(quad);

        let blur = self.shaders.ssao_blur;
        self.ssao.blur_target.bind(gpu);
        gpu.clear(ClearFlags::COLOR);
        blur.use_program(gpu);
        blur.set_slot(gpu, "ssaoInput", ssao::INPUT);
        self.ssao.occlusion.bind_to(gpu, ssao::INPUT);
        gpu.draw_mesh(quad);

        gpu.set_depth_test(true);
    }
}
