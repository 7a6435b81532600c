//! Final composite onto the visible target.

use crate::{
    context::Context,
    gpu::{ClearFlags, FramebufferTarget, GpuDevice},
};

use super::slots::postprocess;

impl<D: GpuDevice> Context<D> {
    /// Tone mapping, bloom add, gamma and the screen-space filters in one quad.
    pub(crate) fn postprocess_pass(&mut self) {
        let config = &self.config;
        let gpu = &mut self.gpu;
        let shader = self.shaders.postprocess;

        gpu.bind_framebuffer(FramebufferTarget::Default);
        gpu.viewport(config.screen_width, config.screen_height);
        gpu.set_depth_test(false);
        gpu.set_clear_color([1.0, 1.0, 1.0, 1.0]);
        gpu.clear(ClearFlags::COLOR);

        shader.use_program(gpu);
        shader.set_slot(gpu, "screenTexture", postprocess::SCREEN);
        shader.set_slot(gpu, "bloomTexture", postprocess::BLOOM);
        shader.set_bool(gpu, "gamma", true);
        shader.set_bool(gpu, "hdr", config.hdr);
        shader.set_bool(gpu, "bloom", config.bloom);
        shader.set_float(gpu, "exposure", config.exposure);
        shader.set_bool(gpu, "sharpen", config.sharpen);
        shader.set_float(gpu, "sharpness", config.sharpness);
        shader.set_bool(gpu, "blur", config.blur);
        shader.set_bool(gpu, "grayscale", config.grayscale);

        self.offscreen.scene.bind_to(gpu, postprocess::SCREEN);
        self.bloom.output().bind_to(gpu, postprocess::BLOOM);
        gpu.draw_mesh(self.shapes.quad.id());
    }
}
