//! Deferred G-buffer fill.

use crate::{
    context::Context,
    gpu::{ClearFlags, DepthFunc, GpuDevice},
};

use super::{backbuffer::send_phong_frame_uniforms, scene::SceneShading};

impl<D: GpuDevice> Context<D> {
    pub(crate) fn geometry_pass(&mut self) {
        let gpu = &mut self.gpu;
        let shader = self.shaders.gbuffer;

        self.gbuffer.target.bind(gpu);
        gpu.viewport(self.config.render_width, self.config.render_height);
        gpu.set_depth_test(true);
        gpu.set_depth_func(DepthFunc::Less);
        gpu.set_clear_color([0.0, 0.0, 0.0, 1.0]);
        gpu.clear(ClearFlags::COLOR_DEPTH);

        send_phong_frame_uniforms(gpu, &shader, &self.frame, self.config.shadows);
        self.render_scenes(SceneShading::GBuffer);
    }
}
