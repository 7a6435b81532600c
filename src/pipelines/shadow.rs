//! Directional shadow map pass.

use cgmath::{Matrix4, Point3, Vector3, ortho};

use crate::{
    camera::to_clip_space,
    context::Context,
    data_structures::{render_target::RenderTarget, texture::TextureResource},
    gpu::{AttachmentPoint, ClearFlags, ClipSpace, DepthFunc, GpuDevice},
};

use super::light::sun_eye;

/// Half extent of the orthographic light frustum.
pub const SHADOW_EXTENT: f32 = 20.0;
pub const SHADOW_NEAR: f32 = 1.0;
pub const SHADOW_FAR: f32 = 27.5;

/// View-projection of the sun for a light shining along `direction`.
pub fn light_space_matrix(direction: Vector3<f32>, clip: ClipSpace) -> Matrix4<f32> {
    let projection = ortho(
        -SHADOW_EXTENT,
        SHADOW_EXTENT,
        -SHADOW_EXTENT,
        SHADOW_EXTENT,
        SHADOW_NEAR,
        SHADOW_FAR,
    );
    let view = Matrix4::look_at_rh(sun_eye(direction), Point3::new(0.0, 0.0, 0.0), Vector3::unit_y());
    to_clip_space(projection, clip) * view
}

pub struct ShadowPass {
    pub target: RenderTarget,
    pub map: TextureResource,
}

impl ShadowPass {
    pub fn new(gpu: &mut impl GpuDevice, width: u32, height: u32) -> Self {
        let map = TextureResource::depth_attachment(gpu, "shadow_map", width, height);
        let mut target = RenderTarget::new(gpu, "shadow");
        target.attach_texture(gpu, AttachmentPoint::Depth, &map);
        target.set_draw_buffers(gpu, &[]);
        Self { target, map }
    }

    pub fn resize(&mut self, gpu: &mut impl GpuDevice, width: u32, height: u32) {
        self.map.resize(gpu, width, height);
        self.target.check(&*gpu);
        log::debug!("Shadow map resized to {width}x{height}");
    }
}

impl<D: GpuDevice> Context<D> {
    pub(crate) fn shadow_pass(&mut self) {
        let gpu = &mut self.gpu;
        gpu.viewport(self.shadow.map.width(), self.shadow.map.height());
        gpu.set_depth_test(true);
        gpu.set_depth_func(DepthFunc::Less);
        self.shadow.target.bind(gpu);
        gpu.clear(ClearFlags::DEPTH);

        let enabled = self.config.shadows;
        for shader in [self.shaders.phong, self.shaders.light_pass, self.shaders.pbr] {
            shader.set_bool(gpu, "hasShadow", enabled);
        }
        if !enabled {
            return;
        }

        let light_space = light_space_matrix(self.lights.sun().direction, gpu.clip_space());
        self.frame.light_space = light_space;
        let shader = self.shaders.shadow;
        shader.use_program(gpu);
        shader.set_mat4(gpu, "lightSpaceMatrix", light_space);
        self.render_scenes_depth(shader);
    }
}
