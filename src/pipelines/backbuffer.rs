//! The lit scene pass into the offscreen (HDR) target.
//!
//! Forward mode draws the scenes directly, deferred mode shades a full-screen
//! quad from the G-buffer and then copies the G-buffer depth so the skybox and
//! light cubes still depth test against the scene. With MSAA (forward only)
//! everything lands in the multisample target first and is resolved at the end.

use cgmath::{Matrix3, Matrix4};

use crate::{
    config::EngineConfig,
    context::Context,
    data_structures::{
        render_target::{RenderBuffer, RenderTarget},
        texture::{TextureConfig, TextureResource},
    },
    gpu::{AttachmentPoint, ClearFlags, DepthFunc, GpuDevice},
};

use super::{
    Shader,
    light::{render_light_cubes, send_light_pbr_uniforms, send_light_uniforms},
    scene::SceneShading,
    slots::{self, deferred, pbr, phong},
};

/// Per-frame camera and light matrices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameMatrices {
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub light_space: Matrix4<f32>,
    pub view_position: cgmath::Vector3<f32>,
}

impl Default for FrameMatrices {
    fn default() -> Self {
        use cgmath::SquareMatrix;
        Self {
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
            light_space: Matrix4::identity(),
            view_position: cgmath::Vector3::new(0.0, 0.0, 0.0),
        }
    }
}

/// Sampler uniforms and view data of the forward Phong and G-buffer programs.
pub fn send_phong_frame_uniforms(gpu: &mut impl GpuDevice, shader: &Shader, frame: &FrameMatrices, shadows: bool) {
    shader.set_bool(gpu, "deferred", false);
    shader.set_mat4(gpu, "view", frame.view);
    shader.set_mat4(gpu, "projection", frame.projection);
    shader.set_vec3(gpu, "viewPos", frame.view_position);
    shader.set_bool(gpu, "hasShadow", shadows);
    shader.set_mat4(gpu, "lightSpaceMatrix", frame.light_space);
    shader.set_slot(gpu, "materialMaps.diffuse", phong::DIFFUSE);
    shader.set_slot(gpu, "materialMaps.specular", phong::SPECULAR);
    shader.set_slot(gpu, "materialMaps.shadow", phong::SHADOW);
    shader.set_slot(gpu, "materialMaps.normal", phong::NORMAL);
}

pub fn send_pbr_frame_uniforms(
    gpu: &mut impl GpuDevice,
    shader: &Shader,
    frame: &FrameMatrices,
    shadows: bool,
    has_ibl_maps: bool,
) {
    shader.set_bool(gpu, "deferred", false);
    shader.set_mat4(gpu, "view", frame.view);
    shader.set_mat4(gpu, "projection", frame.projection);
    shader.set_vec3(gpu, "camPos", frame.view_position);
    shader.set_mat4(gpu, "lightSpaceMatrix", frame.light_space);
    shader.set_bool(gpu, "gammaCorrect", false);
    shader.set_bool(gpu, "hasIBLMaps", has_ibl_maps);
    shader.set_slot(gpu, "materialMaps.albedoMap", pbr::ALBEDO);
    shader.set_slot(gpu, "materialMaps.normalMap", pbr::NORMAL);
    shader.set_slot(gpu, "materialMaps.roughnessMap", pbr::ROUGHNESS);
    shader.set_slot(gpu, "materialMaps.metallicMap", pbr::METALLIC);
    shader.set_slot(gpu, "materialMaps.aoMap", pbr::AO);
    shader.set_slot(gpu, "irradianceMap", pbr::IRRADIANCE);
    shader.set_slot(gpu, "prefilterMap", pbr::PREFILTER);
    shader.set_slot(gpu, "brdfLUT", pbr::BRDF_LUT);
    shader.set_bool(gpu, "hasShadow", shadows);
    shader.set_slot(gpu, "shadowMap", pbr::SHADOW);
}

/// Uniforms of the deferred lighting quad. Material maps are parked on an unused unit.
pub fn send_light_pass_uniforms(
    gpu: &mut impl GpuDevice,
    shader: &Shader,
    frame: &FrameMatrices,
    shadows: bool,
    ssao: bool,
) {
    shader.set_bool(gpu, "deferred", true);
    shader.set_vec3(gpu, "viewPos", frame.view_position);
    shader.set_bool(gpu, "hasShadow", shadows);
    shader.set_bool(gpu, "hasSsao", ssao);
    shader.set_slot(gpu, "materialMaps.diffuse", deferred::UNBOUND);
    shader.set_slot(gpu, "materialMaps.specular", deferred::UNBOUND);
    shader.set_slot(gpu, "materialMaps.normal", deferred::UNBOUND);
    shader.set_slot(gpu, "materialMaps.shadow", phong::SHADOW);
    shader.set_slot(gpu, "deferredMaps.gPosition", deferred::POSITION);
    shader.set_slot(gpu, "deferredMaps.gNormal", deferred::NORMAL);
    shader.set_slot(gpu, "deferredMaps.gAlbedoSpec", deferred::ALBEDO_SPEC);
    shader.set_slot(gpu, "deferredMaps.gPositionLightSpace", deferred::POSITION_LIGHT_SPACE);
    shader.set_slot(gpu, "deferredMaps.ssao", deferred::SSAO);
}

fn color_config(config: &EngineConfig) -> TextureConfig {
    let mut color = TextureConfig::attachment();
    color.hdr = config.hdr;
    color.msaa_multiplier = config.msaa_samples();
    color
}

/// The offscreen scene target (color + bright color + depth) and its multisample twin.
pub struct Offscreen {
    pub target: RenderTarget,
    pub scene: TextureResource,
    /// Over-threshold luminance written by the lighting programs, input of bloom.
    pub bright: TextureResource,
    pub depth: RenderBuffer,
    pub msaa_target: RenderTarget,
    pub msaa_scene: TextureResource,
    pub msaa_bright: TextureResource,
    pub msaa_depth: RenderBuffer,
}

impl Offscreen {
    pub fn new(gpu: &mut impl GpuDevice, config: &EngineConfig) -> Self {
        let (w, h) = (config.render_width, config.render_height);
        let samples = config.msaa_samples();
        let color = color_config(config);

        let scene = TextureResource::color_attachment(gpu, "offscreen_scene", w, h, color.clone());
        let bright = TextureResource::color_attachment(gpu, "offscreen_bright", w, h, color.clone());
        let depth = RenderBuffer::depth(gpu, "offscreen_depth", w, h, 1);
        let mut target = RenderTarget::new(gpu, "offscreen");
        target.attach_texture(gpu, AttachmentPoint::Color(0), &scene);
        target.attach_texture(gpu, AttachmentPoint::Color(1), &bright);
        target.attach_render_buffer(gpu, AttachmentPoint::Depth, &depth);
        target.set_draw_buffers(gpu, &[AttachmentPoint::Color(0), AttachmentPoint::Color(1)]);

        let msaa_scene = TextureResource::multisample_attachment(gpu, "offscreen_msaa_scene", w, h, color.clone());
        let msaa_bright = TextureResource::multisample_attachment(gpu, "offscreen_msaa_bright", w, h, color);
        let msaa_depth = RenderBuffer::depth(gpu, "offscreen_msaa_depth", w, h, samples);
        let mut msaa_target = RenderTarget::new(gpu, "offscreen_msaa");
        msaa_target.attach_texture(gpu, AttachmentPoint::Color(0), &msaa_scene);
        msaa_target.attach_texture(gpu, AttachmentPoint::Color(1), &msaa_bright);
        msaa_target.attach_render_buffer(gpu, AttachmentPoint::Depth, &msaa_depth);
        msaa_target.set_draw_buffers(gpu, &[AttachmentPoint::Color(0), AttachmentPoint::Color(1)]);

        Self {
            target,
            scene,
            bright,
            depth,
            msaa_target,
            msaa_scene,
            msaa_bright,
            msaa_depth,
        }
    }

    /// Rebuilds every buffer for the current resolution, sample count and HDR mode.
    pub fn regenerate(&mut self, gpu: &mut impl GpuDevice, config: &EngineConfig) {
        let (w, h) = (config.render_width, config.render_height);
        let color = color_config(config);
        for texture in [&mut self.scene, &mut self.bright, &mut self.msaa_scene, &mut self.msaa_bright] {
            texture.set_config(color.clone());
            texture.resize(gpu, w, h);
        }
        self.depth.resize(gpu, w, h);
        self.msaa_depth.set_samples(config.msaa_samples());
        self.msaa_depth.resize(gpu, w, h);
        self.target.check(&*gpu);
        self.msaa_target.check(&*gpu);
    }
}

/// MSAA only applies to forward rendering.
pub fn uses_msaa(config: &EngineConfig) -> bool {
    config.msaa && !config.deferred
}

impl<D: GpuDevice> Context<D> {
    pub(crate) fn backbuffer_pass(&mut self) {
        let (w, h) = (self.config.render_width, self.config.render_height);
        let msaa = uses_msaa(&self.config);
        let shadows = self.config.shadows;
        let frame = self.frame;

        let gpu = &mut self.gpu;
        if msaa {
            self.offscreen.msaa_target.bind(gpu);
        } else {
            self.offscreen.target.bind(gpu);
        }
        gpu.viewport(w, h);
        gpu.set_depth_test(true);
        gpu.set_depth_func(DepthFunc::Less);
        gpu.set_clear_color([0.0, 0.0, 0.0, 1.0]);
        gpu.clear(ClearFlags::COLOR_DEPTH);

        if self.config.deferred {
            self.deferred_lighting(&frame, shadows);
        } else if self.config.pbr {
            let has_ibl = self.ibl.has_maps();
            let gpu = &mut self.gpu;
            send_pbr_frame_uniforms(gpu, &self.shaders.pbr, &frame, shadows, has_ibl);
            send_light_pbr_uniforms(gpu, &self.shaders.pbr, &self.lights);
            send_phong_frame_uniforms(gpu, &self.shaders.phong, &frame, shadows);
            send_light_uniforms(gpu, &self.shaders.phong, &self.lights, self.config.blinn);
            self.render_scenes(SceneShading::Forward { pbr: true });
        } else {
            let gpu = &mut self.gpu;
            send_phong_frame_uniforms(gpu, &self.shaders.phong, &frame, shadows);
            send_light_uniforms(gpu, &self.shaders.phong, &self.lights, self.config.blinn);
            self.render_scenes(SceneShading::Forward { pbr: false });
        }

        self.render_skybox(&frame);

        if self.config.debug_lights {
            render_light_cubes(
                &mut self.gpu,
                &self.shaders.light_cube,
                &self.shapes.cube,
                &self.lights,
                frame.view,
                frame.projection,
            );
        }

        if msaa {
            self.offscreen.msaa_target.blit_to(&mut self.gpu, &self.offscreen.target, w, h);
        }
    }

    fn deferred_lighting(&mut self, frame: &FrameMatrices, shadows: bool) {
        let (w, h) = (self.config.render_width, self.config.render_height);
        let ssao = self.config.ssao;
        let shader = self.shaders.light_pass;
        let gpu = &mut self.gpu;

        shader.use_program(gpu);
        self.gbuffer.bind_textures(gpu);
        self.shadow.map.bind_to(gpu, phong::SHADOW);
        if ssao {
            self.ssao.output().bind_to(gpu, deferred::SSAO);
        }
        send_light_pass_uniforms(gpu, &shader, frame, shadows, ssao);
        send_light_uniforms(gpu, &shader, &self.lights, self.config.blinn);

        gpu.set_depth_test(false);
        gpu.draw_mesh(self.shapes.quad.id());
        gpu.set_depth_test(true);

        self.gbuffer.target.blit_depth_to(gpu, &self.offscreen.target, w, h);
    }

    /// Environment cube behind everything, kept out of the bright buffer.
    fn render_skybox(&mut self, frame: &FrameMatrices) {
        let Some(environment) = self.ibl.environment.as_ref() else {
            log::trace!("No environment map, skybox skipped");
            return;
        };
        let gpu = &mut self.gpu;
        let shader = self.shaders.skybox;
        // Drop the translation so the sky stays at infinity.
        let rotation = Matrix4::from(Matrix3::from_cols(
            frame.view.x.truncate(),
            frame.view.y.truncate(),
            frame.view.z.truncate(),
        ));

        gpu.color_mask(1, false);
        gpu.set_depth_func(DepthFunc::LessEqual);
        shader.use_program(gpu);
        shader.set_slot(gpu, "envMap", slots::SKYBOX);
        shader.set_mat4(gpu, "view", rotation);
        shader.set_mat4(gpu, "projection", frame.projection);
        environment.bind_to(gpu, slots::SKYBOX);
        gpu.draw_mesh(self.shapes.cube.id());
        gpu.set_depth_func(DepthFunc::Less);
        gpu.color_mask(1, true);
    }
}
