//! One-time image based lighting precompute.
//!
//! An equirectangular HDR environment is captured into a cube map, convolved
//! into a diffuse irradiance map, prefiltered per roughness level into a mip
//! chained specular map and complemented by the split-sum BRDF lookup table.
//! All captures render the unit cube from the origin with a 90 degree camera.

use std::path::Path;

use cgmath::{Deg, Matrix4, Point3, Vector3, perspective};

use crate::{
    camera::to_clip_space,
    context::Context,
    data_structures::{
        render_target::{RenderBuffer, RenderTarget},
        texture::{TextureConfig, TextureResource},
    },
    gpu::{AttachmentPoint, ClearFlags, ClipSpace, DepthFunc, GpuDevice, TextureFormat},
};

use super::{Shader, slots};

pub const ENVIRONMENT_SIZE: u32 = 1024;
pub const IRRADIANCE_SIZE: u32 = 64;
pub const PREFILTER_SIZE: u32 = 128;
pub const PREFILTER_MIP_LEVELS: u32 = 5;
pub const BRDF_LUT_SIZE: u32 = 1024;

/// Square 90 degree projection of the cube captures.
pub fn capture_projection(clip: ClipSpace) -> Matrix4<f32> {
    to_clip_space(perspective(Deg(90.0), 1.0, 0.1, 10.0), clip)
}

/// Views toward +X, -X, +Y, -Y, +Z, -Z, in cube face order.
pub fn capture_views() -> [Matrix4<f32>; 6] {
    let origin = Point3::new(0.0, 0.0, 0.0);
    let face = |dir: Vector3<f32>, up: Vector3<f32>| Matrix4::look_at_rh(origin, origin + dir, up);
    [
        face(Vector3::unit_x(), -Vector3::unit_y()),
        face(-Vector3::unit_x(), -Vector3::unit_y()),
        face(Vector3::unit_y(), Vector3::unit_z()),
        face(-Vector3::unit_y(), -Vector3::unit_z()),
        face(Vector3::unit_z(), -Vector3::unit_y()),
        face(-Vector3::unit_z(), -Vector3::unit_y()),
    ]
}

/// Roughness a prefilter mip is convolved for.
pub fn prefilter_roughness(mip: u32) -> f32 {
    mip as f32 / (PREFILTER_MIP_LEVELS - 1) as f32
}

/// Baked environment maps. Empty until [`Context::bake_environment`] succeeds.
#[derive(Debug, Default)]
pub struct IblMaps {
    pub environment: Option<TextureResource>,
    pub irradiance: Option<TextureResource>,
    pub prefilter: Option<TextureResource>,
    pub brdf_lut: Option<TextureResource>,
}

impl IblMaps {
    /// Whether the PBR program can sample the three lighting maps.
    pub fn has_maps(&self) -> bool {
        self.irradiance.is_some() && self.prefilter.is_some() && self.brdf_lut.is_some()
    }

    pub fn bind(&self, gpu: &mut impl GpuDevice) {
        for (map, slot) in [
            (&self.irradiance, slots::pbr::IRRADIANCE),
            (&self.prefilter, slots::pbr::PREFILTER),
            (&self.brdf_lut, slots::pbr::BRDF_LUT),
        ] {
            if let Some(map) = map {
                map.bind_to(gpu, slot);
            }
        }
    }
}

/// Framebuffer and depth storage reused by every capture.
pub struct CaptureTarget {
    pub target: RenderTarget,
    pub depth: RenderBuffer,
}

impl CaptureTarget {
    pub fn new(gpu: &mut impl GpuDevice) -> Self {
        let depth = RenderBuffer::depth(gpu, "capture_depth", ENVIRONMENT_SIZE, ENVIRONMENT_SIZE, 1);
        let mut target = RenderTarget::new(gpu, "capture");
        target.attach_render_buffer(gpu, AttachmentPoint::Depth, &depth);
        target.set_draw_buffers(gpu, &[AttachmentPoint::Color(0)]);
        Self { target, depth }
    }

    fn resize_depth(&mut self, gpu: &mut impl GpuDevice, size: u32) {
        if self.depth.width() != size || self.depth.height() != size {
            self.depth.resize(gpu, size, size);
        }
    }

    /// Renders `cube` once per face of `map` at `mip`.
    fn capture_faces(
        &mut self,
        gpu: &mut impl GpuDevice,
        shader: &Shader,
        cube: crate::gpu::MeshId,
        map: &TextureResource,
        mip: u32,
    ) {
        let (w, h) = map.mip_extent(mip);
        self.resize_depth(gpu, w);
        gpu.viewport(w, h);
        for (face, view) in capture_views().into_iter().enumerate() {
            shader.set_mat4(gpu, "view", view);
            self.target
                .attach_cube_face(gpu, AttachmentPoint::Color(0), map, face as u32, mip);
            self.target.bind(gpu);
            gpu.clear(ClearFlags::COLOR_DEPTH);
            gpu.draw_mesh(cube);
        }
    }
}

fn cube_config(mip_levels: Option<u32>) -> TextureConfig {
    TextureConfig {
        hdr: true,
        srgb: false,
        flip: false,
        gen_mipmap: mip_levels.is_some(),
        mip_levels,
        mipmap_filter: mip_levels.map(|_| crate::gpu::FilterMode::Linear),
        ..TextureConfig::default().clamped()
    }
}

impl<D: GpuDevice> Context<D> {
    /// Loads an equirectangular HDR image and bakes it, see [`Self::bake_environment`].
    pub fn load_environment(&mut self, path: impl AsRef<Path>) -> bool {
        let config = TextureConfig {
            hdr: true,
            srgb: false,
            ..TextureConfig::default().clamped()
        };
        let source = TextureResource::from_path(&mut self.gpu, path, config);
        self.bake_environment(&source)
    }

    /// Runs the four capture steps. An unusable source leaves the maps empty.
    pub fn bake_environment(&mut self, equirect: &TextureResource) -> bool {
        if !equirect.is_usable() {
            log::warn!("Environment {} is not usable, IBL maps not baked", equirect.label());
            self.ibl = IblMaps::default();
            return false;
        }
        let start = instant::Instant::now();
        let clip = self.gpu.clip_space();
        let projection = capture_projection(clip);
        let cube = self.shapes.cube.id();
        let capture = self.capture.get_or_insert_with(|| CaptureTarget::new(&mut self.gpu));
        let gpu = &mut self.gpu;
        gpu.set_depth_test(true);
        gpu.set_depth_func(DepthFunc::LessEqual);

        let environment = TextureResource::cube_map(gpu, "environment", ENVIRONMENT_SIZE, cube_config(None));
        let shader = self.shaders.equirect_to_cube;
        shader.use_program(gpu);
        shader.set_slot(gpu, "equirectangularMap", slots::SOURCE);
        shader.set_mat4(gpu, "projection", projection);
        equirect.bind_to(gpu, slots::SOURCE);
        capture.capture_faces(gpu, &shader, cube, &environment, 0);

        let irradiance = TextureResource::cube_map(gpu, "irradiance", IRRADIANCE_SIZE, cube_config(None));
        let shader = self.shaders.irradiance;
        shader.use_program(gpu);
        shader.set_slot(gpu, "envMap", slots::SOURCE);
        shader.set_mat4(gpu, "projection", projection);
        environment.bind_to(gpu, slots::SOURCE);
        capture.capture_faces(gpu, &shader, cube, &irradiance, 0);

        let prefilter = TextureResource::cube_map(
            gpu,
            "prefilter",
            PREFILTER_SIZE,
            cube_config(Some(PREFILTER_MIP_LEVELS)),
        );
        let shader = self.shaders.prefilter;
        shader.use_program(gpu);
        shader.set_slot(gpu, "envMap", slots::SOURCE);
        shader.set_mat4(gpu, "projection", projection);
        environment.bind_to(gpu, slots::SOURCE);
        for mip in 0..prefilter.mip_levels() {
            shader.set_float(gpu, "roughness", prefilter_roughness(mip));
            capture.capture_faces(gpu, &shader, cube, &prefilter, mip);
        }

        let brdf_config = TextureConfig {
            format: Some(TextureFormat::Rg16Float),
            ..TextureConfig::attachment()
        };
        let brdf_lut = TextureResource::color_attachment(gpu, "brdf_lut", BRDF_LUT_SIZE, BRDF_LUT_SIZE, brdf_config);
        capture.resize_depth(gpu, BRDF_LUT_SIZE);
        capture.target.attach_texture(gpu, AttachmentPoint::Color(0), &brdf_lut);
        capture.target.bind(gpu);
        gpu.viewport(BRDF_LUT_SIZE, BRDF_LUT_SIZE);
        gpu.clear(ClearFlags::COLOR_DEPTH);
        self.shaders.brdf_lut.use_program(gpu);
        gpu.draw_mesh(self.shapes.quad.id());

        gpu.set_depth_func(DepthFunc::Less);
        gpu.end_frame();
        self.ibl = IblMaps {
            environment: Some(environment),
            irradiance: Some(irradiance),
            prefilter: Some(prefilter),
            brdf_lut: Some(brdf_lut),
        };
        log::info!(
            "Baked IBL maps from {} in {:?}",
            equirect.label(),
            start.elapsed()
        );
        true
    }
}
