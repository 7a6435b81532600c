//! Render passes and their shader contracts.
//!
//! - `programs` declares every shader program: its named uniforms and the
//!   texture slots it samples
//! - `light` sends light data and draws debug light cubes
//! - `scene` draws all scene meshes with per-mesh texture and material uniforms
//! - `shadow`, `geometry`, `ssao`, `backbuffer`, `bloom`, `postprocess` are the
//!   per-frame passes in execution order
//! - `ibl` is the one-time image based lighting precompute

pub mod backbuffer;
pub mod bloom;
pub mod geometry;
pub mod ibl;
pub mod light;
pub mod postprocess;
pub mod programs;
pub mod scene;
pub mod shadow;
pub mod ssao;

use cgmath::{Matrix4, Vector3, Vector4};

use crate::gpu::{GpuDevice, GpuProgram, ProgramId, ProgramSource, UniformValue};

/// Fixed texture units. Shaders assume these numbers.
pub mod slots {
    /// Forward Phong shading (also the G-buffer program).
    pub mod phong {
        pub const DIFFUSE: u32 = 0;
        pub const SPECULAR: u32 = 1;
        pub const SHADOW: u32 = 2;
        pub const NORMAL: u32 = 3;
    }

    pub mod pbr {
        pub const ALBEDO: u32 = 0;
        pub const NORMAL: u32 = 1;
        pub const ROUGHNESS: u32 = 2;
        pub const METALLIC: u32 = 3;
        pub const AO: u32 = 4;
        pub const IRRADIANCE: u32 = 5;
        pub const PREFILTER: u32 = 6;
        pub const BRDF_LUT: u32 = 7;
        pub const SHADOW: u32 = 8;
    }

    /// Deferred lighting. The shadow map keeps its Phong slot.
    pub mod deferred {
        pub const POSITION: u32 = 4;
        pub const NORMAL: u32 = 5;
        pub const ALBEDO_SPEC: u32 = 6;
        pub const POSITION_LIGHT_SPACE: u32 = 7;
        pub const SSAO: u32 = 8;
        /// Material maps are not sampled during the lighting pass.
        pub const UNBOUND: u32 = 15;
    }

    pub mod ssao {
        pub const POSITION: u32 = 0;
        pub const NORMAL: u32 = 1;
        pub const NOISE: u32 = 2;
        pub const INPUT: u32 = 0;
    }

    pub mod postprocess {
        pub const SCREEN: u32 = 0;
        pub const BLOOM: u32 = 1;
    }

    pub const SKYBOX: u32 = 0;
    /// Source texture of blur and IBL capture draws.
    pub const SOURCE: u32 = 0;
}

/// A compiled program plus typed uniform setters.
///
/// Uniforms are addressed by their dotted names, e.g. `"material.albedo"` or
/// `"pointLights[2].position"`. Setting a uniform does not require the program
/// to be active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Shader(ProgramId);

impl Shader {
    /// Compiles `source`. The returned handle owns the program, the shader is
    /// a copyable view of it.
    pub fn new(gpu: &mut impl GpuDevice, source: &ProgramSource) -> anyhow::Result<(Self, GpuProgram)> {
        let id = gpu.create_program(source)?;
        Ok((Self(id), GpuProgram::new(id, gpu.releaser())))
    }

    pub fn id(&self) -> ProgramId {
        self.0
    }

    pub fn use_program(&self, gpu: &mut impl GpuDevice) {
        gpu.use_program(self.0);
    }

    pub fn set_bool(&self, gpu: &mut impl GpuDevice, name: &str, value: bool) {
        gpu.set_uniform(self.0, name, UniformValue::Bool(value));
    }

    pub fn set_int(&self, gpu: &mut impl GpuDevice, name: &str, value: i32) {
        gpu.set_uniform(self.0, name, UniformValue::Int(value));
    }

    /// Sampler uniforms carry the texture unit.
    pub fn set_slot(&self, gpu: &mut impl GpuDevice, name: &str, slot: u32) {
        gpu.set_uniform(self.0, name, UniformValue::Int(slot as i32));
    }

    pub fn set_float(&self, gpu: &mut impl GpuDevice, name: &str, value: f32) {
        gpu.set_uniform(self.0, name, UniformValue::Float(value));
    }

    pub fn set_vec3(&self, gpu: &mut impl GpuDevice, name: &str, value: Vector3<f32>) {
        gpu.set_uniform(self.0, name, UniformValue::Vec3(value.into()));
    }

    pub fn set_vec4(&self, gpu: &mut impl GpuDevice, name: &str, value: Vector4<f32>) {
        gpu.set_uniform(self.0, name, UniformValue::Vec4(value.into()));
    }

    pub fn set_mat4(&self, gpu: &mut impl GpuDevice, name: &str, value: Matrix4<f32>) {
        gpu.set_uniform(self.0, name, UniformValue::Mat4(value.into()));
    }
}
