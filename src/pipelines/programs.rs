//! Uniform and sampler contracts of every program the pipeline drives.
//!
//! The shading code is not part of this crate. A [`ShaderLibrary`] maps each
//! [`ProgramKind`] to caller supplied WGSL; the declarations below tell the
//! backend how to lay out the uniform block and which texture slots exist.

use std::{borrow::Cow, collections::HashMap};

use crate::{
    data_structures::light::MAX_LIGHTS,
    gpu::{GpuDevice, GpuProgram, ProgramSource, TextureDimension, UniformKind},
};

use super::{
    Shader,
    slots::{self, deferred, pbr, phong, postprocess, ssao},
};

use UniformKind::{Bool, Float, Int, Mat4, Vec3};

/// Number of SSAO hemisphere samples.
pub const SSAO_KERNEL_SIZE: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProgramKind {
    LightCube,
    Phong,
    GBuffer,
    LightPass,
    Pbr,
    Skybox,
    Shadow,
    Blur,
    PostProcess,
    EquirectToCube,
    Irradiance,
    Prefilter,
    BrdfLut,
    Ssao,
    SsaoBlur,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 15] = [
        ProgramKind::LightCube,
        ProgramKind::Phong,
        ProgramKind::GBuffer,
        ProgramKind::LightPass,
        ProgramKind::Pbr,
        ProgramKind::Skybox,
        ProgramKind::Shadow,
        ProgramKind::Blur,
        ProgramKind::PostProcess,
        ProgramKind::EquirectToCube,
        ProgramKind::Irradiance,
        ProgramKind::Prefilter,
        ProgramKind::BrdfLut,
        ProgramKind::Ssao,
        ProgramKind::SsaoBlur,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ProgramKind::LightCube => "light_cube",
            ProgramKind::Phong => "phong",
            ProgramKind::GBuffer => "gbuffer",
            ProgramKind::LightPass => "light_pass",
            ProgramKind::Pbr => "pbr",
            ProgramKind::Skybox => "skybox",
            ProgramKind::Shadow => "shadow",
            ProgramKind::Blur => "blur",
            ProgramKind::PostProcess => "postprocess",
            ProgramKind::EquirectToCube => "equirect_to_cube",
            ProgramKind::Irradiance => "irradiance",
            ProgramKind::Prefilter => "prefilter",
            ProgramKind::BrdfLut => "brdf_lut",
            ProgramKind::Ssao => "ssao",
            ProgramKind::SsaoBlur => "ssao_blur",
        }
    }

    /// Declared uniforms and samplers, without shading code.
    pub fn contract(&self) -> ProgramSource {
        let src = ProgramSource::opaque(self.label());
        match self {
            ProgramKind::LightCube => transforms(src).uniform("lightColor", Vec3),
            ProgramKind::Phong => phong_lights(phong_material(forward_frame(transforms(src))))
                .sampler(phong::DIFFUSE, TextureDimension::D2)
                .sampler(phong::SPECULAR, TextureDimension::D2)
                .depth_sampler(phong::SHADOW)
                .sampler(phong::NORMAL, TextureDimension::D2),
            ProgramKind::GBuffer => phong_material(forward_frame(transforms(src)))
                .uniform("material.shininess", Float)
                .sampler(phong::DIFFUSE, TextureDimension::D2)
                .sampler(phong::SPECULAR, TextureDimension::D2)
                .sampler(phong::NORMAL, TextureDimension::D2),
            ProgramKind::LightPass => phong_lights(src)
                .uniform("deferred", Bool)
                .uniform("viewPos", Vec3)
                .uniform("hasShadow", Bool)
                .uniform("hasSsao", Bool)
                .uniform("materialMaps.diffuse", Int)
                .uniform("materialMaps.specular", Int)
                .uniform("materialMaps.shadow", Int)
                .uniform("materialMaps.normal", Int)
                .uniform("deferredMaps.gPosition", Int)
                .uniform("deferredMaps.gNormal", Int)
                .uniform("deferredMaps.gAlbedoSpec", Int)
                .uniform("deferredMaps.gPositionLightSpace", Int)
                .uniform("deferredMaps.ssao", Int)
                .depth_sampler(phong::SHADOW)
                .sampler(deferred::POSITION, TextureDimension::D2)
                .sampler(deferred::NORMAL, TextureDimension::D2)
                .sampler(deferred::ALBEDO_SPEC, TextureDimension::D2)
                .sampler(deferred::POSITION_LIGHT_SPACE, TextureDimension::D2)
                .sampler(deferred::SSAO, TextureDimension::D2),
            ProgramKind::Pbr => transforms(src)
                .uniform("deferred", Bool)
                .uniform("camPos", Vec3)
                .uniform("lightSpaceMatrix", Mat4)
                .uniform("gammaCorrect", Bool)
                .uniform("hasIBLMaps", Bool)
                .uniform("hasShadow", Bool)
                .uniform("materialMaps.albedoMap", Int)
                .uniform("materialMaps.normalMap", Int)
                .uniform("materialMaps.roughnessMap", Int)
                .uniform("materialMaps.metallicMap", Int)
                .uniform("materialMaps.aoMap", Int)
                .uniform("irradianceMap", Int)
                .uniform("prefilterMap", Int)
                .uniform("brdfLUT", Int)
                .uniform("shadowMap", Int)
                .uniform("hasAlbedo", Bool)
                .uniform("hasMetallic", Bool)
                .uniform("hasRoughness", Bool)
                .uniform("hasAo", Bool)
                .uniform("hasNormal", Bool)
                .uniform("metallicChannel", Vec3)
                .uniform("roughnessChannel", Vec3)
                .uniform("material.albedo", Vec3)
                .uniform("material.metallic", Float)
                .uniform("material.roughness", Float)
                .uniform("material.ao", Float)
                .uniform("obj_color", Vec3)
                .uniform("pointLightsSize", Int)
                .uniform_struct_array("pointLights", MAX_LIGHTS, &[("position", Vec3), ("color", Vec3)])
                .uniform("directionalLight.direction", Vec3)
                .uniform("directionalLight.color", Vec3)
                .sampler(pbr::ALBEDO, TextureDimension::D2)
                .sampler(pbr::NORMAL, TextureDimension::D2)
                .sampler(pbr::ROUGHNESS, TextureDimension::D2)
                .sampler(pbr::METALLIC, TextureDimension::D2)
                .sampler(pbr::AO, TextureDimension::D2)
                .sampler(pbr::IRRADIANCE, TextureDimension::Cube)
                .sampler(pbr::PREFILTER, TextureDimension::Cube)
                .sampler(pbr::BRDF_LUT, TextureDimension::D2)
                .depth_sampler(pbr::SHADOW),
            ProgramKind::Skybox => src
                .uniform("view", Mat4)
                .uniform("projection", Mat4)
                .uniform("envMap", Int)
                .sampler(slots::SKYBOX, TextureDimension::Cube),
            ProgramKind::Shadow => src.uniform("model", Mat4).uniform("lightSpaceMatrix", Mat4),
            ProgramKind::Blur => src
                .uniform("horizontal", Bool)
                .sampler(slots::SOURCE, TextureDimension::D2),
            ProgramKind::PostProcess => src
                .uniform("screenTexture", Int)
                .uniform("bloomTexture", Int)
                .uniform("gamma", Bool)
                .uniform("hdr", Bool)
                .uniform("bloom", Bool)
                .uniform("exposure", Float)
                .uniform("sharpen", Bool)
                .uniform("sharpness", Float)
                .uniform("blur", Bool)
                .uniform("grayscale", Bool)
                .sampler(postprocess::SCREEN, TextureDimension::D2)
                .sampler(postprocess::BLOOM, TextureDimension::D2),
            ProgramKind::EquirectToCube => capture(src)
                .uniform("equirectangularMap", Int)
                .sampler(slots::SOURCE, TextureDimension::D2),
            ProgramKind::Irradiance => capture(src)
                .uniform("envMap", Int)
                .sampler(slots::SOURCE, TextureDimension::Cube),
            ProgramKind::Prefilter => capture(src)
                .uniform("envMap", Int)
                .uniform("roughness", Float)
                .sampler(slots::SOURCE, TextureDimension::Cube),
            ProgramKind::BrdfLut => src,
            ProgramKind::Ssao => {
                let mut src = src
                    .uniform("projection", Mat4)
                    .uniform("noiseScale", Vec3)
                    .uniform("gPosition", Int)
                    .uniform("gNormal", Int)
                    .uniform("texNoise", Int);
                for i in 0..SSAO_KERNEL_SIZE {
                    src = src.uniform(&format!("samples[{i}]"), Vec3);
                }
                src.sampler(ssao::POSITION, TextureDimension::D2)
                    .sampler(ssao::NORMAL, TextureDimension::D2)
                    .sampler(ssao::NOISE, TextureDimension::D2)
            }
            ProgramKind::SsaoBlur => src
                .uniform("ssaoInput", Int)
                .sampler(ssao::INPUT, TextureDimension::D2),
        }
    }
}

fn transforms(src: ProgramSource) -> ProgramSource {
    src.uniform("model", Mat4)
        .uniform("view", Mat4)
        .uniform("projection", Mat4)
}

fn capture(src: ProgramSource) -> ProgramSource {
    src.uniform("view", Mat4).uniform("projection", Mat4)
}

/// Per-frame uniforms of the forward and G-buffer programs.
fn forward_frame(src: ProgramSource) -> ProgramSource {
    src.uniform("deferred", Bool)
        .uniform("viewPos", Vec3)
        .uniform("hasShadow", Bool)
        .uniform("lightSpaceMatrix", Mat4)
        .uniform("materialMaps.diffuse", Int)
        .uniform("materialMaps.specular", Int)
        .uniform("materialMaps.shadow", Int)
        .uniform("materialMaps.normal", Int)
}

fn phong_material(src: ProgramSource) -> ProgramSource {
    src.uniform("hasDiffuse", Bool)
        .uniform("hasSpecular", Bool)
        .uniform("hasNormal", Bool)
        .uniform("obj_color", Vec3)
        .uniform("material.ambient", Vec3)
        .uniform("material.diffuse", Vec3)
        .uniform("material.specular", Vec3)
}

fn phong_lights(src: ProgramSource) -> ProgramSource {
    let colors = [("ambient", Vec3), ("diffuse", Vec3), ("specular", Vec3)];
    let falloff = [("constant", Float), ("linear", Float), ("quadratic", Float)];
    let point: Vec<_> = [("position", Vec3)]
        .into_iter()
        .chain(colors)
        .chain(falloff)
        .collect();
    let spot: Vec<_> = [("position", Vec3), ("direction", Vec3)]
        .into_iter()
        .chain(colors)
        .chain(falloff)
        .chain([("cutOff", Float), ("outerCutOff", Float)])
        .collect();
    src.uniform("blinn", Bool)
        .uniform("material.shininess", Float)
        .uniform("pointLightsSize", Int)
        .uniform("spotLightsSize", Int)
        .uniform_struct_array("pointLights", MAX_LIGHTS, &point)
        .uniform_struct_array("spotLights", MAX_LIGHTS, &spot)
        .uniform("directionalLight.direction", Vec3)
        .uniform("directionalLight.ambient", Vec3)
        .uniform("directionalLight.diffuse", Vec3)
        .uniform("directionalLight.specular", Vec3)
}

/// Shading code per program, keyed by [`ProgramKind`].
#[derive(Clone, Debug, Default)]
pub struct ShaderLibrary {
    wgsl: HashMap<ProgramKind, Cow<'static, str>>,
}

impl ShaderLibrary {
    /// No shading code at all, for headless devices.
    pub fn headless() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ProgramKind, wgsl: impl Into<Cow<'static, str>>) -> Self {
        self.wgsl.insert(kind, wgsl.into());
        self
    }

    pub fn source(&self, kind: ProgramKind) -> ProgramSource {
        let contract = kind.contract();
        match self.wgsl.get(&kind) {
            Some(wgsl) => contract.with_wgsl(wgsl.clone()),
            None => contract,
        }
    }
}

/// Every compiled program of the pipeline.
#[derive(Debug)]
pub struct ShaderSet {
    pub light_cube: Shader,
    pub phong: Shader,
    pub gbuffer: Shader,
    pub light_pass: Shader,
    pub pbr: Shader,
    pub skybox: Shader,
    pub shadow: Shader,
    pub blur: Shader,
    pub postprocess: Shader,
    pub equirect_to_cube: Shader,
    pub irradiance: Shader,
    pub prefilter: Shader,
    pub brdf_lut: Shader,
    pub ssao: Shader,
    pub ssao_blur: Shader,
    programs: Vec<GpuProgram>,
}

impl ShaderSet {
    pub fn new(gpu: &mut impl GpuDevice, library: &ShaderLibrary) -> anyhow::Result<Self> {
        let mut programs = Vec::with_capacity(ProgramKind::ALL.len());
        let mut make = |kind| -> anyhow::Result<Shader> {
            let (shader, program) = Shader::new(gpu, &library.source(kind))?;
            programs.push(program);
            Ok(shader)
        };
        let mut set = Self {
            light_cube: make(ProgramKind::LightCube)?,
            phong: make(ProgramKind::Phong)?,
            gbuffer: make(ProgramKind::GBuffer)?,
            light_pass: make(ProgramKind::LightPass)?,
            pbr: make(ProgramKind::Pbr)?,
            skybox: make(ProgramKind::Skybox)?,
            shadow: make(ProgramKind::Shadow)?,
            blur: make(ProgramKind::Blur)?,
            postprocess: make(ProgramKind::PostProcess)?,
            equirect_to_cube: make(ProgramKind::EquirectToCube)?,
            irradiance: make(ProgramKind::Irradiance)?,
            prefilter: make(ProgramKind::Prefilter)?,
            brdf_lut: make(ProgramKind::BrdfLut)?,
            ssao: make(ProgramKind::Ssao)?,
            ssao_blur: make(ProgramKind::SsaoBlur)?,
            programs: Vec::new(),
        };
        set.programs = programs;
        Ok(set)
    }

    pub fn get(&self, kind: ProgramKind) -> Shader {
        match kind {
            ProgramKind::LightCube => self.light_cube,
            ProgramKind::Phong => self.phong,
            ProgramKind::GBuffer => self.gbuffer,
            ProgramKind::LightPass => self.light_pass,
            ProgramKind::Pbr => self.pbr,
            ProgramKind::Skybox => self.skybox,
            ProgramKind::Shadow => self.shadow,
            ProgramKind::Blur => self.blur,
            ProgramKind::PostProcess => self.postprocess,
            ProgramKind::EquirectToCube => self.equirect_to_cube,
            ProgramKind::Irradiance => self.irradiance,
            ProgramKind::Prefilter => self.prefilter,
            ProgramKind::BrdfLut => self.brdf_lut,
            ProgramKind::Ssao => self.ssao,
            ProgramKind::SsaoBlur => self.ssao_blur,
        }
    }
}
