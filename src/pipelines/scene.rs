//! Scene drawing shared by the shadow, G-buffer and forward passes.
//!
//! Texture-to-slot routing and the material uniforms are decided per mesh:
//! a mesh is shaded with the PBR program when PBR is enabled and the mesh
//! carries PBR maps or a PBR material, otherwise with the Phong program.

use cgmath::Vector3;

use crate::{
    context::Context,
    data_structures::{
        model::{Material, Mesh},
        texture::{ColorChannel, TextureResource, TextureSemantic},
    },
    gpu::GpuDevice,
};

use super::{
    Shader,
    ibl::IblMaps,
    slots::{pbr, phong},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneShading {
    Forward { pbr: bool },
    GBuffer,
}

/// Whether a mesh wants physically based shading.
pub fn mesh_is_pbr(mesh: &Mesh) -> bool {
    mesh.textures.iter().any(|t| t.semantic.is_pbr()) || mesh.material.is_some_and(|m| m.is_pbr())
}

/// First usable texture with `semantic`. Failed loads never reach a shader.
fn usable(mesh: &Mesh, semantic: TextureSemantic) -> Option<&TextureResource> {
    mesh.textures
        .iter()
        .find(|t| t.semantic == semantic && t.texture.is_usable())
        .map(|t| t.texture.as_ref())
}

fn bind_optional(gpu: &mut impl GpuDevice, texture: Option<&TextureResource>, slot: u32) -> bool {
    match texture {
        Some(texture) => {
            texture.bind_to(gpu, slot);
            true
        }
        None => false,
    }
}

fn bind_phong_maps(gpu: &mut impl GpuDevice, shader: &Shader, mesh: &Mesh, shadow_map: Option<&TextureResource>) {
    let diffuse = usable(mesh, TextureSemantic::Diffuse).or_else(|| usable(mesh, TextureSemantic::Albedo));
    let has_diffuse = bind_optional(gpu, diffuse, phong::DIFFUSE);
    let has_specular = bind_optional(gpu, usable(mesh, TextureSemantic::Specular), phong::SPECULAR);
    let has_normal = bind_optional(gpu, usable(mesh, TextureSemantic::Normal), phong::NORMAL);
    if let Some(shadow_map) = shadow_map {
        shadow_map.bind_to(gpu, phong::SHADOW);
    }
    shader.set_bool(gpu, "hasDiffuse", has_diffuse);
    shader.set_bool(gpu, "hasSpecular", has_specular);
    shader.set_bool(gpu, "hasNormal", has_normal);
}

fn channel_of(texture: Option<&TextureResource>) -> Vector3<f32> {
    let channel = texture.map_or(ColorChannel::default(), |t| t.config().associated_channel);
    channel.one_hot().into()
}

fn bind_pbr_maps(
    gpu: &mut impl GpuDevice,
    shader: &Shader,
    mesh: &Mesh,
    shadow_map: &TextureResource,
    ibl: &IblMaps,
) {
    let albedo = usable(mesh, TextureSemantic::Albedo).or_else(|| usable(mesh, TextureSemantic::Diffuse));
    let metallic = usable(mesh, TextureSemantic::Metallic);
    let roughness = usable(mesh, TextureSemantic::Roughness);

    let has_albedo = bind_optional(gpu, albedo, pbr::ALBEDO);
    let has_normal = bind_optional(gpu, usable(mesh, TextureSemantic::Normal), pbr::NORMAL);
    let has_metallic = bind_optional(gpu, metallic, pbr::METALLIC);
    let has_roughness = bind_optional(gpu, roughness, pbr::ROUGHNESS);
    let has_ao = bind_optional(gpu, usable(mesh, TextureSemantic::Ao), pbr::AO);

    shader.set_bool(gpu, "hasAlbedo", has_albedo);
    shader.set_bool(gpu, "hasMetallic", has_metallic);
    shader.set_bool(gpu, "hasRoughness", has_roughness);
    shader.set_bool(gpu, "hasAo", has_ao);
    shader.set_bool(gpu, "hasNormal", has_normal);
    shader.set_vec3(gpu, "metallicChannel", channel_of(metallic));
    shader.set_vec3(gpu, "roughnessChannel", channel_of(roughness));

    shadow_map.bind_to(gpu, pbr::SHADOW);
    ibl.bind(gpu);
}

fn send_material(gpu: &mut impl GpuDevice, shader: &Shader, material: Option<Material>, pbr_program: bool) {
    match material {
        Some(Material::Solid { color }) => shader.set_vec3(gpu, "obj_color", color),
        Some(Material::Phong {
            ambient,
            diffuse,
            specular,
            shininess,
        }) if !pbr_program => {
            shader.set_vec3(gpu, "material.ambient", ambient);
            shader.set_vec3(gpu, "material.diffuse", diffuse);
            shader.set_vec3(gpu, "material.specular", specular);
            shader.set_float(gpu, "material.shininess", shininess);
        }
        Some(Material::Pbr {
            albedo,
            metallic,
            roughness,
            ao,
        }) if pbr_program => {
            shader.set_vec3(gpu, "material.albedo", albedo);
            shader.set_float(gpu, "material.metallic", metallic);
            shader.set_float(gpu, "material.roughness", roughness);
            shader.set_float(gpu, "material.ao", ao);
        }
        Some(other) => log::trace!("{other:?} does not apply to this program"),
        None => (),
    }
}

impl<D: GpuDevice> Context<D> {
    /// Draws every mesh of every scene with full material setup.
    pub(crate) fn render_scenes(&mut self, shading: SceneShading) {
        let object_position = self.config.object_position;
        for scene in &self.scenes {
            for mesh in &scene.meshes {
                let pbr = matches!(shading, SceneShading::Forward { pbr: true }) && mesh_is_pbr(mesh);
                let shader = match shading {
                    SceneShading::GBuffer => self.shaders.gbuffer,
                    SceneShading::Forward { .. } if pbr => self.shaders.pbr,
                    SceneShading::Forward { .. } => self.shaders.phong,
                };
                shader.use_program(&mut self.gpu);
                shader.set_mat4(&mut self.gpu, "model", scene.model_matrix(mesh, object_position));
                if pbr {
                    bind_pbr_maps(&mut self.gpu, &shader, mesh, &self.shadow.map, &self.ibl);
                } else {
                    let shadow_map = matches!(shading, SceneShading::Forward { .. }).then_some(&self.shadow.map);
                    bind_phong_maps(&mut self.gpu, &shader, mesh, shadow_map);
                }
                send_material(&mut self.gpu, &shader, mesh.material, pbr);
                self.gpu.draw_mesh(mesh.id());
            }
        }
    }

    /// Draws every mesh with only its model matrix, for depth-only programs.
    pub(crate) fn render_scenes_depth(&mut self, shader: Shader) {
        let object_position = self.config.object_position;
        shader.use_program(&mut self.gpu);
        for scene in &self.scenes {
            for mesh in &scene.meshes {
                shader.set_mat4(&mut self.gpu, "model", scene.model_matrix(mesh, object_position));
                self.gpu.draw_mesh(mesh.id());
            }
        }
    }
}
