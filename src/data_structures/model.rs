//! Meshes, materials and scenes consumed by the render passes.
//!
//! Mesh loading from files lives outside this crate. Loaders hand over a
//! [`MeshData`] (vertices + indices), the textures found for it and one
//! material; [`Mesh::new`] uploads the buffers to the device.

use std::rc::Rc;

use crate::{
    data_structures::{
        texture::{TextureResource, TextureSemantic},
        transform::Transform,
    },
    gpu::{GpuDevice, GpuMesh, MeshId},
    resources::mesh::compute_tangents,
};

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 11]>() as wgpu::BufferAddress,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// CPU-side geometry of one mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub label: String,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Tangents and bitangents are recomputed from positions and UVs.
    pub fn new(label: &str, mut vertices: Vec<ModelVertex>, indices: Vec<u32>) -> Self {
        compute_tangents(&mut vertices, &indices);
        Self {
            label: label.to_string(),
            vertices,
            indices,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Material {
    /// Flat color, no lighting maps.
    Solid { color: cgmath::Vector3<f32> },
    Phong {
        ambient: cgmath::Vector3<f32>,
        diffuse: cgmath::Vector3<f32>,
        specular: cgmath::Vector3<f32>,
        shininess: f32,
    },
    Pbr {
        albedo: cgmath::Vector3<f32>,
        metallic: f32,
        roughness: f32,
        ao: f32,
    },
}

impl Material {
    pub fn is_pbr(&self) -> bool {
        matches!(self, Material::Pbr { .. })
    }
}

/// A texture attached to a mesh together with what it means for shading.
#[derive(Clone, Debug)]
pub struct MeshTexture {
    pub semantic: TextureSemantic,
    pub texture: Rc<TextureResource>,
}

#[derive(Debug)]
pub struct Mesh {
    pub label: String,
    pub transform: Transform,
    pub textures: Vec<MeshTexture>,
    pub material: Option<Material>,
    gpu: GpuMesh,
}

impl Mesh {
    pub fn new(gpu: &mut impl GpuDevice, data: &MeshData) -> Self {
        let id = gpu.upload_mesh(data);
        Self {
            label: data.label.clone(),
            transform: Transform::new(),
            textures: Vec::new(),
            material: None,
            gpu: GpuMesh::new(id, gpu.releaser()),
        }
    }

    pub fn with_texture(mut self, semantic: TextureSemantic, texture: Rc<TextureResource>) -> Self {
        self.textures.push(MeshTexture { semantic, texture });
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn id(&self) -> MeshId {
        self.gpu.id()
    }

    pub fn has(&self, semantic: TextureSemantic) -> bool {
        self.textures.iter().any(|t| t.semantic == semantic)
    }
}

/// A group of meshes sharing one scene transform.
#[derive(Debug, Default)]
pub struct Scene {
    pub transform: Transform,
    pub meshes: Vec<Mesh>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.meshes.push(mesh);
        self
    }

    /// World matrix of `mesh`: scene transform, then the global object offset, then the mesh.
    pub fn model_matrix(&self, mesh: &Mesh, object_position: cgmath::Vector3<f32>) -> cgmath::Matrix4<f32> {
        self.transform.to_matrix()
            * cgmath::Matrix4::from_translation(object_position)
            * mesh.transform.to_matrix()
    }
}
