//! Built-in geometry: the unit cube and the full-screen quad.

use cgmath::Vector3;

use crate::data_structures::model::{MeshData, ModelVertex};

/// (normal, u axis, v axis) of each cube face, with `u x v == normal`.
const CUBE_FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
    ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
    ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
    ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
    ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
];

/// Cube spanning [-1, 1] on every axis, counter-clockwise seen from outside.
pub fn cube() -> MeshData {
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in CUBE_FACES {
        let (n, u, v) = (Vector3::from(normal), Vector3::from(u), Vector3::from(v));
        let base = vertices.len() as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            vertices.push(ModelVertex {
                position: (n + u * su + v * sv).into(),
                tex_coords: [(su + 1.0) * 0.5, (1.0 - sv) * 0.5],
                normal,
                ..Default::default()
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    MeshData::new("cube", vertices, indices)
}

/// Full-screen quad in normalized device coordinates, facing +Z.
pub fn quad() -> MeshData {
    let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
    let vertices = corners
        .iter()
        .map(|&(x, y)| ModelVertex {
            position: [x, y, 0.0],
            tex_coords: [(x + 1.0) * 0.5, (1.0 - y) * 0.5],
            normal: [0.0, 0.0, 1.0],
            ..Default::default()
        })
        .collect();
    MeshData::new("quad", vertices, vec![0, 1, 2, 0, 2, 3])
}
