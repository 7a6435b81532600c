//! Position, rotation and scale of scenes and meshes.

use std::ops::Mul;

use cgmath::{Deg, InnerSpace, One, Rotation3};

/// Affine transform stored as translation, rotation (as quaternion) and scale.
///
/// Transforms compose hierarchically with `*`: `parent * child` yields the
/// child expressed in the parent's space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Transform {
    /// Identity transform (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn translated(mut self, offset: cgmath::Vector3<f32>) -> Self {
        self.position += self.rotation
            * cgmath::Vector3::new(
                self.scale.x * offset.x,
                self.scale.y * offset.y,
                self.scale.z * offset.z,
            );
        self
    }

    pub fn rotated(mut self, angle: Deg<f32>, axis: cgmath::Vector3<f32>) -> Self {
        self.rotation = self.rotation * cgmath::Quaternion::from_axis_angle(axis.normalize(), angle);
        self
    }

    pub fn scaled(mut self, scale: cgmath::Vector3<f32>) -> Self {
        self.scale = cgmath::Vector3::new(
            self.scale.x * scale.x,
            self.scale.y * scale.y,
            self.scale.z * scale.z,
        );
        self
    }

    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

impl<'a, 'b> Mul<&'b Transform> for &'a Transform {
    type Output = Transform;

    fn mul(self, rhs: &'b Transform) -> Self::Output {
        let scaled_rhs_pos = cgmath::Vector3::new(
            self.scale.x * rhs.position.x,
            self.scale.y * rhs.position.y,
            self.scale.z * rhs.position.z,
        );
        Transform {
            position: self.position + (self.rotation * scaled_rhs_pos),
            rotation: self.rotation * rhs.rotation,
            scale: cgmath::Vector3::new(
                self.scale.x * rhs.scale.x,
                self.scale.y * rhs.scale.y,
                self.scale.z * rhs.scale.z,
            ),
        }
    }
}

impl Mul<Transform> for Transform {
    type Output = Self;

    fn mul(self, rhs: Transform) -> Self::Output {
        &self * &rhs
    }
}

impl From<cgmath::Vector3<f32>> for Transform {
    fn from(position: cgmath::Vector3<f32>) -> Self {
        Transform {
            position,
            ..Default::default()
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
