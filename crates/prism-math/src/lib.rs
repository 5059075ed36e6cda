// SPDX-License-Identifier: CEPL-1.0
//! Object and camera placement on top of `glam`.

pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

/// Position, per-axis rotation in degrees, and scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation_degrees: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation_degrees: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn with_rotation(mut self, degrees: Vec3) -> Self {
        self.rotation_degrees = degrees;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// X first, then Y, then Z (row-vector order).
    pub fn rotation_matrix(&self) -> Mat4 {
        let r = self.rotation_degrees;
        Mat4::from_rotation_z(r.z.to_radians())
            * Mat4::from_rotation_y(r.y.to_radians())
            * Mat4::from_rotation_x(r.x.to_radians())
    }

    /// Scale, then rotation, then translation.
    ///
    /// With glam's column vectors this reads right to left; the column-major
    /// array it produces is byte-identical to the row-major `S * R * T`
    /// product the shaders consume.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position) * self.rotation_matrix() * Mat4::from_scale(self.scale)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation_matrix().transform_vector3(Vec3::Z).normalize_or_zero()
    }

    pub fn up(&self) -> Vec3 {
        self.rotation_matrix().transform_vector3(Vec3::Y).normalize_or_zero()
    }

    pub fn right(&self) -> Vec3 {
        self.rotation_matrix().transform_vector3(Vec3::X).normalize_or_zero()
    }

    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }

    pub fn rotate(&mut self, delta_degrees: Vec3) {
        self.rotation_degrees += delta_degrees;
    }
}
