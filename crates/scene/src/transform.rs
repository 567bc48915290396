//! Object transform.

use glam::{Mat4, Quat, Vec3};

/// Position, rotation, and scale of a scene object.
#[derive(Clone, Copy, Debug)]
pub struct Transform {
    /// World-space position.
    pub position: Vec3,
    /// Orientation.
    pub rotation: Quat,
    /// Per-axis scale.
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Identity transform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the position.
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Sets the rotation.
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Sets the scale.
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Object-to-world matrix (scale, then rotate, then translate).
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Matrix for transforming normals: the inverse transpose of the model
    /// matrix, which stays correct under non-uniform scale.
    pub fn normal_matrix(&self) -> Mat4 {
        self.matrix().inverse().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_matrices() {
        let transform = Transform::new();
        assert_eq!(transform.matrix(), Mat4::IDENTITY);
        assert_eq!(transform.normal_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn matrix_applies_translation() {
        let transform = Transform::new().with_position(Vec3::new(1.0, 2.0, 3.0));
        let moved = transform.matrix().transform_point3(Vec3::ZERO);
        assert_eq!(moved, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn normal_matrix_compensates_nonuniform_scale() {
        let transform = Transform::new().with_scale(Vec3::new(2.0, 1.0, 1.0));
        // A normal along +X shrinks under the inverse-transpose where the
        // geometry stretched
        let normal = transform
            .normal_matrix()
            .transform_vector3(Vec3::X)
            .normalize();
        assert!((normal - Vec3::X).length() < 1e-6);

        let raw = transform.normal_matrix().transform_vector3(Vec3::X);
        assert!((raw.x - 0.5).abs() < 1e-6);
    }
}
