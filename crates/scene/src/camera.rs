//! Camera with perspective and orthographic projections.

use glam::{Mat4, Quat, Vec3};

/// Projection parameters.
#[derive(Clone, Copy, Debug)]
pub enum Projection {
    /// Perspective projection.
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f32,
        /// Near plane distance.
        near: f32,
        /// Far plane distance.
        far: f32,
    },
    /// Orthographic projection.
    Orthographic {
        /// Half-height of the view volume.
        half_height: f32,
        /// Near plane distance.
        near: f32,
        /// Far plane distance.
        far: f32,
    },
}

/// Scene camera.
///
/// Projection matrices use reversed-nothing, zero-to-one depth and flip Y
/// for Vulkan clip space.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    /// World-space position.
    pub position: Vec3,
    /// Orientation.
    pub rotation: Quat,
    projection: Projection,
    aspect: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            projection: Projection::Perspective {
                fov_y: 50f32.to_radians(),
                near: 0.1,
                far: 100.0,
            },
            aspect: 16.0 / 9.0,
        }
    }
}

impl Camera {
    /// Creates a camera with a default perspective projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches to a perspective projection.
    pub fn set_perspective(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        self.projection = Projection::Perspective { fov_y, near, far };
        self.aspect = aspect;
    }

    /// Switches to an orthographic projection.
    pub fn set_orthographic(&mut self, half_height: f32, aspect: f32, near: f32, far: f32) {
        self.projection = Projection::Orthographic {
            half_height,
            near,
            far,
        };
        self.aspect = aspect;
    }

    /// Updates the aspect ratio, keeping the projection otherwise unchanged.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    /// Points the camera from its current position at `target`.
    pub fn look_at(&mut self, target: Vec3) {
        let view = Mat4::look_at_rh(self.position, target, Vec3::Y);
        // The view matrix is the inverse of the camera's world transform
        self.rotation = Quat::from_mat4(&view.inverse());
    }

    /// World-to-view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position).inverse()
    }

    /// View-to-clip matrix (Vulkan conventions: Y down, depth 0..1).
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = match self.projection {
            Projection::Perspective { fov_y, near, far } => {
                Mat4::perspective_rh(fov_y, self.aspect, near, far)
            }
            Projection::Orthographic {
                half_height,
                near,
                far,
            } => {
                let half_width = half_height * self.aspect;
                Mat4::orthographic_rh(
                    -half_width,
                    half_width,
                    -half_height,
                    half_height,
                    near,
                    far,
                )
            }
        };
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Combined view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera_view_is_identity() {
        let camera = Camera::new();
        assert_eq!(camera.view_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn projection_flips_y_for_vulkan() {
        let camera = Camera::new();
        let proj = camera.projection_matrix();
        assert!(proj.y_axis.y < 0.0);
    }

    #[test]
    fn view_matrix_moves_world_opposite_to_camera() {
        let mut camera = Camera::new();
        camera.position = Vec3::new(0.0, 0.0, 5.0);
        let at_camera = camera.view_matrix().transform_point3(camera.position);
        assert!(at_camera.length() < 1e-6);
    }

    #[test]
    fn look_at_faces_target() {
        let mut camera = Camera::new();
        camera.position = Vec3::new(0.0, 0.0, 5.0);
        camera.look_at(Vec3::ZERO);

        // The target should project onto the negative view-space Z axis
        let target_in_view = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert!(target_in_view.z < 0.0);
        assert!(target_in_view.x.abs() < 1e-5);
        assert!(target_in_view.y.abs() < 1e-5);
    }

    #[test]
    fn orthographic_respects_aspect() {
        let mut camera = Camera::new();
        camera.set_orthographic(1.0, 2.0, 0.1, 10.0);
        let proj = camera.projection_matrix();
        // Half-width 2, half-height 1: x scale is half the (absolute) y scale
        assert!((proj.x_axis.x - 0.5).abs() < 1e-6);
        assert!((proj.y_axis.y.abs() - 1.0).abs() < 1e-6);
    }
}
