//! Look-at camera with a Vulkan-ready perspective projection.

use glam::{Mat4, Vec3};

/// Default eye position.
pub const DEFAULT_EYE: Vec3 = Vec3::new(10.0, 0.0, 20.0);

/// Default vertical field of view in degrees.
pub const DEFAULT_FOV_Y_DEGREES: f32 = 45.0;

/// A camera looking from `eye` at `target`.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    /// Camera position in world space
    pub eye: Vec3,
    /// Point the camera looks at
    pub target: Vec3,
    /// World up direction
    pub up: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: DEFAULT_EYE,
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: DEFAULT_FOV_Y_DEGREES.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// Get the projection matrix for a `width` x `height` target.
    ///
    /// Y is flipped for Vulkan clip space. A zero height is treated as
    /// one pixel so a minimized window never yields NaNs.
    pub fn projection_matrix(&self, width: u32, height: u32) -> Mat4 {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let mut proj = Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_default_camera() {
        let camera = Camera::default();
        assert_eq!(camera.eye, Vec3::new(10.0, 0.0, 20.0));
        assert_eq!(camera.target, Vec3::ZERO);
        assert_eq!(camera.up, Vec3::Y);
        assert!((camera.fov_y - 45.0_f32.to_radians()).abs() < EPSILON);
    }

    #[test]
    fn test_view_maps_target_onto_negative_z() {
        let camera = Camera::default();
        let target_view = camera.view_matrix().transform_point3(camera.target);
        let distance = camera.eye.distance(camera.target);

        assert!(target_view.x.abs() < 1e-4);
        assert!(target_view.y.abs() < 1e-4);
        assert!((target_view.z + distance).abs() < 1e-4);
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::default();
        let flipped = camera.projection_matrix(800, 600);
        let plain = Mat4::perspective_rh(camera.fov_y, 800.0 / 600.0, 0.1, 100.0);

        assert!((flipped.y_axis.y + plain.y_axis.y).abs() < EPSILON);
        assert!(flipped.y_axis.y < 0.0);
        assert!((flipped.x_axis.x - plain.x_axis.x).abs() < EPSILON);
    }

    #[test]
    fn test_projection_depth_range() {
        let camera = Camera::default();
        let proj = camera.projection_matrix(500, 500);

        let near = proj.project_point3(Vec3::new(0.0, 0.0, -camera.near));
        let far = proj.project_point3(Vec3::new(0.0, 0.0, -camera.far));
        assert!(near.z.abs() < 1e-4);
        assert!((far.z - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_projection_zero_height_is_finite() {
        let camera = Camera::default();
        let proj = camera.projection_matrix(500, 0);
        assert!(proj.is_finite());
    }
}
