//! Uniform buffer object definitions for shaders.
//!
//! These structures must match the GLSL uniform block layouts exactly.
//! All structures use `#[repr(C)]` for predictable memory layout and implement
//! `Pod` and `Zeroable` for safe byte casting.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use renderer_scene::Camera;

/// View and projection matrices, one copy per swap-chain image.
///
/// # Memory Layout
///
/// - Offset 0: projection matrix (64 bytes)
/// - Offset 64: view matrix (64 bytes)
/// - Total size: 128 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ViewProjection {
    /// Projection matrix (view to clip space).
    pub projection: Mat4,
    /// View matrix (world to view space).
    pub view: Mat4,
}

impl ViewProjection {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates a uniform value from matrices.
    pub fn new(projection: Mat4, view: Mat4) -> Self {
        Self { projection, view }
    }

    /// Creates the uniform value for a camera drawing into a `width` x `height` target.
    pub fn from_camera(camera: &Camera, width: u32, height: u32) -> Self {
        Self::new(
            camera.projection_matrix(width, height),
            camera.view_matrix(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_view_projection_size() {
        // 2 Mat4 (2 * 64) = 128 bytes
        assert_eq!(ViewProjection::SIZE, 128);
    }

    #[test]
    fn test_view_projection_alignment() {
        assert_eq!(std::mem::align_of::<ViewProjection>(), 16);
    }

    #[test]
    fn test_projection_comes_first() {
        let ubo = ViewProjection::new(Mat4::from_scale(Vec3::splat(2.0)), Mat4::IDENTITY);
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&ubo));
        assert_eq!(floats.len(), 32);
        assert_eq!(floats[0], 2.0);
        assert_eq!(floats[16], 1.0);
    }

    #[test]
    fn test_bytes_round_trip() {
        let camera = Camera::default();
        let ubo = ViewProjection::from_camera(&camera, 800, 600);

        let bytes = bytemuck::bytes_of(&ubo).to_vec();
        let back: ViewProjection = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(back, ubo);
    }

    #[test]
    fn test_from_camera_flips_y() {
        let ubo = ViewProjection::from_camera(&Camera::default(), 500, 500);
        assert!(ubo.projection.y_axis.y < 0.0);
        assert_eq!(ubo.view, Camera::default().view_matrix());
    }
}
