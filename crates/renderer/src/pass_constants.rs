//! Per-pass constant data shared by every draw in a frame.
//!
//! The layout must match the `PassConstants` uniform block of the shaders
//! bound at root parameter 0 (WGSL uniform address space rules).

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

use gpuframe_rhi::Extent2D;

/// Camera and timing data for one frame.
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Offset 128: view-projection matrix (64 bytes)
/// - Offset 192: eye position (12 bytes) + total time (4 bytes)
/// - Offset 208: render target size (8 bytes) + its reciprocal (8 bytes)
/// - Offset 224: near plane, far plane, delta time, padding (16 bytes)
/// - Total size: 240 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PassConstants {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub eye_position: Vec3,
    /// Seconds since the application started.
    pub total_time: f32,
    pub render_target_size: Vec2,
    pub inv_render_target_size: Vec2,
    pub near_z: f32,
    pub far_z: f32,
    /// Seconds since the previous frame.
    pub delta_time: f32,
    pub _padding: f32,
}

impl Default for PassConstants {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
            eye_position: Vec3::ZERO,
            total_time: 0.0,
            render_target_size: Vec2::ONE,
            inv_render_target_size: Vec2::ONE,
            near_z: 0.0,
            far_z: 1.0,
            delta_time: 0.0,
            _padding: 0.0,
        }
    }
}

impl PassConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Builds the constants for a camera at `eye` looking at `target` with a
    /// right-handed, zero-to-one depth perspective projection.
    pub fn look_at(
        eye: Vec3,
        target: Vec3,
        fov_y_radians: f32,
        render_target: Extent2D,
        near_z: f32,
        far_z: f32,
    ) -> Self {
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        let projection =
            Mat4::perspective_rh(fov_y_radians, render_target.aspect_ratio(), near_z, far_z);
        let size = Vec2::new(
            render_target.width.max(1) as f32,
            render_target.height.max(1) as f32,
        );

        Self {
            view,
            projection,
            view_projection: projection * view,
            eye_position: eye,
            render_target_size: size,
            inv_render_target_size: size.recip(),
            near_z,
            far_z,
            ..Self::default()
        }
    }

    /// Sets the frame timing fields.
    pub fn with_time(mut self, total_time: f32, delta_time: f32) -> Self {
        self.total_time = total_time;
        self.delta_time = delta_time;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_constants_size() {
        // 3 Mat4 (192) + 3 x 16-byte rows
        assert_eq!(PassConstants::SIZE, 240);
        assert_eq!(std::mem::align_of::<PassConstants>(), 16);
    }

    #[test]
    fn test_look_at_combines_matrices() {
        let eye = Vec3::new(0.0, 1.0, 5.0);
        let constants = PassConstants::look_at(
            eye,
            Vec3::ZERO,
            45.0_f32.to_radians(),
            Extent2D::new(1280, 720),
            0.1,
            100.0,
        );
        assert_eq!(
            constants.view_projection,
            constants.projection * constants.view
        );
        assert_eq!(constants.eye_position, eye);
        assert_eq!(constants.render_target_size, Vec2::new(1280.0, 720.0));
        assert!((constants.inv_render_target_size.x - 1.0 / 1280.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_render_target_does_not_divide_by_zero() {
        let constants = PassConstants::look_at(
            Vec3::Z,
            Vec3::ZERO,
            1.0,
            Extent2D::new(0, 0),
            0.1,
            10.0,
        );
        assert!(constants.inv_render_target_size.is_finite());
        assert!(constants.projection.is_finite());
    }

    #[test]
    fn test_with_time() {
        let constants = PassConstants::default().with_time(2.5, 0.016);
        assert_eq!(constants.total_time, 2.5);
        assert_eq!(constants.delta_time, 0.016);
        assert_eq!(bytemuck::bytes_of(&constants).len(), PassConstants::SIZE);
    }
}
