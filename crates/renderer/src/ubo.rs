//! Uniform buffer object definitions for shaders.
//!
//! The layout must match the vertex shader's uniform block exactly: three
//! column-major `mat4`s at binding 0.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Rotation speed of the model about the Z axis.
pub const ROTATION_DEGREES_PER_SEC: f32 = 90.0;

/// Vertical field of view of the projection.
pub const FOV_Y_DEGREES: f32 = 45.0;

/// Model/view/projection uniform block.
///
/// # Memory Layout
///
/// - Offset 0: model (64 bytes)
/// - Offset 64: view (64 bytes)
/// - Offset 128: proj (64 bytes)
/// - Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformBufferObject {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Transforms for the demo scene `elapsed_secs` after startup.
    ///
    /// The model spins about Z, the camera looks at the origin from
    /// (2, 2, 2), and the projection's Y axis is flipped for Vulkan clip
    /// space.
    pub fn spinning(elapsed_secs: f32, aspect_ratio: f32) -> Self {
        let model =
            Mat4::from_rotation_z((elapsed_secs * ROTATION_DEGREES_PER_SEC).to_radians());
        let view = Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Z);

        let mut proj =
            Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect_ratio, 0.1, 10.0);
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::*;

    #[test]
    fn test_ubo_size_and_alignment() {
        assert_eq!(UniformBufferObject::SIZE, 192);
        assert_eq!(std::mem::align_of::<UniformBufferObject>(), 16);
        assert_eq!(
            bytemuck::bytes_of(&UniformBufferObject::default()).len(),
            192
        );
    }

    #[test]
    fn test_model_rotation_speed() {
        let start = UniformBufferObject::spinning(0.0, 1.0);
        assert!(start.model.abs_diff_eq(Mat4::IDENTITY, 1e-6));

        // One second is a quarter turn: X maps to Y
        let later = UniformBufferObject::spinning(1.0, 1.0);
        let x = later.model * Vec4::X;
        assert!(x.abs_diff_eq(Vec4::Y, 1e-5));
    }

    #[test]
    fn test_projection_flips_y() {
        let ubo = UniformBufferObject::spinning(0.0, 4.0 / 3.0);
        assert!(ubo.proj.y_axis.y < 0.0);
        assert!(ubo.proj.x_axis.x > 0.0);
    }

    #[test]
    fn test_view_looks_at_origin() {
        let ubo = UniformBufferObject::spinning(0.0, 1.0);
        // The origin lands on the camera's forward axis
        let origin = ubo.view * Vec4::W;
        assert!(origin.x.abs() < 1e-5);
        assert!(origin.y.abs() < 1e-5);
        assert!(origin.z < 0.0);
    }
}
