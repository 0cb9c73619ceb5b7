/// Camera uniform - the per-frame camera block read by the shaders.
///
/// A passive container: the caller computes view and projection, the
/// renderer copies the block into the camera uniform buffer of the current
/// frame slot before any pass records.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// GPU layout of the camera block (std140 compatible)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    /// World-space eye position (w = 1)
    pub position: Vec4,
}

impl CameraUniform {
    pub fn new(view: Mat4, projection: Mat4, position: Vec3) -> Self {
        Self {
            view,
            projection,
            view_projection: projection * view,
            position: position.extend(1.0),
        }
    }

    /// Right-handed look-at camera with a Vulkan-style perspective
    /// projection (depth 0..1, Y pointing down in clip space)
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3, fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Self {
        let view = Mat4::look_at_rh(eye, target, up);
        let mut projection = Mat4::perspective_rh(fov_y_radians, aspect, near, far);
        projection.y_axis.y *= -1.0;
        Self::new(view, projection, eye)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec3::ZERO)
    }
}
