//! Scene module
//!
//! The renderable-object collection drawn by the G-Buffer pass and the
//! camera block uploaded each frame.

mod scene;
mod camera;

pub use scene::{Scene, RenderObject, RenderObjectKey};
pub use camera::CameraUniform;
