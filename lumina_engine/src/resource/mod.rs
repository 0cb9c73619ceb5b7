//! Resource module
//!
//! GPU-side objects owned by the resource registry. Each wrapper holds the
//! device it was created from and releases its backend object on drop.

mod resource;
pub mod buffer;
pub mod image;
pub mod pipeline;
pub mod sync;
pub mod command_buffer;

pub use resource::Resource;
pub use buffer::Buffer;
pub use image::Image;
pub use pipeline::{
    RenderPassObject, Framebuffer, Shader,
    MaterialLayout, Material, Pipeline,
};
pub use sync::{Fence, Semaphore};
pub use command_buffer::CommandBuffer;

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
