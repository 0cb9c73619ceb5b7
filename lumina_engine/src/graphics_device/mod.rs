/// Graphics device module - the backend-facing interface of the engine

pub mod graphics_device;
pub mod swapchain;

pub use graphics_device::*;
pub use swapchain::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;
