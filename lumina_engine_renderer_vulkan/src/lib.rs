/*!
# Lumina Vulkan backend

Vulkan implementation of the `GraphicsDevice` and `Swapchain` traits of
`lumina_engine`, built on `ash` with `gpu-allocator` for memory.

```ignore
let context = Arc::new(VulkanContext::new(&window, &config)?);
let device = Arc::new(VulkanGraphicsDevice::new(context.clone())?);
let swapchain = VulkanSwapchain::new(context, extent, config.vsync)?;
let ctx = GraphicsContext::new(device, &config)?;
let mut renderer = Renderer::new(&ctx, config, Box::new(swapchain));
```

Validation layers are compiled in with the `vulkan-validation` feature.
*/

mod vulkan_context;
mod vulkan_device;
mod vulkan_format;
mod vulkan_swapchain;

#[cfg(feature = "vulkan-validation")]
mod debug;

pub use vulkan_context::VulkanContext;
pub use vulkan_device::VulkanGraphicsDevice;
pub use vulkan_swapchain::VulkanSwapchain;

#[cfg(feature = "vulkan-validation")]
pub use debug::{print_validation_stats_report, validation_stats, ValidationStats};
