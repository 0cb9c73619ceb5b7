/// VulkanSwapchain - Vulkan implementation of the Swapchain trait
///
/// Owns the swapchain images and their views. Acquisition and presentation
/// report out-of-date/suboptimal states instead of failing so the renderer
/// can recreate at a frame boundary.

use ash::vk;
use ash::vk::Handle;
use lumina_engine::lumina::graphics_device::{
    AcquireResult, Extent2D, NativeHandle, PresentResult, Swapchain, TextureFormat,
};
use lumina_engine::lumina::{Error, Result};
use lumina_engine::{engine_bail, engine_err, engine_error, engine_info};
use std::sync::Arc;

use crate::vulkan_context::VulkanContext;
use crate::vulkan_format::vk_to_texture_format;

/// Surface format to render into: an sRGB 8-bit format when offered,
/// otherwise the first format the engine can describe
pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<(vk::SurfaceFormatKHR, TextureFormat)> {
    let known = |f: &vk::SurfaceFormatKHR| vk_to_texture_format(f.format).map(|format| (*f, format));

    formats
        .iter()
        .filter(|f| f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .find(|f| f.format == vk::Format::B8G8R8A8_SRGB || f.format == vk::Format::R8G8B8A8_SRGB)
        .and_then(known)
        .or_else(|| formats.iter().find_map(known))
}

/// FIFO with vsync; MAILBOX without it when offered, FIFO otherwise
/// (FIFO is always supported)
pub(crate) fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's own extent when it dictates one, else `requested` clamped
/// to the supported range
pub(crate) fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, requested: Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One image more than the minimum, within the maximum (0 means unbounded)
pub(crate) fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Vulkan swapchain
pub struct VulkanSwapchain {
    context: Arc<VulkanContext>,
    loader: ash::khr::swapchain::Device,

    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,

    surface_format: vk::SurfaceFormatKHR,
    format: TextureFormat,
    extent: vk::Extent2D,
    vsync: bool,
}

impl VulkanSwapchain {
    /// Create a swapchain for the context's surface
    ///
    /// `extent` is only used when the surface leaves the choice to the
    /// application (e.g. Wayland).
    pub fn new(context: Arc<VulkanContext>, extent: Extent2D, vsync: bool) -> Result<Self> {
        let loader = ash::khr::swapchain::Device::new(&context.instance, &context.device);
        let surface_formats = unsafe {
            context
                .surface_loader
                .get_physical_device_surface_formats(context.physical_device, context.surface)
                .map_err(|e| {
                    engine_error!("lumina::vulkan", "Failed to query surface formats: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface formats: {:?}", e))
                })?
        };
        let (surface_format, format) = choose_surface_format(&surface_formats).ok_or_else(|| {
            engine_error!("lumina::vulkan", "No supported surface format among {:?}", surface_formats);
            Error::InitializationFailed("No supported surface format".to_string())
        })?;

        let mut swapchain = Self {
            context,
            loader,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            surface_format,
            format,
            extent: vk::Extent2D::default(),
            vsync,
        };
        swapchain.build(extent)?;
        engine_info!("lumina::vulkan", "Swapchain created: {} images, {}x{}, {:?}",
            swapchain.images.len(), swapchain.extent.width, swapchain.extent.height, swapchain.format);
        Ok(swapchain)
    }

    /// (Re)build the swapchain, retiring the current one if any
    fn build(&mut self, requested: Extent2D) -> Result<()> {
        let context = &self.context;
        unsafe {
            let capabilities = context
                .surface_loader
                .get_physical_device_surface_capabilities(context.physical_device, context.surface)
                .map_err(|e| engine_err!("lumina::vulkan", "Failed to get surface capabilities: {:?}", e))?;
            let present_modes = context
                .surface_loader
                .get_physical_device_surface_present_modes(context.physical_device, context.surface)
                .map_err(|e| engine_err!("lumina::vulkan", "Failed to get present modes: {:?}", e))?;

            let extent = choose_extent(&capabilities, requested);
            if extent.width == 0 || extent.height == 0 {
                return Err(Error::InvalidState(format!(
                    "Cannot build a swapchain with an empty extent {}x{}", extent.width, extent.height
                )));
            }

            let old_swapchain = self.swapchain;
            let create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(context.surface)
                .min_image_count(choose_image_count(&capabilities))
                .image_format(self.surface_format.format)
                .image_color_space(self.surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(choose_present_mode(&present_modes, self.vsync))
                .clipped(true)
                .old_swapchain(old_swapchain);
            let swapchain = self
                .loader
                .create_swapchain(&create_info, None)
                .map_err(|e| engine_err!("lumina::vulkan", "Failed to create swapchain: {:?}", e))?;

            // The retired swapchain and its views are no longer needed
            self.destroy_views();
            if old_swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(old_swapchain, None);
            }
            self.swapchain = swapchain;
            self.extent = extent;

            self.images = self
                .loader
                .get_swapchain_images(swapchain)
                .map_err(|e| engine_err!("lumina::vulkan", "Failed to get swapchain images: {:?}", e))?;
            for &image in &self.images {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(self.surface_format.format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                let view = self
                    .context
                    .device
                    .create_image_view(&view_info, None)
                    .map_err(|e| engine_err!("lumina::vulkan", "Failed to create swapchain image view: {:?}", e))?;
                self.image_views.push(view);
            }
        }
        Ok(())
    }

    fn destroy_views(&mut self) {
        unsafe {
            for view in self.image_views.drain(..) {
                self.context.device.destroy_image_view(view, None);
            }
        }
    }
}

impl Swapchain for VulkanSwapchain {
    fn acquire_next_image(&mut self, signal_semaphore: NativeHandle, timeout_ns: u64) -> Result<AcquireResult> {
        let semaphore = vk::Semaphore::from_raw(signal_semaphore.as_raw());
        let result = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, timeout_ns, semaphore, vk::Fence::null())
        };
        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireResult::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
            Err(e) => Err(engine_err!("lumina::vulkan", "Failed to acquire next swapchain image: {:?}", e)),
        }
    }

    fn present(&mut self, image_index: u32, wait_semaphores: &[NativeHandle]) -> Result<PresentResult> {
        if image_index as usize >= self.images.len() {
            engine_bail!("lumina::vulkan",
                "present: image_index {} out of range (count: {})", image_index, self.images.len());
        }

        let wait_semaphores: Vec<vk::Semaphore> = wait_semaphores
            .iter()
            .map(|s| vk::Semaphore::from_raw(s.as_raw()))
            .collect();
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(self.context.queue, &present_info) } {
            Ok(false) => Ok(PresentResult::Presented),
            Ok(true) => Ok(PresentResult::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentResult::OutOfDate),
            Err(e) => Err(engine_err!("lumina::vulkan", "Failed to present swapchain image: {:?}", e)),
        }
    }

    fn recreate(&mut self, extent: Extent2D) -> Result<()> {
        if extent.is_empty() {
            return Err(Error::InvalidState(format!(
                "Cannot recreate the swapchain at {}x{}", extent.width, extent.height
            )));
        }
        self.build(extent)?;
        engine_info!("lumina::vulkan", "Swapchain recreated: {} images, {}x{}",
            self.images.len(), self.extent.width, self.extent.height);
        Ok(())
    }

    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn extent(&self) -> Extent2D {
        Extent2D::new(self.extent.width, self.extent.height)
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn image_view(&self, image_index: usize) -> NativeHandle {
        self.image_views
            .get(image_index)
            .map(|view| NativeHandle::from_raw(view.as_raw()))
            .unwrap_or(NativeHandle::NULL)
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        unsafe {
            self.context.device.device_wait_idle().ok();
        }
        self.destroy_views();
        unsafe {
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
