/// VulkanContext - instance, surface, physical/logical device and queue
///
/// Shared (via `Arc`) by the graphics device and the swapchain. It is the
/// last owner to go away and destroys the device, the surface, the debug
/// messenger and the instance, in that order.

use ash::vk;
use lumina_engine::lumina::{Error, Result, RendererConfig};
use lumina_engine::{engine_error, engine_info, engine_warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{CStr, CString};

pub struct VulkanContext {
    _entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,

    /// Queue used for graphics submissions and presentation
    pub(crate) queue: vk::Queue,
    pub(crate) queue_family: u32,

    pub(crate) surface: vk::SurfaceKHR,
    pub(crate) surface_loader: ash::khr::surface::Instance,

    #[cfg(feature = "vulkan-validation")]
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

fn init_error(what: &str, e: impl std::fmt::Debug) -> Error {
    engine_error!("lumina::vulkan", "{}: {:?}", what, e);
    Error::InitializationFailed(format!("{}: {:?}", what, e))
}

impl VulkanContext {
    /// Create the instance and a device able to render and present to
    /// `window`
    ///
    /// Validation layers are enabled when `config.enable_validation` is set
    /// and the crate is built with the `vulkan-validation` feature.
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &RendererConfig) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| init_error("Failed to load Vulkan library", e))?;

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|e| init_error("Invalid application name", e))?;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"Lumina")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_2);

            let display_handle = window.display_handle()
                .map_err(|e| init_error("Failed to get display handle", e))?;
            let window_handle = window.window_handle()
                .map_err(|e| init_error("Failed to get window handle", e))?;

            #[allow(unused_mut)]
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| init_error("Failed to get required extensions", e))?
                .to_vec();
            #[allow(unused_mut)]
            let mut layer_names: Vec<*const std::os::raw::c_char> = Vec::new();

            let validation = config.enable_validation && cfg!(feature = "vulkan-validation");
            if config.enable_validation && !validation {
                engine_warn!("lumina::vulkan",
                    "Validation requested but the crate was built without the vulkan-validation feature");
            }
            #[cfg(feature = "vulkan-validation")]
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
                layer_names.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
            }

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);
            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| init_error("Failed to create Vulkan instance", e))?;

            #[cfg(feature = "vulkan-validation")]
            let debug_messenger = if validation {
                Some(Self::create_debug_messenger(&entry, &instance)?)
            } else {
                None
            };

            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| init_error("Failed to create surface", e))?;
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            let (physical_device, queue_family) = Self::pick_physical_device(&instance, &surface_loader, surface)?;

            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family)
                .queue_priorities(&queue_priorities)];
            let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];
            let device_features = vk::PhysicalDeviceFeatures::default();
            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&device_features);
            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| init_error("Failed to create logical device", e))?;
            let queue = device.get_device_queue(queue_family, 0);

            let properties = instance.get_physical_device_properties(physical_device);
            let device_name = CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy();
            engine_info!("lumina::vulkan", "Using GPU '{}' (queue family {}, validation {})",
                device_name, queue_family, if validation { "on" } else { "off" });

            Ok(Self {
                _entry: entry,
                instance,
                physical_device,
                device,
                queue,
                queue_family,
                surface,
                surface_loader,
                #[cfg(feature = "vulkan-validation")]
                debug_messenger,
            })
        }
    }

    #[cfg(feature = "vulkan-validation")]
    unsafe fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        crate::debug::reset_validation_stats();
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(crate::debug::messenger_severity())
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));
        let messenger = debug_utils
            .create_debug_utils_messenger(&debug_info, None)
            .map_err(|e| init_error("Failed to create debug messenger", e))?;
        Ok((debug_utils, messenger))
    }

    /// First GPU with a queue family that supports graphics and presentation
    /// to `surface`, discrete GPUs first
    unsafe fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let mut physical_devices = instance
            .enumerate_physical_devices()
            .map_err(|e| init_error("Failed to enumerate physical devices", e))?;
        physical_devices.sort_by_key(|&pd| {
            instance.get_physical_device_properties(pd).device_type != vk::PhysicalDeviceType::DISCRETE_GPU
        });

        physical_devices
            .into_iter()
            .find_map(|pd| {
                instance
                    .get_physical_device_queue_family_properties(pd)
                    .iter()
                    .enumerate()
                    .find(|(index, family)| {
                        family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                            && surface_loader
                                .get_physical_device_surface_support(pd, *index as u32, surface)
                                .unwrap_or(false)
                    })
                    .map(|(index, _)| (pd, index as u32))
            })
            .ok_or_else(|| {
                engine_error!("lumina::vulkan", "No GPU with a graphics+present queue family found");
                Error::InitializationFailed("No suitable Vulkan GPU found".to_string())
            })
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            #[cfg(feature = "vulkan-validation")]
            if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}
