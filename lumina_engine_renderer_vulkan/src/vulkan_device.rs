/// VulkanGraphicsDevice - Vulkan implementation of the GraphicsDevice trait
///
/// Engine handles are the raw Vulkan handles. Objects that carry more than
/// a handle (memory allocations, shader entry points) are kept in an
/// internal table keyed by that raw value.

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use lumina_engine::lumina::graphics_device::{
    BindingResource, BufferDesc, FramebufferDesc, GraphicsDevice, ImageDesc, ImageHandles,
    MaterialLayoutDesc, MaterialLayoutHandles, MaterialWrite, MemoryLocation, NativeHandle,
    PipelineDesc, RenderPassBegin, RenderPassDesc, ShaderDesc, ShaderStage, ShaderStageFlags,
    SubmitInfo, AttachmentDesc,
};
use lumina_engine::lumina::{Error, Result};
use lumina_engine::{engine_bail, engine_err, engine_error, engine_trace, engine_warn};
use rustc_hash::FxHashMap;
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::vulkan_context::VulkanContext;
use crate::vulkan_format::*;

const DESCRIPTOR_POOL_MAX_SETS: u32 = 1024;

fn native<H: Handle>(handle: H) -> NativeHandle {
    NativeHandle::from_raw(handle.as_raw())
}

fn raw<H: Handle>(handle: NativeHandle) -> H {
    H::from_raw(handle.as_raw())
}

/// Map a failed Vulkan call to an engine error (out-of-memory results keep
/// their own variant)
fn vk_error(action: &str, e: vk::Result) -> Error {
    match e {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            engine_error!("lumina::vulkan", "{}: {:?}", action, e);
            Error::OutOfMemory
        }
        _ => engine_err!("lumina::vulkan", "{}: {:?}", action, e),
    }
}

fn allocation_error(name: &str, e: gpu_allocator::AllocationError) -> Error {
    match e {
        gpu_allocator::AllocationError::OutOfMemory => {
            engine_error!("lumina::vulkan", "Out of GPU memory allocating '{}'", name);
            Error::OutOfMemory
        }
        e => engine_err!("lumina::vulkan", "Failed to allocate memory for '{}': {:?}", name, e),
    }
}

struct BufferEntry {
    buffer: vk::Buffer,
    allocation: Allocation,
    size: u64,
}

struct ImageEntry {
    image: vk::Image,
    view: vk::ImageView,
    allocation: Allocation,
}

struct ShaderEntry {
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

#[derive(Default)]
struct Objects {
    buffers: FxHashMap<u64, BufferEntry>,
    images: FxHashMap<u64, ImageEntry>,
    shaders: FxHashMap<u64, ShaderEntry>,
}

impl Objects {
    /// Shader module of the expected stage
    fn shader(&self, handle: NativeHandle, expected: ShaderStage) -> Result<&ShaderEntry> {
        let entry = self
            .shaders
            .get(&handle.as_raw())
            .ok_or_else(|| Error::InvalidResource(format!("Unknown shader {:?}", handle)))?;
        if entry.stage != expected {
            return Err(Error::InvalidResource(format!(
                "Expected a {:?} shader, {:?} is {:?}", expected, handle, entry.stage
            )));
        }
        Ok(entry)
    }
}

/// Descriptor info storage kept alive while the writes reference it
enum DescriptorInfo {
    Buffer([vk::DescriptorBufferInfo; 1]),
    Image([vk::DescriptorImageInfo; 1]),
}

/// Vulkan graphics device
///
/// Command buffers come from a single pool; allocation and recording are
/// externally synchronized by the render thread.
pub struct VulkanGraphicsDevice {
    context: Arc<VulkanContext>,

    /// Memory allocator (ManuallyDrop to free memory before the device goes away)
    allocator: ManuallyDrop<Mutex<Allocator>>,
    objects: Mutex<Objects>,

    command_pool: vk::CommandPool,
    descriptor_pool: vk::DescriptorPool,
    /// Linear clamp-to-edge sampler used by every sampled image binding
    sampler: vk::Sampler,
}

impl VulkanGraphicsDevice {
    /// Create the device-level objects on top of an existing context
    pub fn new(context: Arc<VulkanContext>) -> Result<Self> {
        unsafe {
            let device = &context.device;

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: context.instance.clone(),
                device: device.clone(),
                physical_device: context.physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!("lumina::vulkan", "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create GPU allocator: {:?}", e))
            })?;

            let pool_info = vk::CommandPoolCreateInfo::default()
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
                .queue_family_index(context.queue_family);
            let command_pool = device
                .create_command_pool(&pool_info, None)
                .map_err(|e| vk_error("Failed to create command pool", e))?;

            let pool_sizes = [
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    descriptor_count: 2048,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: 1024,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::STORAGE_BUFFER,
                    descriptor_count: 1024,
                },
            ];
            let descriptor_pool_info = vk::DescriptorPoolCreateInfo::default()
                .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
                .max_sets(DESCRIPTOR_POOL_MAX_SETS)
                .pool_sizes(&pool_sizes);
            let descriptor_pool = match device.create_descriptor_pool(&descriptor_pool_info, None) {
                Ok(pool) => pool,
                Err(e) => {
                    device.destroy_command_pool(command_pool, None);
                    return Err(vk_error("Failed to create descriptor pool", e));
                }
            };

            let sampler_info = vk::SamplerCreateInfo::default()
                .mag_filter(vk::Filter::LINEAR)
                .min_filter(vk::Filter::LINEAR)
                .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
                .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .max_lod(0.0);
            let sampler = match device.create_sampler(&sampler_info, None) {
                Ok(sampler) => sampler,
                Err(e) => {
                    device.destroy_descriptor_pool(descriptor_pool, None);
                    device.destroy_command_pool(command_pool, None);
                    return Err(vk_error("Failed to create sampler", e));
                }
            };

            Ok(Self {
                context,
                allocator: ManuallyDrop::new(Mutex::new(allocator)),
                objects: Mutex::new(Objects::default()),
                command_pool,
                descriptor_pool,
                sampler,
            })
        }
    }

    /// The shared Vulkan context
    pub fn context(&self) -> &Arc<VulkanContext> {
        &self.context
    }

    fn device(&self) -> &ash::Device {
        &self.context.device
    }

    fn objects(&self) -> Result<MutexGuard<'_, Objects>> {
        self.objects
            .lock()
            .map_err(|_| engine_err!("lumina::vulkan", "Object table lock poisoned"))
    }

    fn allocator(&self) -> Result<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| engine_err!("lumina::vulkan", "Allocator lock poisoned"))
    }

    fn free_allocation(&self, allocation: Allocation) {
        match self.allocator() {
            Ok(mut allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    engine_warn!("lumina::vulkan", "Failed to free allocation: {:?}", e);
                }
            }
            Err(_) => engine_warn!("lumina::vulkan", "Leaking allocation, allocator unavailable"),
        }
    }

    fn attachment_description(attachment: &AttachmentDesc) -> vk::AttachmentDescription {
        vk::AttachmentDescription::default()
            .format(texture_format_to_vk(attachment.format))
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(load_op_to_vk(attachment.load_op))
            .store_op(store_op_to_vk(attachment.store_op))
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(image_layout_to_vk(attachment.initial_layout))
            .final_layout(image_layout_to_vk(attachment.final_layout))
    }
}

impl GraphicsDevice for VulkanGraphicsDevice {
    // ===== BUFFERS =====

    fn create_buffer(&self, name: &str, desc: &BufferDesc) -> Result<NativeHandle> {
        if desc.size == 0 {
            return Err(Error::InvalidResource(format!("Buffer '{}' has zero size", name)));
        }

        unsafe {
            let device = self.device();
            let buffer_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(buffer_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            let buffer = device
                .create_buffer(&buffer_info, None)
                .map_err(|e| vk_error(&format!("Failed to create buffer '{}'", name), e))?;

            let requirements = device.get_buffer_memory_requirements(buffer);
            let allocation = self.allocator()?.allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: memory_location_to_gpu_allocator(desc.location),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    device.destroy_buffer(buffer, None);
                    return Err(allocation_error(name, e));
                }
            };

            if let Err(e) = device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                self.free_allocation(allocation);
                device.destroy_buffer(buffer, None);
                return Err(vk_error(&format!("Failed to bind memory of buffer '{}'", name), e));
            }

            self.objects()?.buffers.insert(buffer.as_raw(), BufferEntry {
                buffer,
                allocation,
                size: desc.size,
            });
            engine_trace!("lumina::vulkan", "Created buffer '{}' ({} bytes, {:?})",
                name, desc.size, desc.location);
            Ok(native(buffer))
        }
    }

    fn destroy_buffer(&self, buffer: NativeHandle) -> Result<()> {
        let entry = self
            .objects()?
            .buffers
            .remove(&buffer.as_raw())
            .ok_or_else(|| Error::InvalidResource(format!("Unknown buffer {:?}", buffer)))?;
        unsafe {
            self.device().destroy_buffer(entry.buffer, None);
        }
        self.free_allocation(entry.allocation);
        Ok(())
    }

    fn write_buffer(&self, buffer: NativeHandle, offset: u64, data: &[u8]) -> Result<()> {
        let mut objects = self.objects()?;
        let entry = objects
            .buffers
            .get_mut(&buffer.as_raw())
            .ok_or_else(|| Error::InvalidResource(format!("Unknown buffer {:?}", buffer)))?;

        let end = offset + data.len() as u64;
        if end > entry.size {
            engine_bail!("lumina::vulkan",
                "Write of {} bytes at offset {} exceeds buffer size {}", data.len(), offset, entry.size);
        }
        let mapped = entry
            .allocation
            .mapped_slice_mut()
            .ok_or_else(|| Error::InvalidState("Buffer is not host visible".to_string()))?;
        mapped[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: NativeHandle, offset: u64, len: u64) -> Result<Vec<u8>> {
        let objects = self.objects()?;
        let entry = objects
            .buffers
            .get(&buffer.as_raw())
            .ok_or_else(|| Error::InvalidResource(format!("Unknown buffer {:?}", buffer)))?;

        let end = offset + len;
        if end > entry.size {
            engine_bail!("lumina::vulkan",
                "Read of {} bytes at offset {} exceeds buffer size {}", len, offset, entry.size);
        }
        let mapped = entry
            .allocation
            .mapped_slice()
            .ok_or_else(|| Error::InvalidState("Buffer is not host visible".to_string()))?;
        Ok(mapped[offset as usize..end as usize].to_vec())
    }

    // ===== IMAGES =====

    fn create_image(&self, name: &str, desc: &ImageDesc) -> Result<ImageHandles> {
        if desc.extent.is_empty() {
            return Err(Error::InvalidResource(format!(
                "Image '{}' has an empty extent {}x{}", name, desc.extent.width, desc.extent.height
            )));
        }

        unsafe {
            let device = self.device();
            let format = texture_format_to_vk(desc.format);
            let image_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D {
                    width: desc.extent.width,
                    height: desc.extent.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(image_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            let image = device
                .create_image(&image_info, None)
                .map_err(|e| vk_error(&format!("Failed to create image '{}'", name), e))?;

            let requirements = device.get_image_memory_requirements(image);
            let allocation = self.allocator()?.allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: memory_location_to_gpu_allocator(MemoryLocation::GpuOnly),
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    device.destroy_image(image, None);
                    return Err(allocation_error(name, e));
                }
            };

            if let Err(e) = device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                self.free_allocation(allocation);
                device.destroy_image(image, None);
                return Err(vk_error(&format!("Failed to bind memory of image '{}'", name), e));
            }

            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect_of(desc.format),
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = match device.create_image_view(&view_info, None) {
                Ok(view) => view,
                Err(e) => {
                    self.free_allocation(allocation);
                    device.destroy_image(image, None);
                    return Err(vk_error(&format!("Failed to create view of image '{}'", name), e));
                }
            };

            self.objects()?.images.insert(image.as_raw(), ImageEntry { image, view, allocation });
            engine_trace!("lumina::vulkan", "Created image '{}' ({}x{}, {:?})",
                name, desc.extent.width, desc.extent.height, desc.format);
            Ok(ImageHandles {
                image: native(image),
                view: native(view),
            })
        }
    }

    fn destroy_image(&self, image: ImageHandles) -> Result<()> {
        let entry = self
            .objects()?
            .images
            .remove(&image.image.as_raw())
            .ok_or_else(|| Error::InvalidResource(format!("Unknown image {:?}", image.image)))?;
        unsafe {
            self.device().destroy_image_view(entry.view, None);
            self.device().destroy_image(entry.image, None);
        }
        self.free_allocation(entry.allocation);
        Ok(())
    }

    // ===== RENDER PASSES / FRAMEBUFFERS =====

    fn create_render_pass(&self, name: &str, desc: &RenderPassDesc) -> Result<NativeHandle> {
        let mut attachments = Vec::with_capacity(desc.color_attachments.len() + 1);
        let mut color_refs = Vec::with_capacity(desc.color_attachments.len());
        for attachment in &desc.color_attachments {
            color_refs.push(vk::AttachmentReference {
                attachment: attachments.len() as u32,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            });
            attachments.push(Self::attachment_description(attachment));
        }
        let depth_ref = desc.depth_attachment.as_ref().map(|attachment| {
            let reference = vk::AttachmentReference {
                attachment: attachments.len() as u32,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            };
            attachments.push(Self::attachment_description(attachment));
            reference
        });

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpasses = [subpass];

        // Attachments written here are sampled by later passes
        let dependencies = [
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
                        | vk::PipelineStageFlags::FRAGMENT_SHADER,
                )
                .dst_stage_mask(
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                )
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                ),
            vk::SubpassDependency::default()
                .src_subpass(0)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                )
                .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                .src_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                )
                .dst_access_mask(vk::AccessFlags::SHADER_READ),
        ];

        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        let render_pass = unsafe {
            self.device()
                .create_render_pass(&render_pass_info, None)
                .map_err(|e| vk_error(&format!("Failed to create render pass '{}'", name), e))?
        };
        engine_trace!("lumina::vulkan", "Created render pass '{}' ({} attachments)", name, attachments.len());
        Ok(native(render_pass))
    }

    fn destroy_render_pass(&self, render_pass: NativeHandle) -> Result<()> {
        unsafe { self.device().destroy_render_pass(raw(render_pass), None) };
        Ok(())
    }

    fn create_framebuffer(&self, name: &str, desc: &FramebufferDesc) -> Result<NativeHandle> {
        let attachments: Vec<vk::ImageView> = desc.attachments.iter().map(|&view| raw(view)).collect();
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(raw(desc.render_pass))
            .attachments(&attachments)
            .width(desc.extent.width)
            .height(desc.extent.height)
            .layers(1);
        let framebuffer = unsafe {
            self.device()
                .create_framebuffer(&framebuffer_info, None)
                .map_err(|e| vk_error(&format!("Failed to create framebuffer '{}'", name), e))?
        };
        Ok(native(framebuffer))
    }

    fn destroy_framebuffer(&self, framebuffer: NativeHandle) -> Result<()> {
        unsafe { self.device().destroy_framebuffer(raw(framebuffer), None) };
        Ok(())
    }

    // ===== SHADERS =====

    fn create_shader(&self, name: &str, desc: &ShaderDesc) -> Result<NativeHandle> {
        if desc.code.is_empty() {
            engine_bail!("lumina::vulkan", "Shader '{}' has no code", name);
        }
        let entry_point = CString::new(desc.entry_point.as_str())
            .map_err(|e| engine_err!("lumina::vulkan", "Invalid entry point for shader '{}': {:?}", name, e))?;

        let module_info = vk::ShaderModuleCreateInfo::default().code(&desc.code);
        let module = unsafe {
            self.device()
                .create_shader_module(&module_info, None)
                .map_err(|e| vk_error(&format!("Failed to create shader '{}'", name), e))?
        };
        self.objects()?.shaders.insert(module.as_raw(), ShaderEntry {
            module,
            stage: desc.stage,
            entry_point,
        });
        engine_trace!("lumina::vulkan", "Created {:?} shader '{}'", desc.stage, name);
        Ok(native(module))
    }

    fn destroy_shader(&self, shader: NativeHandle) -> Result<()> {
        let entry = self
            .objects()?
            .shaders
            .remove(&shader.as_raw())
            .ok_or_else(|| Error::InvalidResource(format!("Unknown shader {:?}", shader)))?;
        unsafe { self.device().destroy_shader_module(entry.module, None) };
        Ok(())
    }

    // ===== MATERIALS =====

    fn create_material_layout(&self, name: &str, desc: &MaterialLayoutDesc) -> Result<MaterialLayoutHandles> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
            .bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(binding_type_to_vk(binding.binding_type))
                    .descriptor_count(1)
                    .stage_flags(stage_flags_to_vk(binding.stages))
            })
            .collect();
        let push_constant_ranges: Vec<vk::PushConstantRange> = desc
            .push_constants
            .iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: stage_flags_to_vk(range.stages),
                offset: 0,
                size: range.size,
            })
            .collect();

        unsafe {
            let device = self.device();
            let set_layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
            let set_layout = device
                .create_descriptor_set_layout(&set_layout_info, None)
                .map_err(|e| vk_error(&format!("Failed to create descriptor set layout '{}'", name), e))?;

            let set_layouts = [set_layout];
            let pipeline_layout_info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(&set_layouts)
                .push_constant_ranges(&push_constant_ranges);
            let pipeline_layout = match device.create_pipeline_layout(&pipeline_layout_info, None) {
                Ok(layout) => layout,
                Err(e) => {
                    device.destroy_descriptor_set_layout(set_layout, None);
                    return Err(vk_error(&format!("Failed to create pipeline layout '{}'", name), e));
                }
            };

            Ok(MaterialLayoutHandles {
                set_layout: native(set_layout),
                pipeline_layout: native(pipeline_layout),
            })
        }
    }

    fn destroy_material_layout(&self, layout: MaterialLayoutHandles) -> Result<()> {
        unsafe {
            self.device().destroy_pipeline_layout(raw(layout.pipeline_layout), None);
            self.device().destroy_descriptor_set_layout(raw(layout.set_layout), None);
        }
        Ok(())
    }

    fn create_material(&self, name: &str, layout: MaterialLayoutHandles) -> Result<NativeHandle> {
        let set_layouts = [raw::<vk::DescriptorSetLayout>(layout.set_layout)];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(&set_layouts);
        let sets = unsafe {
            self.device()
                .allocate_descriptor_sets(&allocate_info)
                .map_err(|e| vk_error(&format!("Failed to allocate descriptor set '{}'", name), e))?
        };
        sets.into_iter()
            .next()
            .map(native)
            .ok_or_else(|| engine_err!("lumina::vulkan", "No descriptor set allocated for '{}'", name))
    }

    fn update_material(&self, material: NativeHandle, writes: &[MaterialWrite]) -> Result<()> {
        let infos: Vec<(u32, vk::DescriptorType, DescriptorInfo)> = writes
            .iter()
            .map(|write| match write.resource {
                BindingResource::UniformBuffer { buffer, offset, range } => (
                    write.binding,
                    vk::DescriptorType::UNIFORM_BUFFER,
                    DescriptorInfo::Buffer([vk::DescriptorBufferInfo {
                        buffer: raw(buffer),
                        offset,
                        range,
                    }]),
                ),
                BindingResource::StorageBuffer { buffer, offset, range } => (
                    write.binding,
                    vk::DescriptorType::STORAGE_BUFFER,
                    DescriptorInfo::Buffer([vk::DescriptorBufferInfo {
                        buffer: raw(buffer),
                        offset,
                        range,
                    }]),
                ),
                BindingResource::SampledImage { view, layout } => (
                    write.binding,
                    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    DescriptorInfo::Image([vk::DescriptorImageInfo {
                        sampler: self.sampler,
                        image_view: raw(view),
                        image_layout: image_layout_to_vk(layout),
                    }]),
                ),
            })
            .collect();

        let set: vk::DescriptorSet = raw(material);
        let descriptor_writes: Vec<vk::WriteDescriptorSet> = infos
            .iter()
            .map(|(binding, descriptor_type, info)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(*descriptor_type);
                match info {
                    DescriptorInfo::Buffer(buffer_info) => write.buffer_info(buffer_info),
                    DescriptorInfo::Image(image_info) => write.image_info(image_info),
                }
            })
            .collect();

        unsafe { self.device().update_descriptor_sets(&descriptor_writes, &[]) };
        Ok(())
    }

    fn destroy_material(&self, material: NativeHandle) -> Result<()> {
        unsafe {
            self.device()
                .free_descriptor_sets(self.descriptor_pool, &[raw(material)])
                .map_err(|e| vk_error("Failed to free descriptor set", e))
        }
    }

    // ===== PIPELINES =====

    fn create_pipeline(&self, name: &str, desc: &PipelineDesc) -> Result<NativeHandle> {
        let objects = self.objects()?;
        let vertex = objects.shader(desc.vertex_shader, ShaderStage::Vertex)?;
        let fragment = objects.shader(desc.fragment_shader, ShaderStage::Fragment)?;

        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(shader_stage_to_vk(vertex.stage))
                .module(vertex.module)
                .name(&vertex.entry_point),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(shader_stage_to_vk(fragment.stage))
                .module(fragment.module)
                .name(&fragment.entry_point),
        ];

        let (vertex_bindings, vertex_attributes) = match &desc.vertex_input {
            Some(input) => (
                vec![vk::VertexInputBindingDescription {
                    binding: 0,
                    stride: input.stride,
                    input_rate: vk::VertexInputRate::VERTEX,
                }],
                input
                    .attributes
                    .iter()
                    .map(|attribute| vk::VertexInputAttributeDescription {
                        location: attribute.location,
                        binding: 0,
                        format: vertex_format_to_vk(attribute.format),
                        offset: attribute.offset,
                    })
                    .collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);
        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: desc.extent.width as f32,
            height: desc.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D {
                width: desc.extent.width,
                height: desc.extent.height,
            },
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);
        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_test)
            .depth_write_enable(desc.depth_test)
            .depth_compare_op(vk::CompareOp::LESS);

        let blend_attachments = vec![
            vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false);
            desc.color_attachment_count as usize
        ];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .attachments(&blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .layout(raw(desc.pipeline_layout))
            .render_pass(raw(desc.render_pass))
            .subpass(0);

        let pipelines = unsafe {
            self.device()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| vk_error(&format!("Failed to create pipeline '{}'", name), e))?
        };
        let pipeline = pipelines
            .into_iter()
            .next()
            .ok_or_else(|| engine_err!("lumina::vulkan", "No pipeline created for '{}'", name))?;
        engine_trace!("lumina::vulkan", "Created pipeline '{}' ({}x{})",
            name, desc.extent.width, desc.extent.height);
        Ok(native(pipeline))
    }

    fn destroy_pipeline(&self, pipeline: NativeHandle) -> Result<()> {
        unsafe { self.device().destroy_pipeline(raw(pipeline), None) };
        Ok(())
    }

    // ===== SYNCHRONIZATION =====

    fn create_fence(&self, name: &str, signaled: bool) -> Result<NativeHandle> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence = unsafe {
            self.device()
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
                .map_err(|e| vk_error(&format!("Failed to create fence '{}'", name), e))?
        };
        Ok(native(fence))
    }

    fn destroy_fence(&self, fence: NativeHandle) -> Result<()> {
        unsafe { self.device().destroy_fence(raw(fence), None) };
        Ok(())
    }

    fn wait_for_fences(&self, fences: &[NativeHandle], timeout_ns: u64) -> Result<()> {
        if fences.is_empty() {
            return Ok(());
        }
        let fences: Vec<vk::Fence> = fences.iter().map(|&fence| raw(fence)).collect();
        unsafe {
            self.device()
                .wait_for_fences(&fences, true, timeout_ns)
                .map_err(|e| match e {
                    vk::Result::TIMEOUT => engine_err!("lumina::vulkan",
                        "Timed out after {} ns waiting for {} fence(s)", timeout_ns, fences.len()),
                    e => vk_error("Failed to wait for fences", e),
                })
        }
    }

    fn reset_fences(&self, fences: &[NativeHandle]) -> Result<()> {
        if fences.is_empty() {
            return Ok(());
        }
        let fences: Vec<vk::Fence> = fences.iter().map(|&fence| raw(fence)).collect();
        unsafe {
            self.device()
                .reset_fences(&fences)
                .map_err(|e| vk_error("Failed to reset fences", e))
        }
    }

    fn create_semaphore(&self, name: &str) -> Result<NativeHandle> {
        let semaphore = unsafe {
            self.device()
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(|e| vk_error(&format!("Failed to create semaphore '{}'", name), e))?
        };
        Ok(native(semaphore))
    }

    fn destroy_semaphore(&self, semaphore: NativeHandle) -> Result<()> {
        unsafe { self.device().destroy_semaphore(raw(semaphore), None) };
        Ok(())
    }

    // ===== COMMAND RECORDING =====

    fn allocate_command_buffer(&self, name: &str) -> Result<NativeHandle> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffers = unsafe {
            self.device()
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| vk_error(&format!("Failed to allocate command buffer '{}'", name), e))?
        };
        command_buffers
            .into_iter()
            .next()
            .map(native)
            .ok_or_else(|| engine_err!("lumina::vulkan", "No command buffer allocated for '{}'", name))
    }

    fn free_command_buffer(&self, command_buffer: NativeHandle) -> Result<()> {
        unsafe {
            self.device()
                .free_command_buffers(self.command_pool, &[raw(command_buffer)]);
        }
        Ok(())
    }

    fn begin_command_buffer(&self, command_buffer: NativeHandle) -> Result<()> {
        let command_buffer: vk::CommandBuffer = raw(command_buffer);
        unsafe {
            let device = self.device();
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| vk_error("Failed to reset command buffer", e))?;
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(|e| vk_error("Failed to begin command buffer", e))
        }
    }

    fn end_command_buffer(&self, command_buffer: NativeHandle) -> Result<()> {
        unsafe {
            self.device()
                .end_command_buffer(raw(command_buffer))
                .map_err(|e| vk_error("Failed to end command buffer", e))
        }
    }

    fn cmd_begin_render_pass(&self, command_buffer: NativeHandle, begin: &RenderPassBegin) -> Result<()> {
        let clear_values: Vec<vk::ClearValue> = begin.clear_values.iter().map(|&v| clear_value_to_vk(v)).collect();
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(raw(begin.render_pass))
            .framebuffer(raw(begin.framebuffer))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: begin.extent.width,
                    height: begin.extent.height,
                },
            })
            .clear_values(&clear_values);
        unsafe {
            self.device()
                .cmd_begin_render_pass(raw(command_buffer), &begin_info, vk::SubpassContents::INLINE);
        }
        Ok(())
    }

    fn cmd_end_render_pass(&self, command_buffer: NativeHandle) -> Result<()> {
        unsafe { self.device().cmd_end_render_pass(raw(command_buffer)) };
        Ok(())
    }

    fn cmd_bind_pipeline(&self, command_buffer: NativeHandle, pipeline: NativeHandle) -> Result<()> {
        unsafe {
            self.device()
                .cmd_bind_pipeline(raw(command_buffer), vk::PipelineBindPoint::GRAPHICS, raw(pipeline));
        }
        Ok(())
    }

    fn cmd_bind_material(
        &self,
        command_buffer: NativeHandle,
        pipeline_layout: NativeHandle,
        set_index: u32,
        material: NativeHandle,
    ) -> Result<()> {
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                raw(command_buffer),
                vk::PipelineBindPoint::GRAPHICS,
                raw(pipeline_layout),
                set_index,
                &[raw(material)],
                &[],
            );
        }
        Ok(())
    }

    fn cmd_bind_vertex_buffer(&self, command_buffer: NativeHandle, buffer: NativeHandle, offset: u64) -> Result<()> {
        unsafe {
            self.device()
                .cmd_bind_vertex_buffers(raw(command_buffer), 0, &[raw(buffer)], &[offset]);
        }
        Ok(())
    }

    fn cmd_bind_index_buffer(&self, command_buffer: NativeHandle, buffer: NativeHandle, offset: u64) -> Result<()> {
        unsafe {
            self.device()
                .cmd_bind_index_buffer(raw(command_buffer), raw(buffer), offset, vk::IndexType::UINT32);
        }
        Ok(())
    }

    fn cmd_push_constants(
        &self,
        command_buffer: NativeHandle,
        pipeline_layout: NativeHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        unsafe {
            self.device().cmd_push_constants(
                raw(command_buffer),
                raw(pipeline_layout),
                stage_flags_to_vk(stages),
                offset,
                data,
            );
        }
        Ok(())
    }

    fn cmd_draw(&self, command_buffer: NativeHandle, vertex_count: u32, first_vertex: u32) -> Result<()> {
        unsafe { self.device().cmd_draw(raw(command_buffer), vertex_count, 1, first_vertex, 0) };
        Ok(())
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: NativeHandle,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) -> Result<()> {
        unsafe {
            self.device()
                .cmd_draw_indexed(raw(command_buffer), index_count, 1, first_index, vertex_offset, 0);
        }
        Ok(())
    }

    // ===== QUEUE =====

    fn submit(&self, submit: &SubmitInfo) -> Result<()> {
        let command_buffers: Vec<vk::CommandBuffer> = submit.command_buffers.iter().map(|&cb| raw(cb)).collect();
        let wait_semaphores: Vec<vk::Semaphore> = submit.wait_semaphores.iter().map(|&s| raw(s)).collect();
        let wait_stages = vec![
            vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
            wait_semaphores.len()
        ];
        let signal_semaphores: Vec<vk::Semaphore> = submit.signal_semaphores.iter().map(|&s| raw(s)).collect();
        let fence = submit.fence.map(raw::<vk::Fence>).unwrap_or_else(vk::Fence::null);

        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semaphores);
        unsafe {
            self.device()
                .queue_submit(self.context.queue, &[submit_info], fence)
                .map_err(|e| vk_error("Failed to submit to the graphics queue", e))
        }
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device()
                .device_wait_idle()
                .map_err(|e| vk_error("Failed to wait for device idle", e))
        }
    }
}

impl Drop for VulkanGraphicsDevice {
    fn drop(&mut self) {
        unsafe {
            let device = &self.context.device;
            device.device_wait_idle().ok();

            // Objects the engine did not destroy
            if let Ok(mut objects) = self.objects.lock() {
                let leaked = objects.buffers.len() + objects.images.len() + objects.shaders.len();
                if leaked > 0 {
                    engine_warn!("lumina::vulkan", "Destroying {} objects still alive at device drop", leaked);
                }
                if let Ok(mut allocator) = self.allocator.lock() {
                    for (_, entry) in objects.buffers.drain() {
                        device.destroy_buffer(entry.buffer, None);
                        allocator.free(entry.allocation).ok();
                    }
                    for (_, entry) in objects.images.drain() {
                        device.destroy_image_view(entry.view, None);
                        device.destroy_image(entry.image, None);
                        allocator.free(entry.allocation).ok();
                    }
                }
                for (_, entry) in objects.shaders.drain() {
                    device.destroy_shader_module(entry.module, None);
                }
            }

            device.destroy_sampler(self.sampler, None);
            device.destroy_descriptor_pool(self.descriptor_pool, None);
            device.destroy_command_pool(self.command_pool, None);

            // Free memory pages before the context destroys the device
            ManuallyDrop::drop(&mut self.allocator);
        }
    }
}
