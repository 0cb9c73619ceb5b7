/// GraphicsDevice trait - the narrow interface between the render graph
/// and a graphics backend.
///
/// Every GPU object is addressed through an opaque `NativeHandle`. The
/// backend creates and destroys the native objects; the engine's resource
/// wrappers own the handles and call the matching `destroy_*` exactly once.

use std::fmt;
use std::sync::Arc;
use bitflags::bitflags;
use crate::error::{Error, Result};
use crate::config::RendererConfig;

// ============================================================================
// Native handles
// ============================================================================

/// Opaque backend object handle (a raw Vulkan handle for the Vulkan backend)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NativeHandle(u64);

impl NativeHandle {
    /// The null handle
    pub const NULL: NativeHandle = NativeHandle(0);

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Native(0x{:x})", self.0)
    }
}

/// Image + default view pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHandles {
    pub image: NativeHandle,
    pub view: NativeHandle,
}

/// Descriptor-set layout + pipeline layout pair backing a material layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialLayoutHandles {
    pub set_layout: NativeHandle,
    pub pipeline_layout: NativeHandle,
}

// ============================================================================
// Common types
// ============================================================================

/// 2D extent in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A zero-sized extent (minimized window)
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Pixel formats used by attachments and the swapchain
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R16G16B16A16_SFLOAT,
    R32G32B32A32_SFLOAT,
    D32_SFLOAT,
    D24_UNORM_S8_UINT,
}

impl TextureFormat {
    /// Whether the format is a depth (or depth/stencil) format
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::D32_SFLOAT | TextureFormat::D24_UNORM_S8_UINT)
    }
}

/// Vertex attribute formats
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
}

/// Image layouts tracked on images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    ColorAttachment,
    DepthStencilAttachment,
    ShaderReadOnly,
    PresentSrc,
    General,
}

/// Attachment load operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

/// Attachment store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// Where buffer memory lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLocation {
    /// Device-local, not mappable
    GpuOnly,
    /// Host-visible, written by the CPU every frame
    CpuToGpu,
}

/// Shader stage of a single module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const TRANSFER_DST = 1 << 4;
    }
}

bitflags! {
    /// Image usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const COLOR_ATTACHMENT = 1 << 0;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 1;
        const SAMPLED = 1 << 2;
        const TRANSFER_SRC = 1 << 3;
    }
}

bitflags! {
    /// Set of shader stages (binding and push constant visibility)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
    }
}

impl From<ShaderStage> for ShaderStageFlags {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
        }
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// Buffer descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub location: MemoryLocation,
}

/// Image descriptor (2D, single mip, single layer)
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDesc {
    pub extent: Extent2D,
    pub format: TextureFormat,
    pub usage: ImageUsage,
}

/// One attachment of a render pass object
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentDesc {
    pub format: TextureFormat,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub initial_layout: ImageLayout,
    pub final_layout: ImageLayout,
}

/// Render pass object descriptor (single subpass)
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDesc {
    pub color_attachments: Vec<AttachmentDesc>,
    pub depth_attachment: Option<AttachmentDesc>,
}

/// Framebuffer descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct FramebufferDesc {
    pub render_pass: NativeHandle,
    /// Image views, color attachments first then depth
    pub attachments: Vec<NativeHandle>,
    pub extent: Extent2D,
}

/// Shader module descriptor (SPIR-V words)
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderDesc {
    pub stage: ShaderStage,
    pub code: Vec<u32>,
    pub entry_point: String,
}

/// Descriptor binding type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingType {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler,
}

/// One binding of a material layout (already reflected upstream)
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub binding_type: BindingType,
    pub stages: ShaderStageFlags,
}

/// Push constant range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PushConstantRange {
    pub stages: ShaderStageFlags,
    pub size: u32,
}

/// Material layout descriptor (descriptor set layout + pipeline layout)
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialLayoutDesc {
    pub bindings: Vec<LayoutBinding>,
    pub push_constants: Option<PushConstantRange>,
}

/// A resource written into a material binding
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BindingResource {
    UniformBuffer { buffer: NativeHandle, offset: u64, range: u64 },
    StorageBuffer { buffer: NativeHandle, offset: u64, range: u64 },
    SampledImage { view: NativeHandle, layout: ImageLayout },
}

/// One material binding update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialWrite {
    pub binding: u32,
    pub resource: BindingResource,
}

/// One vertex attribute
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

/// Interleaved vertex input (single binding)
#[derive(Debug, Clone, PartialEq)]
pub struct VertexInputDesc {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

/// Graphics pipeline descriptor
///
/// Viewport and scissor are baked from `extent`, which is why pipelines
/// are size-dependent and recreated on swapchain resize.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDesc {
    pub render_pass: NativeHandle,
    pub pipeline_layout: NativeHandle,
    pub vertex_shader: NativeHandle,
    pub fragment_shader: NativeHandle,
    pub vertex_input: Option<VertexInputDesc>,
    pub color_attachment_count: u32,
    pub depth_test: bool,
    pub extent: Extent2D,
}

/// Clear value for one attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

/// Parameters of `cmd_begin_render_pass`
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassBegin {
    pub render_pass: NativeHandle,
    pub framebuffer: NativeHandle,
    pub extent: Extent2D,
    pub clear_values: Vec<ClearValue>,
}

/// One queue submission
///
/// Wait semaphores block fragment shading and color output of the submitted
/// work; earlier stages may run ahead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitInfo {
    pub command_buffers: Vec<NativeHandle>,
    pub wait_semaphores: Vec<NativeHandle>,
    pub signal_semaphores: Vec<NativeHandle>,
    pub fence: Option<NativeHandle>,
}

// ============================================================================
// GraphicsDevice trait
// ============================================================================

/// Backend device interface
///
/// Implemented by backend-specific devices (e.g. `VulkanGraphicsDevice`).
/// Methods take `&self`: the device is shared through `Arc` by every
/// resource wrapper, and backends synchronize internally where needed.
/// All calls are issued from the single render thread.
pub trait GraphicsDevice: Send + Sync {
    // ----- memory objects -----

    fn create_buffer(&self, name: &str, desc: &BufferDesc) -> Result<NativeHandle>;
    fn destroy_buffer(&self, buffer: NativeHandle) -> Result<()>;
    /// Write into a host-visible buffer
    fn write_buffer(&self, buffer: NativeHandle, offset: u64, data: &[u8]) -> Result<()>;
    /// Read back a host-visible buffer
    fn read_buffer(&self, buffer: NativeHandle, offset: u64, len: u64) -> Result<Vec<u8>>;

    fn create_image(&self, name: &str, desc: &ImageDesc) -> Result<ImageHandles>;
    fn destroy_image(&self, image: ImageHandles) -> Result<()>;

    // ----- pipeline objects -----

    fn create_render_pass(&self, name: &str, desc: &RenderPassDesc) -> Result<NativeHandle>;
    fn destroy_render_pass(&self, render_pass: NativeHandle) -> Result<()>;

    fn create_framebuffer(&self, name: &str, desc: &FramebufferDesc) -> Result<NativeHandle>;
    fn destroy_framebuffer(&self, framebuffer: NativeHandle) -> Result<()>;

    fn create_shader(&self, name: &str, desc: &ShaderDesc) -> Result<NativeHandle>;
    fn destroy_shader(&self, shader: NativeHandle) -> Result<()>;

    fn create_material_layout(&self, name: &str, desc: &MaterialLayoutDesc) -> Result<MaterialLayoutHandles>;
    fn destroy_material_layout(&self, layout: MaterialLayoutHandles) -> Result<()>;

    fn create_material(&self, name: &str, layout: MaterialLayoutHandles) -> Result<NativeHandle>;
    fn update_material(&self, material: NativeHandle, writes: &[MaterialWrite]) -> Result<()>;
    fn destroy_material(&self, material: NativeHandle) -> Result<()>;

    fn create_pipeline(&self, name: &str, desc: &PipelineDesc) -> Result<NativeHandle>;
    fn destroy_pipeline(&self, pipeline: NativeHandle) -> Result<()>;

    // ----- synchronization -----

    fn create_fence(&self, name: &str, signaled: bool) -> Result<NativeHandle>;
    fn destroy_fence(&self, fence: NativeHandle) -> Result<()>;
    /// Block until every fence is signaled (or the timeout expires)
    fn wait_for_fences(&self, fences: &[NativeHandle], timeout_ns: u64) -> Result<()>;
    fn reset_fences(&self, fences: &[NativeHandle]) -> Result<()>;

    fn create_semaphore(&self, name: &str) -> Result<NativeHandle>;
    fn destroy_semaphore(&self, semaphore: NativeHandle) -> Result<()>;

    // ----- command recording -----

    fn allocate_command_buffer(&self, name: &str) -> Result<NativeHandle>;
    fn free_command_buffer(&self, command_buffer: NativeHandle) -> Result<()>;
    /// Begin recording; the command buffer is implicitly reset
    fn begin_command_buffer(&self, command_buffer: NativeHandle) -> Result<()>;
    fn end_command_buffer(&self, command_buffer: NativeHandle) -> Result<()>;

    fn cmd_begin_render_pass(&self, command_buffer: NativeHandle, begin: &RenderPassBegin) -> Result<()>;
    fn cmd_end_render_pass(&self, command_buffer: NativeHandle) -> Result<()>;
    fn cmd_bind_pipeline(&self, command_buffer: NativeHandle, pipeline: NativeHandle) -> Result<()>;
    fn cmd_bind_material(
        &self,
        command_buffer: NativeHandle,
        pipeline_layout: NativeHandle,
        set_index: u32,
        material: NativeHandle,
    ) -> Result<()>;
    fn cmd_bind_vertex_buffer(&self, command_buffer: NativeHandle, buffer: NativeHandle, offset: u64) -> Result<()>;
    /// Bind a u32 index buffer
    fn cmd_bind_index_buffer(&self, command_buffer: NativeHandle, buffer: NativeHandle, offset: u64) -> Result<()>;
    fn cmd_push_constants(
        &self,
        command_buffer: NativeHandle,
        pipeline_layout: NativeHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()>;
    fn cmd_draw(&self, command_buffer: NativeHandle, vertex_count: u32, first_vertex: u32) -> Result<()>;
    fn cmd_draw_indexed(
        &self,
        command_buffer: NativeHandle,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) -> Result<()>;

    // ----- queue -----

    fn submit(&self, submit: &SubmitInfo) -> Result<()>;

    /// Block until the device has finished all submitted work
    fn wait_idle(&self) -> Result<()>;
}

// ============================================================================
// GraphicsContext
// ============================================================================

/// Explicitly constructed graphics context
///
/// Created once at startup from a backend device and handed by reference
/// (or cheap clone) to every component that needs device access.
#[derive(Clone)]
pub struct GraphicsContext {
    device: Arc<dyn GraphicsDevice>,
    max_frames_in_flight: usize,
    fence_timeout_ns: u64,
}

impl GraphicsContext {
    /// Create a context from a backend device and the renderer configuration
    ///
    /// # Errors
    ///
    /// Returns an error if `max_frames_in_flight` is zero.
    pub fn new(device: Arc<dyn GraphicsDevice>, config: &RendererConfig) -> Result<Self> {
        if config.max_frames_in_flight == 0 {
            return Err(Error::InitializationFailed(
                "max_frames_in_flight must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            device,
            max_frames_in_flight: config.max_frames_in_flight,
            fence_timeout_ns: config.fence_timeout_ns,
        })
    }

    /// The backend device
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// Number of frame-in-flight slots
    pub fn max_frames_in_flight(&self) -> usize {
        self.max_frames_in_flight
    }

    /// Timeout used for every fence wait
    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ns
    }

    /// Wait for the device to finish all submitted work
    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}
