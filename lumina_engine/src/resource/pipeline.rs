/// Pipeline-side resources: render pass objects, framebuffers, shader
/// modules, material layouts, materials and graphics pipelines.
///
/// Shaders and material layouts do not depend on the swapchain size and
/// survive a resize. Render pass objects, framebuffers and pipelines bake
/// attachment formats or the viewport extent and are recreated with it.

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{
    Extent2D, FramebufferDesc, GraphicsContext, GraphicsDevice, MaterialLayoutDesc,
    MaterialLayoutHandles, MaterialWrite, NativeHandle, PipelineDesc, RenderPassDesc, ShaderDesc,
    ShaderStage,
};
use crate::{engine_warn, impl_resource};

// ===== RENDER PASS OBJECT =====

/// Backend render pass object (attachment formats, load/store ops, layouts)
pub struct RenderPassObject {
    name: String,
    device: Arc<dyn GraphicsDevice>,
    handle: NativeHandle,
    desc: RenderPassDesc,
}

impl RenderPassObject {
    pub fn new(ctx: &GraphicsContext, name: &str, desc: &RenderPassDesc) -> Result<Self> {
        let handle = ctx.device().create_render_pass(name, desc)?;
        Ok(Self {
            name: name.to_string(),
            device: Arc::clone(ctx.device()),
            handle,
            desc: desc.clone(),
        })
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }

    /// Total attachment count (color + depth)
    pub fn attachment_count(&self) -> usize {
        self.desc.color_attachments.len() + usize::from(self.desc.depth_attachment.is_some())
    }
}

impl_resource!(RenderPassObject);

impl Drop for RenderPassObject {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_render_pass(self.handle) {
            engine_warn!("lumina::RenderPassObject", "Failed to destroy render pass '{}': {}", self.name, e);
        }
    }
}

// ===== FRAMEBUFFER =====

pub struct Framebuffer {
    name: String,
    device: Arc<dyn GraphicsDevice>,
    handle: NativeHandle,
    extent: Extent2D,
}

impl Framebuffer {
    pub fn new(ctx: &GraphicsContext, name: &str, desc: &FramebufferDesc) -> Result<Self> {
        let handle = ctx.device().create_framebuffer(name, desc)?;
        Ok(Self {
            name: name.to_string(),
            device: Arc::clone(ctx.device()),
            handle,
            extent: desc.extent,
        })
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }
}

impl_resource!(Framebuffer);

impl Drop for Framebuffer {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_framebuffer(self.handle) {
            engine_warn!("lumina::Framebuffer", "Failed to destroy framebuffer '{}': {}", self.name, e);
        }
    }
}

// ===== SHADER =====

/// Compiled shader module
pub struct Shader {
    name: String,
    device: Arc<dyn GraphicsDevice>,
    handle: NativeHandle,
    stage: ShaderStage,
}

impl Shader {
    pub fn new(ctx: &GraphicsContext, name: &str, desc: &ShaderDesc) -> Result<Self> {
        let handle = ctx.device().create_shader(name, desc)?;
        Ok(Self {
            name: name.to_string(),
            device: Arc::clone(ctx.device()),
            handle,
            stage: desc.stage,
        })
    }

    /// Shader module from SPIR-V words with a "main" entry point
    pub fn from_spirv(ctx: &GraphicsContext, name: &str, stage: ShaderStage, code: &[u32]) -> Result<Self> {
        Self::new(ctx, name, &ShaderDesc {
            stage,
            code: code.to_vec(),
            entry_point: "main".to_string(),
        })
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

impl_resource!(Shader);

impl Drop for Shader {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_shader(self.handle) {
            engine_warn!("lumina::Shader", "Failed to destroy shader '{}': {}", self.name, e);
        }
    }
}

// ===== MATERIAL LAYOUT =====

/// Descriptor set layout + pipeline layout
pub struct MaterialLayout {
    name: String,
    device: Arc<dyn GraphicsDevice>,
    handles: MaterialLayoutHandles,
    desc: MaterialLayoutDesc,
}

impl MaterialLayout {
    pub fn new(ctx: &GraphicsContext, name: &str, desc: &MaterialLayoutDesc) -> Result<Self> {
        let handles = ctx.device().create_material_layout(name, desc)?;
        Ok(Self {
            name: name.to_string(),
            device: Arc::clone(ctx.device()),
            handles,
            desc: desc.clone(),
        })
    }

    pub fn handles(&self) -> MaterialLayoutHandles {
        self.handles
    }

    pub fn pipeline_layout(&self) -> NativeHandle {
        self.handles.pipeline_layout
    }

    pub fn desc(&self) -> &MaterialLayoutDesc {
        &self.desc
    }
}

impl_resource!(MaterialLayout);

impl Drop for MaterialLayout {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_material_layout(self.handles) {
            engine_warn!("lumina::MaterialLayout", "Failed to destroy material layout '{}': {}", self.name, e);
        }
    }
}

// ===== MATERIAL =====

/// Descriptor set allocated against a material layout
pub struct Material {
    name: String,
    device: Arc<dyn GraphicsDevice>,
    handle: NativeHandle,
    pipeline_layout: NativeHandle,
}

impl Material {
    pub fn new(ctx: &GraphicsContext, name: &str, layout: &MaterialLayout) -> Result<Self> {
        Self::from_layout_handles(ctx, name, layout.handles())
    }

    /// Allocate against layout handles, for callers that cannot hold a
    /// borrow of the layout while creating
    pub fn from_layout_handles(ctx: &GraphicsContext, name: &str, layout: MaterialLayoutHandles) -> Result<Self> {
        let handle = ctx.device().create_material(name, layout)?;
        Ok(Self {
            name: name.to_string(),
            device: Arc::clone(ctx.device()),
            handle,
            pipeline_layout: layout.pipeline_layout,
        })
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    /// Pipeline layout the material binds against
    pub fn pipeline_layout(&self) -> NativeHandle {
        self.pipeline_layout
    }

    /// Rewrite bindings (only when the GPU no longer reads this set)
    pub fn update(&self, writes: &[MaterialWrite]) -> Result<()> {
        self.device.update_material(self.handle, writes)
    }
}

impl_resource!(Material);

impl Drop for Material {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_material(self.handle) {
            engine_warn!("lumina::Material", "Failed to destroy material '{}': {}", self.name, e);
        }
    }
}

// ===== PIPELINE =====

/// Graphics pipeline
pub struct Pipeline {
    name: String,
    device: Arc<dyn GraphicsDevice>,
    handle: NativeHandle,
    pipeline_layout: NativeHandle,
    extent: Extent2D,
}

impl Pipeline {
    pub fn new(ctx: &GraphicsContext, name: &str, desc: &PipelineDesc) -> Result<Self> {
        let handle = ctx.device().create_pipeline(name, desc)?;
        Ok(Self {
            name: name.to_string(),
            device: Arc::clone(ctx.device()),
            handle,
            pipeline_layout: desc.pipeline_layout,
            extent: desc.extent,
        })
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn pipeline_layout(&self) -> NativeHandle {
        self.pipeline_layout
    }

    /// Viewport extent baked into the pipeline
    pub fn extent(&self) -> Extent2D {
        self.extent
    }
}

impl_resource!(Pipeline);

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_pipeline(self.handle) {
            engine_warn!("lumina::Pipeline", "Failed to destroy pipeline '{}': {}", self.name, e);
        }
    }
}
