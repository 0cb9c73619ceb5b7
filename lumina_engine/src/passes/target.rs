/// Shared building blocks of the concrete passes.
///
/// Attachment groups (one image per frame slot), layout tracking, and
/// `FullscreenTarget`: the shader/material/render-pass/pipeline/framebuffer
/// set of a pass that samples its inputs and draws one full-screen
/// triangle. Shaders, material layout and materials survive a resize; the
/// render pass, pipeline and framebuffers are rebuilt.

use crate::error::{Error, Result};
use crate::graphics_device::{
    AttachmentDesc, BindingResource, BindingType, ClearValue, Extent2D, GraphicsContext,
    ImageDesc, ImageLayout, ImageUsage, LayoutBinding, LoadOp, MaterialLayoutDesc,
    MaterialWrite, NativeHandle, PipelineDesc, RenderPassBegin, RenderPassDesc, ShaderStage,
    ShaderStageFlags, StoreOp, TextureFormat, FramebufferDesc,
};
use crate::render_graph::{PassId, ResourceHandle, ResourceRegistry};
use crate::resource::{
    Buffer, CommandBuffer, Framebuffer, Image, Material, MaterialLayout, Pipeline,
    RenderPassObject, Shader,
};

/// SPIR-V code of a pass's vertex and fragment stages
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PassShaders {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

/// Registry name of an object private to a pass
pub(crate) fn private_name(pass: &str, object: &str) -> String {
    format!("{} {}", pass, object)
}

/// Create one sampled attachment image per frame slot under `name`
pub(crate) fn create_attachment_group(
    ctx: &GraphicsContext,
    registry: &mut ResourceRegistry,
    name: &str,
    extent: Extent2D,
    format: TextureFormat,
) -> Result<Vec<ResourceHandle<Image>>> {
    let attachment_usage = if format.is_depth() {
        ImageUsage::DEPTH_STENCIL_ATTACHMENT
    } else {
        ImageUsage::COLOR_ATTACHMENT
    };
    let desc = ImageDesc { extent, format, usage: attachment_usage | ImageUsage::SAMPLED };
    registry.create_resources(ctx.max_frames_in_flight() as u32, name, |_, member| {
        Image::new(ctx, member, &desc)
    })
}

/// Attachment cleared on load, stored, left in `final_layout`
pub(crate) fn cleared_attachment(format: TextureFormat, final_layout: ImageLayout) -> AttachmentDesc {
    AttachmentDesc {
        format,
        load_op: LoadOp::Clear,
        store_op: StoreOp::Store,
        initial_layout: ImageLayout::Undefined,
        final_layout,
    }
}

/// Layout an attachment is left in by the render pass writing it
pub(crate) fn final_layout_of(format: TextureFormat) -> ImageLayout {
    if format.is_depth() {
        ImageLayout::DepthStencilAttachment
    } else {
        ImageLayout::ShaderReadOnly
    }
}

/// Handle of slot `index` (modulo the slot count)
pub(crate) fn slot_of<T>(handles: &[ResourceHandle<T>], index: usize, pass: &str) -> Result<ResourceHandle<T>> {
    if handles.is_empty() {
        return Err(Error::InvalidState(format!("Pass '{}' has no resources created", pass)));
    }
    Ok(handles[index % handles.len()])
}

/// Remove the groups that exist among `names`
pub(crate) fn remove_groups(registry: &mut ResourceRegistry, names: &[String]) -> Result<()> {
    for name in names {
        if registry.contains(name) {
            registry.remove_group(name)?;
        }
    }
    Ok(())
}

/// Frame-slot views of the outputs a pass declared, in `outputs` order
pub(crate) fn output_views(
    registry: &mut ResourceRegistry,
    pass: PassId,
    outputs: &[&str],
    frame_index: usize,
) -> Result<Vec<NativeHandle>> {
    let mut views = Vec::with_capacity(outputs.len());
    for name in outputs {
        let handle = registry.bind_output::<Image>(name, pass, frame_index)?;
        views.push(handle.get(registry)?.view());
    }
    Ok(views)
}

/// Record the layout the render pass left the slot's outputs in
pub(crate) fn track_output_layouts(
    registry: &mut ResourceRegistry,
    pass: PassId,
    outputs: &[&str],
    frame_index: usize,
) -> Result<()> {
    for name in outputs {
        let handle = registry.bind_output::<Image>(name, pass, frame_index)?;
        let image = handle.get_mut(registry)?;
        let layout = final_layout_of(image.format());
        image.set_layout(layout);
    }
    Ok(())
}

// ============================================================================
// FullscreenTarget
// ============================================================================

/// Objects of a full-screen pass.
///
/// The material layout binds each sampled input at bindings `0..n` and
/// the optional uniform buffer at binding `n`, all fragment-visible.
pub struct FullscreenTarget {
    pass_name: String,
    inputs: Vec<&'static str>,
    uniform: Option<&'static str>,
    shaders: PassShaders,
    vertex_shader: ResourceHandle<Shader>,
    fragment_shader: ResourceHandle<Shader>,
    material_layout: ResourceHandle<MaterialLayout>,
    materials: Vec<ResourceHandle<Material>>,
    render_pass: ResourceHandle<RenderPassObject>,
    pipeline: ResourceHandle<Pipeline>,
    framebuffers: Vec<ResourceHandle<Framebuffer>>,
}

impl FullscreenTarget {
    pub fn new(pass_name: &str, inputs: Vec<&'static str>, uniform: Option<&'static str>, shaders: PassShaders) -> Self {
        Self {
            pass_name: pass_name.to_string(),
            inputs,
            uniform,
            shaders,
            vertex_shader: ResourceHandle::invalid(),
            fragment_shader: ResourceHandle::invalid(),
            material_layout: ResourceHandle::invalid(),
            materials: Vec::new(),
            render_pass: ResourceHandle::invalid(),
            pipeline: ResourceHandle::invalid(),
            framebuffers: Vec::new(),
        }
    }

    fn name(&self, object: &str) -> String {
        private_name(&self.pass_name, object)
    }

    pub fn vertex_shader(&self) -> ResourceHandle<Shader> {
        self.vertex_shader
    }

    pub fn fragment_shader(&self) -> ResourceHandle<Shader> {
        self.fragment_shader
    }

    pub fn pipeline(&self) -> ResourceHandle<Pipeline> {
        self.pipeline
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Shaders, material layout and one material per frame slot
    pub fn create_static(&mut self, ctx: &GraphicsContext, registry: &mut ResourceRegistry) -> Result<()> {
        let shaders = &self.shaders;
        self.vertex_shader = registry.create_resource(&self.name("Vertex Shader"), |name| {
            Shader::from_spirv(ctx, name, ShaderStage::Vertex, &shaders.vertex)
        })?;
        self.fragment_shader = registry.create_resource(&self.name("Fragment Shader"), |name| {
            Shader::from_spirv(ctx, name, ShaderStage::Fragment, &shaders.fragment)
        })?;

        let mut bindings: Vec<LayoutBinding> = (0..self.inputs.len() as u32)
            .map(|binding| LayoutBinding {
                binding,
                binding_type: BindingType::CombinedImageSampler,
                stages: ShaderStageFlags::FRAGMENT,
            })
            .collect();
        if self.uniform.is_some() {
            bindings.push(LayoutBinding {
                binding: self.inputs.len() as u32,
                binding_type: BindingType::UniformBuffer,
                stages: ShaderStageFlags::FRAGMENT,
            });
        }
        let desc = MaterialLayoutDesc { bindings, push_constants: None };
        self.material_layout = registry.create_resource(&self.name("Material Layout"), |name| {
            MaterialLayout::new(ctx, name, &desc)
        })?;

        let layout = self.material_layout.get(registry)?.handles();
        self.materials = registry.create_resources(ctx.max_frames_in_flight() as u32, &self.name("Material"), |_, name| {
            Material::from_layout_handles(ctx, name, layout)
        })?;
        Ok(())
    }

    /// Point every slot's material at the slot's inputs (and uniform)
    pub fn write_materials(&self, registry: &mut ResourceRegistry, pass: PassId) -> Result<()> {
        for (frame_index, material) in self.materials.iter().enumerate() {
            let mut writes = Vec::with_capacity(self.inputs.len() + 1);
            for (binding, input) in self.inputs.iter().enumerate() {
                let handle = registry.get_resource_handle::<Image>(input, pass, frame_index)?;
                writes.push(MaterialWrite {
                    binding: binding as u32,
                    resource: BindingResource::SampledImage {
                        view: handle.get(registry)?.view(),
                        layout: ImageLayout::ShaderReadOnly,
                    },
                });
            }
            if let Some(uniform) = self.uniform {
                let handle = registry.get_resource_handle::<Buffer>(uniform, pass, frame_index)?;
                let buffer = handle.get(registry)?;
                writes.push(MaterialWrite {
                    binding: self.inputs.len() as u32,
                    resource: BindingResource::UniformBuffer { buffer: buffer.handle(), offset: 0, range: buffer.size() },
                });
            }
            material.get(registry)?.update(&writes)?;
        }
        Ok(())
    }

    /// Render pass, pipeline and one framebuffer per entry of `views`
    pub fn create_targets(
        &mut self,
        ctx: &GraphicsContext,
        registry: &mut ResourceRegistry,
        format: TextureFormat,
        final_layout: ImageLayout,
        extent: Extent2D,
        views: &[NativeHandle],
    ) -> Result<()> {
        let desc = RenderPassDesc {
            color_attachments: vec![cleared_attachment(format, final_layout)],
            depth_attachment: None,
        };
        self.render_pass = registry.create_resource(&self.name("Render Pass"), |name| {
            RenderPassObject::new(ctx, name, &desc)
        })?;
        let render_pass = self.render_pass.get(registry)?.handle();

        let pipeline_desc = PipelineDesc {
            render_pass,
            pipeline_layout: self.material_layout.get(registry)?.pipeline_layout(),
            vertex_shader: self.vertex_shader.get(registry)?.handle(),
            fragment_shader: self.fragment_shader.get(registry)?.handle(),
            vertex_input: None,
            color_attachment_count: 1,
            depth_test: false,
            extent,
        };
        self.pipeline = registry.create_resource(&self.name("Pipeline"), |name| {
            Pipeline::new(ctx, name, &pipeline_desc)
        })?;

        self.framebuffers = registry.create_resources(views.len() as u32, &self.name("Framebuffer"), |index, name| {
            Framebuffer::new(ctx, name, &FramebufferDesc {
                render_pass,
                attachments: vec![views[index as usize]],
                extent,
            })
        })?;
        Ok(())
    }

    /// Destroy the size-dependent objects (framebuffers first)
    pub fn destroy_targets(&mut self, registry: &mut ResourceRegistry) -> Result<()> {
        remove_groups(registry, &[
            self.name("Framebuffer"),
            self.name("Pipeline"),
            self.name("Render Pass"),
        ])?;
        self.framebuffers.clear();
        self.pipeline.invalidate();
        self.render_pass.invalidate();
        Ok(())
    }

    /// Draw the full-screen triangle into framebuffer `target_index` with
    /// the material of `frame_index`
    pub fn record_draw(
        &self,
        cb: &CommandBuffer,
        registry: &ResourceRegistry,
        frame_index: usize,
        target_index: usize,
        extent: Extent2D,
        clear_color: [f32; 4],
    ) -> Result<()> {
        self.record_draw_with(cb, registry, frame_index, target_index, extent, clear_color, |_| Ok(()))
    }

    /// `record_draw`, then `overlay` inside the same render pass
    #[allow(clippy::too_many_arguments)]
    pub fn record_draw_with<F>(
        &self,
        cb: &CommandBuffer,
        registry: &ResourceRegistry,
        frame_index: usize,
        target_index: usize,
        extent: Extent2D,
        clear_color: [f32; 4],
        overlay: F,
    ) -> Result<()>
    where
        F: FnOnce(&CommandBuffer) -> Result<()>,
    {
        let framebuffer = slot_of(&self.framebuffers, target_index, &self.pass_name)?.get(registry)?;
        let material = slot_of(&self.materials, frame_index, &self.pass_name)?.get(registry)?;
        cb.begin_render_pass(&RenderPassBegin {
            render_pass: self.render_pass.get(registry)?.handle(),
            framebuffer: framebuffer.handle(),
            extent,
            clear_values: vec![ClearValue::Color(clear_color)],
        })?;
        cb.bind_pipeline(self.pipeline.get(registry)?.handle())?;
        cb.bind_material(material.pipeline_layout(), 0, material.handle())?;
        cb.draw(3, 0)?;
        overlay(cb)?;
        cb.end_render_pass()
    }
}
