/// G-Buffer pass - rasterizes the scene into position, normal, albedo and
/// depth attachments (one set per frame slot).
///
/// Reads the camera uniform buffer, writes the four G-Buffer attachments.
/// Draws every scene object in material-key order, pushing its model
/// matrix as a vertex push constant.

use std::any::Any;
use std::sync::{Arc, RwLock};
use glam::Mat4;
use crate::error::{Error, Result};
use crate::graphics_device::{
    ClearValue, Extent2D, GraphicsContext, LayoutBinding, BindingType,
    BindingResource, FramebufferDesc, MaterialLayoutDesc, MaterialWrite, PipelineDesc,
    PushConstantRange, RenderPassBegin, RenderPassDesc, ShaderStage, ShaderStageFlags,
    SwapchainInfo, TextureFormat, VertexAttribute, VertexFormat, VertexInputDesc,
};
use crate::render_graph::{FrameInfo, Pass, PassBase, PassId, ResourceHandle, ResourceRegistry};
use crate::resource::{
    Buffer, Framebuffer, Material, MaterialLayout, Pipeline, RenderPassObject, Shader,
};
use crate::scene::Scene;
use crate::engine_error;
use super::target::{
    cleared_attachment, create_attachment_group, final_layout_of, output_views, private_name,
    remove_groups, slot_of, track_output_layouts, PassShaders,
};
use super::{
    CAMERA_UNIFORM_BUFFER, GBUFFER_ALBEDO, GBUFFER_DEPTH, GBUFFER_NORMAL, GBUFFER_POSITION,
};

/// Attachments in framebuffer order: three colors, then depth
const OUTPUTS: [(&str, TextureFormat); 4] = [
    (GBUFFER_POSITION, TextureFormat::R16G16B16A16_SFLOAT),
    (GBUFFER_NORMAL, TextureFormat::R16G16B16A16_SFLOAT),
    (GBUFFER_ALBEDO, TextureFormat::R8G8B8A8_UNORM),
    (GBUFFER_DEPTH, TextureFormat::D32_SFLOAT),
];

/// Interleaved position (vec3), normal (vec3), uv (vec2)
pub const GBUFFER_VERTEX_STRIDE: u32 = 32;

pub struct GBufferPass {
    base: PassBase,
    scene: Arc<RwLock<Scene>>,
    shaders: PassShaders,
    clear_color: [f32; 4],
    vertex_shader: ResourceHandle<Shader>,
    fragment_shader: ResourceHandle<Shader>,
    material_layout: ResourceHandle<MaterialLayout>,
    materials: Vec<ResourceHandle<Material>>,
    render_pass: ResourceHandle<RenderPassObject>,
    pipeline: ResourceHandle<Pipeline>,
    framebuffers: Vec<ResourceHandle<Framebuffer>>,
    extent: Extent2D,
}

impl GBufferPass {
    pub fn new(id: PassId, name: &str, scene: Arc<RwLock<Scene>>, shaders: PassShaders, clear_color: [f32; 4]) -> Self {
        Self {
            base: PassBase::new(id, name),
            scene,
            shaders,
            clear_color,
            vertex_shader: ResourceHandle::invalid(),
            fragment_shader: ResourceHandle::invalid(),
            material_layout: ResourceHandle::invalid(),
            materials: Vec::new(),
            render_pass: ResourceHandle::invalid(),
            pipeline: ResourceHandle::invalid(),
            framebuffers: Vec::new(),
            extent: Extent2D::default(),
        }
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

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    fn name(&self, object: &str) -> String {
        private_name(self.base.name(), object)
    }

    fn output_names() -> Vec<&'static str> {
        OUTPUTS.iter().map(|(name, _)| *name).collect()
    }

    fn create_static(&mut self, ctx: &GraphicsContext, registry: &mut ResourceRegistry) -> Result<()> {
        let shaders = &self.shaders;
        self.vertex_shader = registry.create_resource(&self.name("Vertex Shader"), |name| {
            Shader::from_spirv(ctx, name, ShaderStage::Vertex, &shaders.vertex)
        })?;
        self.fragment_shader = registry.create_resource(&self.name("Fragment Shader"), |name| {
            Shader::from_spirv(ctx, name, ShaderStage::Fragment, &shaders.fragment)
        })?;

        let desc = MaterialLayoutDesc {
            bindings: vec![LayoutBinding {
                binding: 0,
                binding_type: BindingType::UniformBuffer,
                stages: ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
            }],
            push_constants: Some(PushConstantRange {
                stages: ShaderStageFlags::VERTEX,
                size: std::mem::size_of::<Mat4>() as u32,
            }),
        };
        self.material_layout = registry.create_resource(&self.name("Material Layout"), |name| {
            MaterialLayout::new(ctx, name, &desc)
        })?;
        let layout = self.material_layout.get(registry)?.handles();
        self.materials = registry.create_resources(ctx.max_frames_in_flight() as u32, &self.name("Material"), |_, name| {
            Material::from_layout_handles(ctx, name, layout)
        })?;

        // Slot N's material binds slot N's camera buffer
        let id = self.base.id();
        for (frame_index, material) in self.materials.iter().enumerate() {
            let camera = registry.get_resource_handle::<Buffer>(CAMERA_UNIFORM_BUFFER, id, frame_index)?;
            let camera = camera.get(registry)?;
            material.get(registry)?.update(&[MaterialWrite {
                binding: 0,
                resource: BindingResource::UniformBuffer { buffer: camera.handle(), offset: 0, range: camera.size() },
            }])?;
        }
        Ok(())
    }

    /// Attachments, render pass, pipeline and framebuffers for `extent`
    fn create_size_dependent(&mut self, ctx: &GraphicsContext, registry: &mut ResourceRegistry, extent: Extent2D) -> Result<()> {
        for (name, format) in OUTPUTS {
            create_attachment_group(ctx, registry, name, extent, format)?;
        }

        let desc = RenderPassDesc {
            color_attachments: OUTPUTS[..3]
                .iter()
                .map(|(_, format)| cleared_attachment(*format, final_layout_of(*format)))
                .collect(),
            depth_attachment: Some(cleared_attachment(TextureFormat::D32_SFLOAT, final_layout_of(TextureFormat::D32_SFLOAT))),
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
            vertex_input: Some(VertexInputDesc {
                stride: GBUFFER_VERTEX_STRIDE,
                attributes: vec![
                    VertexAttribute { location: 0, format: VertexFormat::R32G32B32_SFLOAT, offset: 0 },
                    VertexAttribute { location: 1, format: VertexFormat::R32G32B32_SFLOAT, offset: 12 },
                    VertexAttribute { location: 2, format: VertexFormat::R32G32_SFLOAT, offset: 24 },
                ],
            }),
            color_attachment_count: 3,
            depth_test: true,
            extent,
        };
        self.pipeline = registry.create_resource(&self.name("Pipeline"), |name| {
            Pipeline::new(ctx, name, &pipeline_desc)
        })?;

        let id = self.base.id();
        let outputs = Self::output_names();
        let views = (0..ctx.max_frames_in_flight())
            .map(|frame_index| output_views(registry, id, &outputs, frame_index))
            .collect::<Result<Vec<_>>>()?;
        self.framebuffers = registry.create_resources(views.len() as u32, &self.name("Framebuffer"), |index, name| {
            Framebuffer::new(ctx, name, &FramebufferDesc {
                render_pass,
                attachments: views[index as usize].clone(),
                extent,
            })
        })?;
        self.extent = extent;
        Ok(())
    }

    fn destroy_size_dependent(&mut self, registry: &mut ResourceRegistry) -> Result<()> {
        let mut names = vec![self.name("Framebuffer"), self.name("Pipeline"), self.name("Render Pass")];
        names.extend(OUTPUTS.iter().map(|(name, _)| name.to_string()));
        remove_groups(registry, &names)?;
        self.framebuffers.clear();
        self.pipeline.invalidate();
        self.render_pass.invalidate();
        Ok(())
    }
}

impl Pass for GBufferPass {
    fn base(&self) -> &PassBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PassBase {
        &mut self.base
    }

    fn create_resources(&mut self, ctx: &GraphicsContext, swapchain: &SwapchainInfo, registry: &mut ResourceRegistry) -> Result<()> {
        self.create_static(ctx, registry)?;
        self.create_size_dependent(ctx, registry, swapchain.extent)
    }

    fn record(&mut self, frame: &FrameInfo, registry: &mut ResourceRegistry) -> Result<()> {
        self.base.begin_recording(frame, registry)?;
        let id = self.base.id();
        registry.get_resource_handle::<Buffer>(CAMERA_UNIFORM_BUFFER, id, frame.frame_index)?;

        {
            let registry: &ResourceRegistry = registry;
            let cb = self.base.command_buffer(frame.frame_index, registry)?;
            let material = slot_of(&self.materials, frame.frame_index, self.base.name())?.get(registry)?;
            let framebuffer = slot_of(&self.framebuffers, frame.frame_index, self.base.name())?.get(registry)?;
            let clear_values = vec![
                ClearValue::Color([0.0; 4]),
                ClearValue::Color([0.0; 4]),
                ClearValue::Color(self.clear_color),
                ClearValue::DepthStencil { depth: 1.0, stencil: 0 },
            ];

            cb.begin_render_pass(&RenderPassBegin {
                render_pass: self.render_pass.get(registry)?.handle(),
                framebuffer: framebuffer.handle(),
                extent: frame.extent,
                clear_values,
            })?;
            cb.bind_pipeline(self.pipeline.get(registry)?.handle())?;
            cb.bind_material(material.pipeline_layout(), 0, material.handle())?;

            let scene = self.scene.read().map_err(|_| {
                engine_error!("lumina::GBufferPass", "Scene lock poisoned");
                Error::BackendError("Scene lock poisoned".to_string())
            })?;
            for object in scene.draw_order() {
                cb.bind_vertex_buffer(object.vertex_buffer.handle(), 0)?;
                cb.bind_index_buffer(object.index_buffer.handle(), 0)?;
                cb.push_constants(material.pipeline_layout(), ShaderStageFlags::VERTEX, &object.transform)?;
                cb.draw_indexed(object.index_count, 0, 0)?;
            }
            cb.end_render_pass()?;
        }

        track_output_layouts(registry, id, &Self::output_names(), frame.frame_index)?;
        self.base.finish_recording(frame, registry)
    }

    fn on_swapchain_resize(&mut self, ctx: &GraphicsContext, swapchain: &SwapchainInfo, registry: &mut ResourceRegistry) -> Result<()> {
        self.destroy_size_dependent(registry)?;
        self.create_size_dependent(ctx, registry, swapchain.extent)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
