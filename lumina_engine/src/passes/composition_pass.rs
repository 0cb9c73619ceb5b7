/// Scene composition pass - tone-maps the lighting attachment into the
/// displayable scene composition attachment.

use std::any::Any;
use crate::error::Result;
use crate::graphics_device::{Extent2D, GraphicsContext, SwapchainInfo, TextureFormat};
use crate::render_graph::{FrameInfo, Pass, PassBase, PassId, ResourceHandle, ResourceRegistry};
use crate::resource::{Image, Shader};
use super::target::{
    create_attachment_group, final_layout_of, output_views, track_output_layouts,
    FullscreenTarget, PassShaders,
};
use super::{LIGHTING_ATTACHMENT, SCENE_COMPOSITION_ATTACHMENT};

pub const COMPOSITION_FORMAT: TextureFormat = TextureFormat::R8G8B8A8_UNORM;

pub struct CompositionPass {
    base: PassBase,
    target: FullscreenTarget,
    clear_color: [f32; 4],
    extent: Extent2D,
}

impl CompositionPass {
    pub fn new(id: PassId, name: &str, shaders: PassShaders, clear_color: [f32; 4]) -> Self {
        Self {
            base: PassBase::new(id, name),
            target: FullscreenTarget::new(name, vec![LIGHTING_ATTACHMENT], None, shaders),
            clear_color,
            extent: Extent2D::default(),
        }
    }

    pub fn vertex_shader(&self) -> ResourceHandle<Shader> {
        self.target.vertex_shader()
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    fn create_size_dependent(&mut self, ctx: &GraphicsContext, registry: &mut ResourceRegistry, extent: Extent2D) -> Result<()> {
        create_attachment_group(ctx, registry, SCENE_COMPOSITION_ATTACHMENT, extent, COMPOSITION_FORMAT)?;
        let id = self.base.id();
        let views = (0..ctx.max_frames_in_flight())
            .map(|frame_index| Ok(output_views(registry, id, &[SCENE_COMPOSITION_ATTACHMENT], frame_index)?[0]))
            .collect::<Result<Vec<_>>>()?;
        self.target.create_targets(ctx, registry, COMPOSITION_FORMAT, final_layout_of(COMPOSITION_FORMAT), extent, &views)?;
        self.target.write_materials(registry, id)?;
        self.extent = extent;
        Ok(())
    }
}

impl Pass for CompositionPass {
    fn base(&self) -> &PassBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PassBase {
        &mut self.base
    }

    fn create_resources(&mut self, ctx: &GraphicsContext, swapchain: &SwapchainInfo, registry: &mut ResourceRegistry) -> Result<()> {
        self.target.create_static(ctx, registry)?;
        self.create_size_dependent(ctx, registry, swapchain.extent)
    }

    fn record(&mut self, frame: &FrameInfo, registry: &mut ResourceRegistry) -> Result<()> {
        self.base.begin_recording(frame, registry)?;
        let id = self.base.id();
        let lighting = registry.get_resource_handle::<Image>(LIGHTING_ATTACHMENT, id, frame.frame_index)?;
        lighting.get(registry)?;
        let cb = self.base.command_buffer(frame.frame_index, registry)?;
        self.target.record_draw(cb, registry, frame.frame_index, frame.frame_index, frame.extent, self.clear_color)?;
        track_output_layouts(registry, id, &[SCENE_COMPOSITION_ATTACHMENT], frame.frame_index)?;
        self.base.finish_recording(frame, registry)
    }

    fn on_swapchain_resize(&mut self, ctx: &GraphicsContext, swapchain: &SwapchainInfo, registry: &mut ResourceRegistry) -> Result<()> {
        self.target.destroy_targets(registry)?;
        registry.remove_group(SCENE_COMPOSITION_ATTACHMENT)?;
        self.create_size_dependent(ctx, registry, swapchain.extent)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
