/// Lighting pass - resolves the G-Buffer into an HDR lighting attachment.
///
/// Samples position, normal and albedo of its frame slot plus the camera
/// block, and draws one full-screen triangle.

use std::any::Any;
use crate::error::Result;
use crate::graphics_device::{Extent2D, GraphicsContext, SwapchainInfo, TextureFormat};
use crate::render_graph::{FrameInfo, Pass, PassBase, PassId, ResourceHandle, ResourceRegistry};
use crate::resource::{Image, Shader};
use super::target::{
    create_attachment_group, final_layout_of, output_views, track_output_layouts,
    FullscreenTarget, PassShaders,
};
use super::{CAMERA_UNIFORM_BUFFER, GBUFFER_ALBEDO, GBUFFER_NORMAL, GBUFFER_POSITION, LIGHTING_ATTACHMENT};

pub const LIGHTING_FORMAT: TextureFormat = TextureFormat::R16G16B16A16_SFLOAT;

pub struct LightingPass {
    base: PassBase,
    target: FullscreenTarget,
    extent: Extent2D,
}

impl LightingPass {
    pub fn new(id: PassId, name: &str, shaders: PassShaders) -> Self {
        Self {
            base: PassBase::new(id, name),
            target: FullscreenTarget::new(
                name,
                vec![GBUFFER_POSITION, GBUFFER_NORMAL, GBUFFER_ALBEDO],
                Some(CAMERA_UNIFORM_BUFFER),
                shaders,
            ),
            extent: Extent2D::default(),
        }
    }

    pub fn vertex_shader(&self) -> ResourceHandle<Shader> {
        self.target.vertex_shader()
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    /// Output image of a frame slot
    pub fn output<'a>(&self, registry: &'a ResourceRegistry, frame_index: usize) -> Result<&'a Image> {
        registry.get::<Image>(LIGHTING_ATTACHMENT, frame_index)
    }

    fn create_size_dependent(&mut self, ctx: &GraphicsContext, registry: &mut ResourceRegistry, extent: Extent2D) -> Result<()> {
        create_attachment_group(ctx, registry, LIGHTING_ATTACHMENT, extent, LIGHTING_FORMAT)?;
        let id = self.base.id();
        let views = (0..ctx.max_frames_in_flight())
            .map(|frame_index| Ok(output_views(registry, id, &[LIGHTING_ATTACHMENT], frame_index)?[0]))
            .collect::<Result<Vec<_>>>()?;
        self.target.create_targets(ctx, registry, LIGHTING_FORMAT, final_layout_of(LIGHTING_FORMAT), extent, &views)?;
        self.target.write_materials(registry, id)?;
        self.extent = extent;
        Ok(())
    }
}

impl Pass for LightingPass {
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
        for input in [GBUFFER_POSITION, GBUFFER_NORMAL, GBUFFER_ALBEDO] {
            registry.get_resource_handle::<Image>(input, id, frame.frame_index)?;
        }
        let cb = self.base.command_buffer(frame.frame_index, registry)?;
        self.target.record_draw(cb, registry, frame.frame_index, frame.frame_index, frame.extent, [0.0; 4])?;
        track_output_layouts(registry, id, &[LIGHTING_ATTACHMENT], frame.frame_index)?;
        self.base.finish_recording(frame, registry)
    }

    fn on_swapchain_resize(&mut self, ctx: &GraphicsContext, swapchain: &SwapchainInfo, registry: &mut ResourceRegistry) -> Result<()> {
        self.target.destroy_targets(registry)?;
        registry.remove_group(LIGHTING_ATTACHMENT)?;
        self.create_size_dependent(ctx, registry, swapchain.extent)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
