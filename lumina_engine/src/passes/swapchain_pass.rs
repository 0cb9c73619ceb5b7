/// Swapchain pass - copies the scene composition onto the acquired
/// swapchain image and gives the UI overlay a chance to draw on top.
///
/// Framebuffers are per swapchain image, materials per frame slot.

use std::any::Any;
use std::fmt;
use crate::error::Result;
use crate::graphics_device::{Extent2D, GraphicsContext, ImageLayout, SwapchainInfo};
use crate::render_graph::{FrameInfo, Pass, PassBase, PassId, ResourceHandle, ResourceRegistry, SWAPCHAIN_IMAGE};
use crate::resource::{CommandBuffer, Image, Shader};
use super::target::{FullscreenTarget, PassShaders};
use super::SCENE_COMPOSITION_ATTACHMENT;

/// Draws the UI inside the swapchain render pass, after the composition
pub type OverlayCallback = Box<dyn FnMut(&CommandBuffer, &FrameInfo) -> Result<()>>;

pub struct SwapchainPass {
    base: PassBase,
    target: FullscreenTarget,
    overlay: Option<OverlayCallback>,
    clear_color: [f32; 4],
    extent: Extent2D,
    image_count: usize,
}

impl SwapchainPass {
    pub fn new(id: PassId, name: &str, shaders: PassShaders, clear_color: [f32; 4]) -> Self {
        Self {
            base: PassBase::new(id, name),
            target: FullscreenTarget::new(name, vec![SCENE_COMPOSITION_ATTACHMENT], None, shaders),
            overlay: None,
            clear_color,
            extent: Extent2D::default(),
            image_count: 0,
        }
    }

    pub fn set_overlay(&mut self, overlay: OverlayCallback) {
        self.overlay = Some(overlay);
    }

    pub fn vertex_shader(&self) -> ResourceHandle<Shader> {
        self.target.vertex_shader()
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    /// Number of framebuffers (one per swapchain image)
    pub fn framebuffer_count(&self) -> usize {
        self.target.framebuffer_count()
    }

    fn create_size_dependent(&mut self, ctx: &GraphicsContext, registry: &mut ResourceRegistry, swapchain: &SwapchainInfo) -> Result<()> {
        self.target.create_targets(
            ctx,
            registry,
            swapchain.format,
            ImageLayout::PresentSrc,
            swapchain.extent,
            &swapchain.image_views,
        )?;
        self.target.write_materials(registry, self.base.id())?;
        self.extent = swapchain.extent;
        self.image_count = swapchain.image_count();
        Ok(())
    }
}

impl fmt::Debug for SwapchainPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapchainPass")
            .field("name", &self.base.name())
            .field("extent", &self.extent)
            .field("image_count", &self.image_count)
            .field("overlay", &self.overlay.is_some())
            .finish()
    }
}

impl Pass for SwapchainPass {
    fn base(&self) -> &PassBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PassBase {
        &mut self.base
    }

    fn declare_dependencies(&self, dependencies: &mut crate::render_graph::DependencyDeclaration) {
        dependencies.write(SWAPCHAIN_IMAGE);
    }

    fn create_resources(&mut self, ctx: &GraphicsContext, swapchain: &SwapchainInfo, registry: &mut ResourceRegistry) -> Result<()> {
        self.target.create_static(ctx, registry)?;
        self.create_size_dependent(ctx, registry, swapchain)
    }

    fn record(&mut self, frame: &FrameInfo, registry: &mut ResourceRegistry) -> Result<()> {
        self.base.begin_recording(frame, registry)?;
        let composition = registry.get_resource_handle::<Image>(SCENE_COMPOSITION_ATTACHMENT, self.base.id(), frame.frame_index)?;
        composition.get(registry)?;

        let cb = self.base.command_buffer(frame.frame_index, registry)?;
        self.target.record_draw_with(
            cb,
            registry,
            frame.frame_index,
            frame.image_index as usize,
            frame.extent,
            self.clear_color,
            |cb| match self.overlay.as_mut() {
                Some(overlay) => overlay(cb, frame),
                None => Ok(()),
            },
        )?;
        self.base.finish_recording(frame, registry)
    }

    fn on_swapchain_resize(&mut self, ctx: &GraphicsContext, swapchain: &SwapchainInfo, registry: &mut ResourceRegistry) -> Result<()> {
        self.target.destroy_targets(registry)?;
        self.create_size_dependent(ctx, registry, swapchain)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
