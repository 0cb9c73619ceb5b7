/// Frame driver.
///
/// Owns the render graph, the frame synchronization and the swapchain, and
/// turns one `render()` call into: fence wait, image acquisition, camera
/// upload, graph execution, frame fence submission and presentation.
/// Swapchain recreation (out-of-date, suboptimal, window resize) is
/// handled here so passes only ever see `on_swapchain_resize`.

use std::sync::{Arc, RwLock};
use winit::dpi::PhysicalSize;
use crate::config::RendererConfig;
use crate::error::{Error, Result};
use crate::graphics_device::{Extent2D, GraphicsContext, Swapchain};
use crate::passes::{self, DeferredPasses, DeferredShaders, CAMERA_UNIFORM_BUFFER};
use crate::render_graph::{FrameInfo, RenderGraph};
use crate::resource::Buffer;
use crate::scene::{CameraUniform, Scene};
use crate::{engine_debug, engine_info, engine_warn};
use super::frame_sync::{FrameBegin, FrameSync};

/// Outcome of one `Renderer::render` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was rendered and presented
    Rendered,
    /// The frame was presented, then the swapchain was recreated
    RenderedAndRecreated,
    /// Nothing was rendered (minimized window or out-of-date swapchain)
    Skipped,
}

pub struct Renderer {
    // Field order is drop order: passes release framebuffers over the
    // swapchain views before the swapchain goes away
    graph: RenderGraph,
    frame_sync: Option<FrameSync>,
    swapchain: Box<dyn Swapchain>,
    ctx: GraphicsContext,
    config: RendererConfig,
    scene: Arc<RwLock<Scene>>,
    camera: CameraUniform,
    window_extent: Extent2D,
    resized: bool,
}

impl Renderer {
    pub fn new(ctx: &GraphicsContext, config: RendererConfig, swapchain: Box<dyn Swapchain>) -> Self {
        let window_extent = swapchain.extent();
        Self {
            graph: RenderGraph::new(ctx),
            frame_sync: None,
            swapchain,
            ctx: ctx.clone(),
            config,
            scene: Arc::new(RwLock::new(Scene::new())),
            camera: CameraUniform::default(),
            window_extent,
            resized: false,
        }
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    /// Mutable graph access, used to register passes before `initialize`
    pub fn graph_mut(&mut self) -> &mut RenderGraph {
        &mut self.graph
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Shared scene drawn by the G-Buffer pass
    pub fn scene(&self) -> Arc<RwLock<Scene>> {
        Arc::clone(&self.scene)
    }

    pub fn swapchain(&self) -> &dyn Swapchain {
        self.swapchain.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.frame_sync.is_some()
    }

    /// Register the four deferred passes over this renderer's scene
    pub fn add_deferred_passes(&mut self, shaders: DeferredShaders) -> Result<DeferredPasses> {
        passes::add_deferred_passes(&mut self.graph, Arc::clone(&self.scene), shaders, self.config.clear_color)
    }

    /// Compile the graph and create every frame and pass resource
    pub fn initialize(&mut self) -> Result<()> {
        if self.is_initialized() {
            return Err(Error::InvalidState("Renderer is already initialized".to_string()));
        }
        let frames = self.ctx.max_frames_in_flight() as u32;
        if !self.graph.registry().contains(CAMERA_UNIFORM_BUFFER) {
            let ctx = &self.ctx;
            self.graph.registry_mut().create_resources(frames, CAMERA_UNIFORM_BUFFER, |_, name| {
                Buffer::uniform::<CameraUniform>(ctx, name)
            })?;
        }
        self.graph.compile()?;
        let frame_sync = FrameSync::new(&self.ctx, self.graph.registry_mut(), self.swapchain.image_count())?;
        self.graph.create_resources(&self.swapchain.info())?;
        self.frame_sync = Some(frame_sync);

        let extent = self.swapchain.extent();
        engine_info!("lumina::Renderer", "Renderer initialized: {} passes, {} frames in flight, {}x{}",
            self.graph.pass_count(), frames, extent.width, extent.height);
        Ok(())
    }

    /// Camera block uploaded at the start of every frame
    pub fn update_camera(&mut self, camera: CameraUniform) {
        self.camera = camera;
    }

    pub fn camera(&self) -> &CameraUniform {
        &self.camera
    }

    /// Record the new window size; the swapchain follows at the end of the
    /// next rendered frame
    pub fn on_window_resized(&mut self, size: PhysicalSize<u32>) {
        let extent = Extent2D::new(size.width, size.height);
        if extent != self.window_extent {
            engine_debug!("lumina::Renderer", "Window resized to {}x{}", extent.width, extent.height);
            self.window_extent = extent;
            self.resized = true;
        }
    }

    /// Render and present one frame
    pub fn render(&mut self) -> Result<FrameStatus> {
        if self.window_extent.is_empty() {
            return Ok(FrameStatus::Skipped);
        }
        let frame_sync = self
            .frame_sync
            .as_mut()
            .ok_or_else(|| Error::InvalidState("Renderer is not initialized".to_string()))?;

        let begin = frame_sync.begin_frame(self.swapchain.as_mut(), self.graph.registry())?;
        let (image_index, suboptimal) = match begin {
            FrameBegin::Ready { image_index, suboptimal } => (image_index, suboptimal),
            FrameBegin::OutOfDate => {
                engine_debug!("lumina::Renderer", "Swapchain out of date, skipping frame");
                self.recreate_swapchain()?;
                return Ok(FrameStatus::Skipped);
            }
        };

        let frame = FrameInfo {
            frame_index: frame_sync.current_frame(),
            image_index,
            extent: self.swapchain.extent(),
            frame_number: frame_sync.frame_number(),
        };
        // The slot's fence was waited, so its camera buffer is free
        self.graph
            .registry()
            .get::<Buffer>(CAMERA_UNIFORM_BUFFER, frame.frame_index)?
            .write_pod(&self.camera)?;

        frame_sync.claim_image(image_index, self.graph.registry())?;
        let image_available = frame_sync.image_available_semaphore(self.graph.registry())?;
        self.graph.execute(&frame, image_available)?;
        frame_sync.submit_frame_fence(self.graph.registry())?;

        let waits = self.graph.present_wait_semaphores(frame.frame_index)?;
        let present = frame_sync.end_frame(self.swapchain.as_mut(), image_index, &waits)?;
        frame_sync.advance();

        if present.needs_recreation() || suboptimal || self.resized {
            self.recreate_swapchain()?;
            return Ok(FrameStatus::RenderedAndRecreated);
        }
        Ok(FrameStatus::Rendered)
    }

    /// Wait for the device, rebuild the swapchain at the window extent and
    /// let every pass rebuild its size-dependent resources
    pub fn recreate_swapchain(&mut self) -> Result<()> {
        if self.window_extent.is_empty() {
            // Retried once the window has a drawable area again
            self.resized = true;
            return Ok(());
        }
        self.ctx.wait_idle()?;
        self.swapchain.recreate(self.window_extent)?;
        if let Some(frame_sync) = self.frame_sync.as_mut() {
            frame_sync.reset(self.swapchain.image_count());
        }
        self.graph.on_swapchain_resize(&self.swapchain.info())?;
        self.resized = false;

        let extent = self.swapchain.extent();
        engine_info!("lumina::Renderer", "Swapchain recreated at {}x{} ({} images)",
            extent.width, extent.height, self.swapchain.image_count());
        Ok(())
    }

    /// Frame-in-flight slot of the next frame
    pub fn current_frame(&self) -> usize {
        self.frame_sync.as_ref().map_or(0, FrameSync::current_frame)
    }

    /// Frames presented so far
    pub fn frame_number(&self) -> u64 {
        self.frame_sync.as_ref().map_or(0, FrameSync::frame_number)
    }

    pub fn extent(&self) -> Extent2D {
        self.swapchain.extent()
    }

    /// Block until the GPU has finished every submitted frame
    pub fn shutdown(&mut self) -> Result<()> {
        if self.graph.is_compiled() {
            self.graph.wait_for_passes()?;
        }
        self.ctx.wait_idle()?;
        engine_info!("lumina::Renderer", "Renderer shut down after {} frames", self.frame_number());
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.wait_idle() {
            engine_warn!("lumina::Renderer", "wait_idle failed while dropping renderer: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "renderer_tests.rs"]
mod tests;
