//! Shared helpers for unit tests

use std::any::Any;
use std::sync::{Arc, Mutex};
use crate::config::RendererConfig;
use crate::error::Result;
use crate::graphics_device::{BufferUsage, GraphicsContext, ImageDesc, ImageUsage, SwapchainInfo, TextureFormat};
use crate::graphics_device::mock_graphics_device::MockGraphicsDevice;
use crate::log::{Logger, LogEntry, LogSeverity};
use crate::render_graph::{FrameInfo, Pass, PassBase, PassId, ResourceRegistry, SWAPCHAIN_IMAGE};
use crate::resource::{Buffer, Image};
use crate::scene::RenderObject;

/// Test logger that captures log entries for verification
///
/// Only entries from one source tag are kept: unit tests run in parallel
/// and the logger is global, so unrelated tests may log concurrently.
#[derive(Clone)]
pub struct CaptureLogger {
    source: String,
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl CaptureLogger {
    /// Capture entries logged under "lumina::Test"
    pub fn new() -> Self {
        Self::for_source("lumina::Test")
    }

    pub fn for_source(source: &str) -> Self {
        Self {
            source: source.to_string(),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.message).collect()
    }

    pub fn count(&self, severity: LogSeverity) -> usize {
        self.entries().iter().filter(|e| e.severity == severity).count()
    }
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        if entry.source == self.source {
            self.entries.lock().unwrap().push(entry.clone());
        }
    }
}

/// Mock device plus a context over it (default config, 2 frames in flight)
pub fn mock_context() -> (MockGraphicsDevice, GraphicsContext) {
    mock_context_with_frames(crate::config::MAX_FRAMES_IN_FLIGHT)
}

pub fn mock_context_with_frames(frames: usize) -> (MockGraphicsDevice, GraphicsContext) {
    let device = MockGraphicsDevice::new();
    let config = RendererConfig { max_frames_in_flight: frames, ..RendererConfig::default() };
    let ctx = GraphicsContext::new(Arc::new(device.clone()), &config).unwrap();
    (device, ctx)
}

/// Minimal pass for graph tests.
///
/// Creates one per-slot sampled image for each declared write (other than
/// the swapchain image) sized to the swapchain, resolves every declared
/// read through the access-checked path and records a single draw.
pub struct TestPass {
    base: PassBase,
    pub records: u32,
    pub resizes: u32,
}

impl TestPass {
    pub fn new(id: PassId, name: &str) -> Self {
        Self { base: PassBase::new(id, name), records: 0, resizes: 0 }
    }

    fn create_outputs(&self, ctx: &GraphicsContext, swapchain: &SwapchainInfo, registry: &mut ResourceRegistry) -> Result<()> {
        for name in self.base.writes() {
            if name == SWAPCHAIN_IMAGE {
                continue;
            }
            let desc = ImageDesc {
                extent: swapchain.extent,
                format: TextureFormat::R8G8B8A8_UNORM,
                usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::SAMPLED,
            };
            registry.create_resources(ctx.max_frames_in_flight() as u32, name, |_, member| {
                Image::new(ctx, member, &desc)
            })?;
        }
        Ok(())
    }
}

impl Pass for TestPass {
    fn base(&self) -> &PassBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PassBase {
        &mut self.base
    }

    fn create_resources(&mut self, ctx: &GraphicsContext, swapchain: &SwapchainInfo, registry: &mut ResourceRegistry) -> Result<()> {
        self.create_outputs(ctx, swapchain, registry)
    }

    fn record(&mut self, frame: &FrameInfo, registry: &mut ResourceRegistry) -> Result<()> {
        self.base.begin_recording(frame, registry)?;
        let id = self.base.id();
        for name in self.base.reads().to_vec() {
            if registry.contains(&name) {
                registry.get_resource_handle::<Image>(&name, id, frame.frame_index)?;
            }
        }
        self.base.command_buffer(frame.frame_index, registry)?.draw(3, 0)?;
        self.base.finish_recording(frame, registry)?;
        self.records += 1;
        Ok(())
    }

    fn on_swapchain_resize(&mut self, ctx: &GraphicsContext, swapchain: &SwapchainInfo, registry: &mut ResourceRegistry) -> Result<()> {
        for name in self.base.writes() {
            if registry.contains(name) {
                registry.remove_group(name)?;
            }
        }
        self.create_outputs(ctx, swapchain, registry)?;
        self.resizes += 1;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A single-triangle render object with host-visible vertex/index buffers
pub fn triangle_object(ctx: &GraphicsContext, name: &str) -> RenderObject {
    let vertices: [[f32; 8]; 3] = [
        [0.0, -0.5, 0.0, 0.0, 0.0, 1.0, 0.5, 0.0],
        [0.5, 0.5, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        [-0.5, 0.5, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0],
    ];
    let indices: [u32; 3] = [0, 1, 2];
    let vertex_buffer = Buffer::with_data(ctx, &format!("{} Vertices", name), BufferUsage::VERTEX, &vertices).unwrap();
    let index_buffer = Buffer::with_data(ctx, &format!("{} Indices", name), BufferUsage::INDEX, &indices).unwrap();
    RenderObject::new(Arc::new(vertex_buffer), Arc::new(index_buffer), 3).unwrap()
}
