/// Render graph pass.
///
/// A pass is a unit of GPU work with a stable identity, a declared set of
/// resource names it reads and a declared set it writes. The render graph
/// derives the execution order and the semaphore chain from those sets.
///
/// Every concrete pass embeds a `PassBase`, which owns the per-frame-slot
/// command buffers and fences and enforces the lifecycle:
///
/// ```text
/// Uncreated -> Created -> { Recording <-> Submitted } -> Invalidated -> Created
/// ```

use std::any::Any;
use std::fmt;
use uuid::Uuid;
use crate::error::{Error, Result};
use crate::graphics_device::{Extent2D, GraphicsContext, NativeHandle, SwapchainInfo};
use crate::resource::{CommandBuffer, Fence};
use crate::{engine_debug, engine_error};
use super::handle::ResourceHandle;
use super::registry::ResourceRegistry;

// ===== PASS ID =====

/// Stable pass identity
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(Uuid);

impl PassId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PassId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PassId({})", self.0)
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ===== PASS STATE =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    /// Constructed, no resources yet
    Uncreated,
    /// Resources created, ready to record
    Created,
    /// Command buffer of the current slot is being (or has been) recorded
    Recording,
    /// Command buffer of the current slot was submitted
    Submitted,
    /// In-flight work waited out, size-dependent resources being rebuilt
    Invalidated,
}

// ===== FRAME INFO =====

/// Per-frame parameters handed to `record` and `submit`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// Frame-in-flight slot (0..max_frames_in_flight)
    pub frame_index: usize,
    /// Acquired swapchain image
    pub image_index: u32,
    /// Current swapchain extent
    pub extent: Extent2D,
    /// Monotonic count of rendered frames
    pub frame_number: u64,
}

/// Semaphores a pass submission waits on and signals
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitSync {
    pub wait_semaphores: Vec<NativeHandle>,
    pub signal_semaphores: Vec<NativeHandle>,
}

// ===== DEPENDENCY DECLARATION =====

/// Declared read and write sets of a pass (deduplicated, insertion order kept)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyDeclaration {
    reads: Vec<String>,
    writes: Vec<String>,
}

impl DependencyDeclaration {
    pub fn new<R, W>(reads: R, writes: W) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        W: IntoIterator,
        W::Item: Into<String>,
    {
        let mut declaration = Self::default();
        for name in reads {
            declaration.read(name);
        }
        for name in writes {
            declaration.write(name);
        }
        declaration
    }

    pub fn read(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if !self.reads.contains(&name) {
            self.reads.push(name);
        }
        self
    }

    pub fn write(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if !self.writes.contains(&name) {
            self.writes.push(name);
        }
        self
    }

    pub fn reads(&self) -> &[String] {
        &self.reads
    }

    pub fn writes(&self) -> &[String] {
        &self.writes
    }

    pub fn is_read(&self, name: &str) -> bool {
        self.reads.iter().any(|r| r == name)
    }

    pub fn is_written(&self, name: &str) -> bool {
        self.writes.iter().any(|w| w == name)
    }
}

/// Identity and declared sets of a registered pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassDescriptor {
    pub id: PassId,
    pub name: String,
    pub dependencies: DependencyDeclaration,
}

// ===== PASS TRAIT =====

/// A render graph pass
pub trait Pass: Any {
    fn base(&self) -> &PassBase;

    fn base_mut(&mut self) -> &mut PassBase;

    /// Extend the declared read/write sets given at registration
    fn declare_dependencies(&self, _dependencies: &mut DependencyDeclaration) {}

    /// Allocate owned resources and register named outputs
    fn create_resources(
        &mut self,
        ctx: &GraphicsContext,
        swapchain: &SwapchainInfo,
        registry: &mut ResourceRegistry,
    ) -> Result<()>;

    /// Record this frame slot's command buffer
    fn record(&mut self, frame: &FrameInfo, registry: &mut ResourceRegistry) -> Result<()>;

    /// Submit the recorded command buffer
    fn submit(&mut self, frame: &FrameInfo, sync: &SubmitSync, registry: &mut ResourceRegistry) -> Result<()> {
        self.base_mut().submit(frame, sync, registry)
    }

    /// Rebuild size-dependent resources for a new swapchain
    fn on_swapchain_resize(
        &mut self,
        ctx: &GraphicsContext,
        swapchain: &SwapchainInfo,
        registry: &mut ResourceRegistry,
    ) -> Result<()>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ===== PASS BASE =====

/// State shared by every pass: identity, declared sets, lifecycle and the
/// per-slot command buffers and fences
pub struct PassBase {
    id: PassId,
    name: String,
    dependencies: DependencyDeclaration,
    state: PassState,
    command_buffers: Vec<ResourceHandle<CommandBuffer>>,
    fences: Vec<ResourceHandle<Fence>>,
    fence_timeout_ns: u64,
}

impl PassBase {
    pub fn new(id: PassId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            dependencies: DependencyDeclaration::default(),
            state: PassState::Uncreated,
            command_buffers: Vec::new(),
            fences: Vec::new(),
            fence_timeout_ns: u64::MAX,
        }
    }

    pub fn id(&self) -> PassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn dependencies(&self) -> &DependencyDeclaration {
        &self.dependencies
    }

    pub fn reads(&self) -> &[String] {
        self.dependencies.reads()
    }

    pub fn writes(&self) -> &[String] {
        self.dependencies.writes()
    }

    pub fn descriptor(&self) -> PassDescriptor {
        PassDescriptor {
            id: self.id,
            name: self.name.clone(),
            dependencies: self.dependencies.clone(),
        }
    }

    pub(crate) fn set_dependencies(&mut self, dependencies: DependencyDeclaration) {
        self.dependencies = dependencies;
    }

    /// Registry name of the per-slot command buffer group
    pub fn command_buffer_group(&self) -> String {
        format!("{} Command Buffer", self.name)
    }

    /// Registry name of the per-slot fence group
    pub fn fence_group(&self) -> String {
        format!("{} Fence", self.name)
    }

    fn invalid_state(&self, action: &str) -> Error {
        engine_error!("lumina::Pass", "Pass '{}' cannot {} in state {:?}", self.name, action, self.state);
        Error::InvalidState(format!("Pass '{}' cannot {} in state {:?}", self.name, action, self.state))
    }

    /// Allocate one command buffer and one signaled fence per frame slot
    /// (Uncreated -> Created)
    pub fn create_frame_resources(&mut self, ctx: &GraphicsContext, registry: &mut ResourceRegistry) -> Result<()> {
        if self.state != PassState::Uncreated {
            return Err(self.invalid_state("create resources"));
        }
        let frames = ctx.max_frames_in_flight() as u32;
        self.command_buffers = registry.create_resources(frames, &self.command_buffer_group(), |_, name| {
            CommandBuffer::new(ctx, name)
        })?;
        self.fences = registry.create_resources(frames, &self.fence_group(), |_, name| {
            Fence::new(ctx, name, true)
        })?;
        self.fence_timeout_ns = ctx.fence_timeout_ns();
        self.state = PassState::Created;
        engine_debug!("lumina::Pass", "Pass '{}' created {} frame slots", self.name, frames);
        Ok(())
    }

    fn slot<H: Copy>(&self, handles: &[H], frame_index: usize) -> Result<H> {
        if handles.is_empty() {
            return Err(self.invalid_state("access frame resources"));
        }
        Ok(handles[frame_index % handles.len()])
    }

    /// Command buffer of a frame slot
    pub fn command_buffer<'a>(&self, frame_index: usize, registry: &'a ResourceRegistry) -> Result<&'a CommandBuffer> {
        self.slot(&self.command_buffers, frame_index)?.get(registry)
    }

    /// Fence of a frame slot
    pub fn fence<'a>(&self, frame_index: usize, registry: &'a ResourceRegistry) -> Result<&'a Fence> {
        self.slot(&self.fences, frame_index)?.get(registry)
    }

    /// Block until the GPU has finished the last submission of a slot
    pub fn wait_for_completion(&self, frame_index: usize, registry: &ResourceRegistry) -> Result<()> {
        self.fence(frame_index, registry)?.wait(self.fence_timeout_ns)
    }

    /// Wait for the slot's fence and begin its command buffer
    /// (Created | Submitted -> Recording)
    pub fn begin_recording(&mut self, frame: &FrameInfo, registry: &ResourceRegistry) -> Result<()> {
        if !matches!(self.state, PassState::Created | PassState::Submitted) {
            return Err(self.invalid_state("begin recording"));
        }
        self.wait_for_completion(frame.frame_index, registry)?;
        self.command_buffer(frame.frame_index, registry)?.begin()?;
        self.state = PassState::Recording;
        Ok(())
    }

    /// End the slot's command buffer
    pub fn finish_recording(&mut self, frame: &FrameInfo, registry: &ResourceRegistry) -> Result<()> {
        if self.state != PassState::Recording {
            return Err(self.invalid_state("finish recording"));
        }
        self.command_buffer(frame.frame_index, registry)?.end()
    }

    /// Reset the slot's fence and submit its command buffer
    /// (Recording -> Submitted)
    pub fn submit(&mut self, frame: &FrameInfo, sync: &SubmitSync, registry: &ResourceRegistry) -> Result<()> {
        if self.state != PassState::Recording {
            return Err(self.invalid_state("submit"));
        }
        let fence = self.fence(frame.frame_index, registry)?;
        fence.reset()?;
        self.command_buffer(frame.frame_index, registry)?.submit(
            &sync.wait_semaphores,
            &sync.signal_semaphores,
            Some(fence),
        )?;
        self.state = PassState::Submitted;
        Ok(())
    }

    /// Wait out every in-flight command buffer before size-dependent
    /// resources are destroyed (-> Invalidated)
    pub fn interrupt_and_reset(&mut self, registry: &ResourceRegistry) -> Result<()> {
        if matches!(self.state, PassState::Uncreated | PassState::Invalidated) {
            return Err(self.invalid_state("be invalidated"));
        }
        for frame_index in 0..self.fences.len() {
            self.wait_for_completion(frame_index, registry)?;
        }
        self.state = PassState::Invalidated;
        Ok(())
    }

    /// Size-dependent resources rebuilt (Invalidated -> Created)
    pub fn finish_resize(&mut self) -> Result<()> {
        if self.state != PassState::Invalidated {
            return Err(self.invalid_state("finish resize"));
        }
        self.state = PassState::Created;
        Ok(())
    }
}

#[cfg(test)]
#[path = "pass_tests.rs"]
mod tests;
