/// Mock graphics device for unit tests (no GPU required)
///
/// Hands out sequential handles and enforces the Vulkan rules the render
/// graph must respect: binary semaphores are signaled once and consumed by
/// exactly one wait, fences are unsignaled when submitted and cannot be
/// reset while pending, and a command buffer cannot be re-recorded or
/// destroyed while the GPU still owns it. Every call lands in an event log
/// that tests inspect.

use std::sync::{Arc, Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::graphics_device::*;

// ============================================================================
// Object bookkeeping
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Buffer,
    Image,
    ImageView,
    RenderPass,
    Framebuffer,
    Shader,
    SetLayout,
    PipelineLayout,
    Material,
    Pipeline,
    Fence,
    Semaphore,
    CommandBuffer,
    SwapchainImageView,
}

#[derive(Debug, Clone)]
struct MockObject {
    kind: ObjectKind,
    name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    Initial,
    Recording,
    Executable,
    Pending,
}

#[derive(Debug, Clone)]
struct MockCommandBuffer {
    state: CommandBufferState,
    commands: Vec<String>,
}

#[derive(Debug, Clone)]
struct Submission {
    command_buffers: Vec<NativeHandle>,
    fence: Option<NativeHandle>,
}

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Create { kind: ObjectKind, name: String, handle: NativeHandle },
    Destroy { kind: ObjectKind, handle: NativeHandle },
    WaitFences(Vec<NativeHandle>),
    ResetFences(Vec<NativeHandle>),
    BeginCommandBuffer(NativeHandle),
    EndCommandBuffer(NativeHandle),
    Submit(SubmitInfo),
    WriteBuffer { buffer: NativeHandle, offset: u64, len: usize },
    UpdateMaterial(NativeHandle),
    Acquire { semaphore: NativeHandle, image_index: u32 },
    Present { image_index: u32, wait_semaphores: Vec<NativeHandle> },
    RecreateSwapchain(Extent2D),
    WaitIdle,
}

#[derive(Default)]
struct MockState {
    next_handle: u64,
    objects: FxHashMap<NativeHandle, MockObject>,
    fences: FxHashMap<NativeHandle, bool>,
    semaphores: FxHashMap<NativeHandle, bool>,
    command_buffers: FxHashMap<NativeHandle, MockCommandBuffer>,
    buffers: FxHashMap<NativeHandle, (MemoryLocation, Vec<u8>)>,
    material_writes: FxHashMap<NativeHandle, Vec<MaterialWrite>>,
    in_flight: Vec<Submission>,
    events: Vec<MockEvent>,
    fail_on_create: Vec<String>,
    acquire_out_of_date: bool,
    present_out_of_date: bool,
    acquire_suboptimal: bool,
    present_suboptimal: bool,
}

impl MockState {
    fn create(&mut self, kind: ObjectKind, name: &str) -> Result<NativeHandle> {
        if self.fail_on_create.iter().any(|n| n == name) {
            return Err(Error::BackendError(format!("Mock creation failure for '{}'", name)));
        }
        self.next_handle += 1;
        let handle = NativeHandle::from_raw(0x1000 + self.next_handle);
        self.objects.insert(handle, MockObject { kind, name: name.to_string() });
        self.events.push(MockEvent::Create { kind, name: name.to_string(), handle });
        Ok(handle)
    }

    fn destroy(&mut self, kind: ObjectKind, handle: NativeHandle) -> Result<()> {
        match self.objects.get(&handle) {
            Some(object) if object.kind == kind => {}
            Some(object) => {
                return Err(Error::InvalidResource(format!(
                    "Destroying {:?} as {:?}", object.kind, kind
                )));
            }
            None => {
                return Err(Error::InvalidResource(format!(
                    "Destroying unknown or already destroyed {:?} {:?}", kind, handle
                )));
            }
        }
        self.objects.remove(&handle);
        self.events.push(MockEvent::Destroy { kind, handle });
        Ok(())
    }

    fn check_live(&self, kind: ObjectKind, handle: NativeHandle) -> Result<()> {
        match self.objects.get(&handle) {
            Some(object) if object.kind == kind => Ok(()),
            _ => Err(Error::InvalidResource(format!("{:?} {:?} is not alive", kind, handle))),
        }
    }

    fn name_of(&self, handle: NativeHandle) -> String {
        self.objects
            .get(&handle)
            .map(|o| o.name.clone())
            .unwrap_or_else(|| format!("{:?}", handle))
    }

    fn record(&mut self, command_buffer: NativeHandle, command: String) -> Result<()> {
        let cb = self.command_buffers.get_mut(&command_buffer).ok_or_else(|| {
            Error::InvalidResource(format!("Unknown command buffer {:?}", command_buffer))
        })?;
        if cb.state != CommandBufferState::Recording {
            return Err(Error::InvalidState(format!(
                "Recording '{}' into a command buffer in state {:?}", command, cb.state
            )));
        }
        cb.commands.push(command);
        Ok(())
    }

    fn retire(&mut self, submission: &Submission) {
        for cb in &submission.command_buffers {
            if let Some(cb) = self.command_buffers.get_mut(cb) {
                cb.state = CommandBufferState::Executable;
            }
        }
        if let Some(fence) = submission.fence {
            self.fences.insert(fence, true);
        }
    }

    fn signal(&mut self, semaphore: NativeHandle) -> Result<()> {
        match self.semaphores.get(&semaphore).copied() {
            Some(true) => Err(Error::InvalidState(format!(
                "Semaphore '{}' signaled twice without a wait", self.name_of(semaphore)
            ))),
            Some(false) => {
                self.semaphores.insert(semaphore, true);
                Ok(())
            }
            None => Err(Error::InvalidResource(format!("Unknown semaphore {:?}", semaphore))),
        }
    }

    fn consume(&mut self, semaphore: NativeHandle) -> Result<()> {
        match self.semaphores.get(&semaphore).copied() {
            Some(true) => {
                self.semaphores.insert(semaphore, false);
                Ok(())
            }
            Some(false) => Err(Error::InvalidState(format!(
                "Wait on semaphore '{}' that has no pending signal", self.name_of(semaphore)
            ))),
            None => Err(Error::InvalidResource(format!("Unknown semaphore {:?}", semaphore))),
        }
    }
}

// ============================================================================
// MockGraphicsDevice
// ============================================================================

/// Mock device; clones share the same state
#[derive(Clone, Default)]
pub struct MockGraphicsDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock swapchain sharing this device's semaphore state
    pub fn create_swapchain(&self, image_count: usize, extent: Extent2D) -> MockSwapchain {
        let mut swapchain = MockSwapchain {
            state: Arc::clone(&self.state),
            extent,
            format: TextureFormat::B8G8R8A8_SRGB,
            image_views: Vec::new(),
            next_image: 0,
        };
        swapchain.allocate_views(image_count);
        swapchain
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    // ----- test inspection -----

    pub fn events(&self) -> Vec<MockEvent> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// Every submission recorded so far
    pub fn submissions(&self) -> Vec<SubmitInfo> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Submit(info) => Some(info.clone()),
                _ => None,
            })
            .collect()
    }

    /// Commands of the last recording of a command buffer
    pub fn commands(&self, command_buffer: NativeHandle) -> Vec<String> {
        self.lock()
            .command_buffers
            .get(&command_buffer)
            .map(|cb| cb.commands.clone())
            .unwrap_or_default()
    }

    pub fn command_buffer_state(&self, command_buffer: NativeHandle) -> Option<CommandBufferState> {
        self.lock().command_buffers.get(&command_buffer).map(|cb| cb.state)
    }

    pub fn name_of(&self, handle: NativeHandle) -> String {
        self.lock().name_of(handle)
    }

    pub fn is_live(&self, handle: NativeHandle) -> bool {
        self.lock().objects.contains_key(&handle)
    }

    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.lock().objects.values().filter(|o| o.kind == kind).count()
    }

    /// Live handles whose debug name is exactly `name`
    pub fn live_named(&self, name: &str) -> Vec<NativeHandle> {
        let state = self.lock();
        let mut handles: Vec<NativeHandle> = state
            .objects
            .iter()
            .filter(|(_, o)| o.name == name)
            .map(|(h, _)| *h)
            .collect();
        handles.sort();
        handles
    }

    pub fn buffer_contents(&self, buffer: NativeHandle) -> Vec<u8> {
        self.lock().buffers.get(&buffer).map(|(_, data)| data.clone()).unwrap_or_default()
    }

    pub fn material_writes(&self, material: NativeHandle) -> Vec<MaterialWrite> {
        self.lock().material_writes.get(&material).cloned().unwrap_or_default()
    }

    pub fn fence_signaled(&self, fence: NativeHandle) -> bool {
        self.lock().fences.get(&fence).copied().unwrap_or(false)
    }

    pub fn semaphore_signaled(&self, semaphore: NativeHandle) -> bool {
        self.lock().semaphores.get(&semaphore).copied().unwrap_or(false)
    }

    pub fn pending_submissions(&self) -> usize {
        self.lock().in_flight.len()
    }

    // ----- failure injection -----

    /// Make every creation of an object with this debug name fail
    pub fn fail_on_create(&self, name: &str) {
        self.lock().fail_on_create.push(name.to_string());
    }

    pub fn set_acquire_out_of_date(&self, out_of_date: bool) {
        self.lock().acquire_out_of_date = out_of_date;
    }

    pub fn set_present_out_of_date(&self, out_of_date: bool) {
        self.lock().present_out_of_date = out_of_date;
    }

    /// Report acquired images as suboptimal
    pub fn set_acquire_suboptimal(&self, suboptimal: bool) {
        self.lock().acquire_suboptimal = suboptimal;
    }

    pub fn set_present_suboptimal(&self, suboptimal: bool) {
        self.lock().present_suboptimal = suboptimal;
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn create_buffer(&self, name: &str, desc: &BufferDesc) -> Result<NativeHandle> {
        let mut state = self.lock();
        let handle = state.create(ObjectKind::Buffer, name)?;
        state.buffers.insert(handle, (desc.location, vec![0u8; desc.size as usize]));
        Ok(handle)
    }

    fn destroy_buffer(&self, buffer: NativeHandle) -> Result<()> {
        let mut state = self.lock();
        state.destroy(ObjectKind::Buffer, buffer)?;
        state.buffers.remove(&buffer);
        Ok(())
    }

    fn write_buffer(&self, buffer: NativeHandle, offset: u64, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        let (location, contents) = state
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| Error::InvalidResource(format!("Unknown buffer {:?}", buffer)))?;
        if *location != MemoryLocation::CpuToGpu {
            return Err(Error::InvalidState("Buffer is not host visible".to_string()));
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(Error::BackendError(format!(
                "Write of {} bytes at offset {} exceeds buffer size {}", data.len(), offset, contents.len()
            )));
        }
        contents[start..end].copy_from_slice(data);
        state.events.push(MockEvent::WriteBuffer { buffer, offset, len: data.len() });
        Ok(())
    }

    fn read_buffer(&self, buffer: NativeHandle, offset: u64, len: u64) -> Result<Vec<u8>> {
        let state = self.lock();
        let (_, contents) = state
            .buffers
            .get(&buffer)
            .ok_or_else(|| Error::InvalidResource(format!("Unknown buffer {:?}", buffer)))?;
        let start = offset as usize;
        let end = start + len as usize;
        if end > contents.len() {
            return Err(Error::BackendError("Read exceeds buffer size".to_string()));
        }
        Ok(contents[start..end].to_vec())
    }

    fn create_image(&self, name: &str, _desc: &ImageDesc) -> Result<ImageHandles> {
        let mut state = self.lock();
        let image = state.create(ObjectKind::Image, name)?;
        let view = state.create(ObjectKind::ImageView, name)?;
        Ok(ImageHandles { image, view })
    }

    fn destroy_image(&self, image: ImageHandles) -> Result<()> {
        let mut state = self.lock();
        state.destroy(ObjectKind::ImageView, image.view)?;
        state.destroy(ObjectKind::Image, image.image)
    }

    fn create_render_pass(&self, name: &str, _desc: &RenderPassDesc) -> Result<NativeHandle> {
        self.lock().create(ObjectKind::RenderPass, name)
    }

    fn destroy_render_pass(&self, render_pass: NativeHandle) -> Result<()> {
        self.lock().destroy(ObjectKind::RenderPass, render_pass)
    }

    fn create_framebuffer(&self, name: &str, desc: &FramebufferDesc) -> Result<NativeHandle> {
        let mut state = self.lock();
        state.check_live(ObjectKind::RenderPass, desc.render_pass)?;
        state.create(ObjectKind::Framebuffer, name)
    }

    fn destroy_framebuffer(&self, framebuffer: NativeHandle) -> Result<()> {
        self.lock().destroy(ObjectKind::Framebuffer, framebuffer)
    }

    fn create_shader(&self, name: &str, desc: &ShaderDesc) -> Result<NativeHandle> {
        if desc.code.is_empty() {
            return Err(Error::BackendError(format!("Shader '{}' has no code", name)));
        }
        self.lock().create(ObjectKind::Shader, name)
    }

    fn destroy_shader(&self, shader: NativeHandle) -> Result<()> {
        self.lock().destroy(ObjectKind::Shader, shader)
    }

    fn create_material_layout(&self, name: &str, _desc: &MaterialLayoutDesc) -> Result<MaterialLayoutHandles> {
        let mut state = self.lock();
        let set_layout = state.create(ObjectKind::SetLayout, name)?;
        let pipeline_layout = state.create(ObjectKind::PipelineLayout, name)?;
        Ok(MaterialLayoutHandles { set_layout, pipeline_layout })
    }

    fn destroy_material_layout(&self, layout: MaterialLayoutHandles) -> Result<()> {
        let mut state = self.lock();
        state.destroy(ObjectKind::PipelineLayout, layout.pipeline_layout)?;
        state.destroy(ObjectKind::SetLayout, layout.set_layout)
    }

    fn create_material(&self, name: &str, layout: MaterialLayoutHandles) -> Result<NativeHandle> {
        let mut state = self.lock();
        state.check_live(ObjectKind::SetLayout, layout.set_layout)?;
        state.create(ObjectKind::Material, name)
    }

    fn update_material(&self, material: NativeHandle, writes: &[MaterialWrite]) -> Result<()> {
        let mut state = self.lock();
        state.check_live(ObjectKind::Material, material)?;
        let bindings = state.material_writes.entry(material).or_default();
        for write in writes {
            bindings.retain(|w| w.binding != write.binding);
            bindings.push(*write);
        }
        bindings.sort_by_key(|w| w.binding);
        state.events.push(MockEvent::UpdateMaterial(material));
        Ok(())
    }

    fn destroy_material(&self, material: NativeHandle) -> Result<()> {
        let mut state = self.lock();
        state.destroy(ObjectKind::Material, material)?;
        state.material_writes.remove(&material);
        Ok(())
    }

    fn create_pipeline(&self, name: &str, desc: &PipelineDesc) -> Result<NativeHandle> {
        let mut state = self.lock();
        state.check_live(ObjectKind::RenderPass, desc.render_pass)?;
        state.check_live(ObjectKind::PipelineLayout, desc.pipeline_layout)?;
        state.check_live(ObjectKind::Shader, desc.vertex_shader)?;
        state.check_live(ObjectKind::Shader, desc.fragment_shader)?;
        state.create(ObjectKind::Pipeline, name)
    }

    fn destroy_pipeline(&self, pipeline: NativeHandle) -> Result<()> {
        self.lock().destroy(ObjectKind::Pipeline, pipeline)
    }

    fn create_fence(&self, name: &str, signaled: bool) -> Result<NativeHandle> {
        let mut state = self.lock();
        let handle = state.create(ObjectKind::Fence, name)?;
        state.fences.insert(handle, signaled);
        Ok(handle)
    }

    fn destroy_fence(&self, fence: NativeHandle) -> Result<()> {
        let mut state = self.lock();
        if state.in_flight.iter().any(|s| s.fence == Some(fence)) {
            return Err(Error::InvalidState(format!(
                "Destroying fence '{}' while its submission is pending", state.name_of(fence)
            )));
        }
        state.destroy(ObjectKind::Fence, fence)?;
        state.fences.remove(&fence);
        Ok(())
    }

    fn wait_for_fences(&self, fences: &[NativeHandle], _timeout_ns: u64) -> Result<()> {
        let mut state = self.lock();
        state.events.push(MockEvent::WaitFences(fences.to_vec()));
        for fence in fences {
            match state.fences.get(fence).copied() {
                Some(true) => continue,
                Some(false) => {}
                None => return Err(Error::InvalidResource(format!("Unknown fence {:?}", fence))),
            }
            let position = state.in_flight.iter().position(|s| s.fence == Some(*fence));
            match position {
                Some(position) => {
                    // Everything submitted before the fenced batch completes first
                    let retired: Vec<Submission> = state.in_flight.drain(..=position).collect();
                    for submission in &retired {
                        state.retire(submission);
                    }
                }
                None => {
                    return Err(Error::BackendError(format!(
                        "Timeout: fence '{}' is unsignaled and has no pending submission",
                        state.name_of(*fence)
                    )));
                }
            }
        }
        Ok(())
    }

    fn reset_fences(&self, fences: &[NativeHandle]) -> Result<()> {
        let mut state = self.lock();
        state.events.push(MockEvent::ResetFences(fences.to_vec()));
        for fence in fences {
            if state.in_flight.iter().any(|s| s.fence == Some(*fence)) {
                return Err(Error::InvalidState(format!(
                    "Resetting fence '{}' while its submission is pending", state.name_of(*fence)
                )));
            }
            match state.fences.get_mut(fence) {
                Some(signaled) => *signaled = false,
                None => return Err(Error::InvalidResource(format!("Unknown fence {:?}", fence))),
            }
        }
        Ok(())
    }

    fn create_semaphore(&self, name: &str) -> Result<NativeHandle> {
        let mut state = self.lock();
        let handle = state.create(ObjectKind::Semaphore, name)?;
        state.semaphores.insert(handle, false);
        Ok(handle)
    }

    fn destroy_semaphore(&self, semaphore: NativeHandle) -> Result<()> {
        let mut state = self.lock();
        state.destroy(ObjectKind::Semaphore, semaphore)?;
        state.semaphores.remove(&semaphore);
        Ok(())
    }

    fn allocate_command_buffer(&self, name: &str) -> Result<NativeHandle> {
        let mut state = self.lock();
        let handle = state.create(ObjectKind::CommandBuffer, name)?;
        state.command_buffers.insert(handle, MockCommandBuffer {
            state: CommandBufferState::Initial,
            commands: Vec::new(),
        });
        Ok(handle)
    }

    fn free_command_buffer(&self, command_buffer: NativeHandle) -> Result<()> {
        let mut state = self.lock();
        if state.command_buffers.get(&command_buffer).map(|cb| cb.state) == Some(CommandBufferState::Pending) {
            return Err(Error::InvalidState(format!(
                "Freeing command buffer '{}' while pending", state.name_of(command_buffer)
            )));
        }
        state.destroy(ObjectKind::CommandBuffer, command_buffer)?;
        state.command_buffers.remove(&command_buffer);
        Ok(())
    }

    fn begin_command_buffer(&self, command_buffer: NativeHandle) -> Result<()> {
        let mut state = self.lock();
        let name = state.name_of(command_buffer);
        let cb = state.command_buffers.get_mut(&command_buffer).ok_or_else(|| {
            Error::InvalidResource(format!("Unknown command buffer {:?}", command_buffer))
        })?;
        if matches!(cb.state, CommandBufferState::Pending | CommandBufferState::Recording) {
            return Err(Error::InvalidState(format!(
                "Beginning command buffer '{}' in state {:?}", name, cb.state
            )));
        }
        cb.state = CommandBufferState::Recording;
        cb.commands.clear();
        state.events.push(MockEvent::BeginCommandBuffer(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: NativeHandle) -> Result<()> {
        let mut state = self.lock();
        let cb = state.command_buffers.get_mut(&command_buffer).ok_or_else(|| {
            Error::InvalidResource(format!("Unknown command buffer {:?}", command_buffer))
        })?;
        if cb.state != CommandBufferState::Recording {
            return Err(Error::InvalidState(format!(
                "Ending command buffer in state {:?}", cb.state
            )));
        }
        cb.state = CommandBufferState::Executable;
        state.events.push(MockEvent::EndCommandBuffer(command_buffer));
        Ok(())
    }

    fn cmd_begin_render_pass(&self, command_buffer: NativeHandle, begin: &RenderPassBegin) -> Result<()> {
        let mut state = self.lock();
        let command = format!(
            "begin_render_pass {} {} {}x{}",
            state.name_of(begin.render_pass),
            state.name_of(begin.framebuffer),
            begin.extent.width,
            begin.extent.height,
        );
        state.record(command_buffer, command)
    }

    fn cmd_end_render_pass(&self, command_buffer: NativeHandle) -> Result<()> {
        self.lock().record(command_buffer, "end_render_pass".to_string())
    }

    fn cmd_bind_pipeline(&self, command_buffer: NativeHandle, pipeline: NativeHandle) -> Result<()> {
        let mut state = self.lock();
        state.check_live(ObjectKind::Pipeline, pipeline)?;
        let command = format!("bind_pipeline {}", state.name_of(pipeline));
        state.record(command_buffer, command)
    }

    fn cmd_bind_material(
        &self,
        command_buffer: NativeHandle,
        _pipeline_layout: NativeHandle,
        set_index: u32,
        material: NativeHandle,
    ) -> Result<()> {
        let mut state = self.lock();
        state.check_live(ObjectKind::Material, material)?;
        let command = format!("bind_material {} set={}", state.name_of(material), set_index);
        state.record(command_buffer, command)
    }

    fn cmd_bind_vertex_buffer(&self, command_buffer: NativeHandle, buffer: NativeHandle, offset: u64) -> Result<()> {
        let mut state = self.lock();
        state.check_live(ObjectKind::Buffer, buffer)?;
        let command = format!("bind_vertex_buffer {} +{}", state.name_of(buffer), offset);
        state.record(command_buffer, command)
    }

    fn cmd_bind_index_buffer(&self, command_buffer: NativeHandle, buffer: NativeHandle, offset: u64) -> Result<()> {
        let mut state = self.lock();
        state.check_live(ObjectKind::Buffer, buffer)?;
        let command = format!("bind_index_buffer {} +{}", state.name_of(buffer), offset);
        state.record(command_buffer, command)
    }

    fn cmd_push_constants(
        &self,
        command_buffer: NativeHandle,
        _pipeline_layout: NativeHandle,
        _stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> Result<()> {
        self.lock().record(command_buffer, format!("push_constants +{} {} bytes", offset, data.len()))
    }

    fn cmd_draw(&self, command_buffer: NativeHandle, vertex_count: u32, first_vertex: u32) -> Result<()> {
        self.lock().record(command_buffer, format!("draw {} {}", vertex_count, first_vertex))
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: NativeHandle,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) -> Result<()> {
        self.lock().record(
            command_buffer,
            format!("draw_indexed {} {} {}", index_count, first_index, vertex_offset),
        )
    }

    fn submit(&self, submit: &SubmitInfo) -> Result<()> {
        let mut state = self.lock();
        for cb in &submit.command_buffers {
            let cb_state = state.command_buffers.get(cb).map(|c| c.state);
            if cb_state != Some(CommandBufferState::Executable) {
                return Err(Error::InvalidState(format!(
                    "Submitting command buffer '{}' in state {:?}", state.name_of(*cb), cb_state
                )));
            }
        }
        if let Some(fence) = submit.fence {
            if state.fences.get(&fence).copied().unwrap_or(true)
                || state.in_flight.iter().any(|s| s.fence == Some(fence))
            {
                return Err(Error::InvalidState(format!(
                    "Submitting with fence '{}' that is not reset", state.name_of(fence)
                )));
            }
        }
        for semaphore in &submit.wait_semaphores {
            state.consume(*semaphore)?;
        }
        for semaphore in &submit.signal_semaphores {
            state.signal(*semaphore)?;
        }
        for cb in &submit.command_buffers {
            if let Some(cb) = state.command_buffers.get_mut(cb) {
                cb.state = CommandBufferState::Pending;
            }
        }
        state.in_flight.push(Submission {
            command_buffers: submit.command_buffers.clone(),
            fence: submit.fence,
        });
        state.events.push(MockEvent::Submit(submit.clone()));
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        let mut state = self.lock();
        let retired: Vec<Submission> = state.in_flight.drain(..).collect();
        for submission in &retired {
            state.retire(submission);
        }
        state.events.push(MockEvent::WaitIdle);
        Ok(())
    }
}

// ============================================================================
// MockSwapchain
// ============================================================================

/// Mock swapchain handing out images round-robin
pub struct MockSwapchain {
    state: Arc<Mutex<MockState>>,
    extent: Extent2D,
    format: TextureFormat,
    image_views: Vec<NativeHandle>,
    next_image: u32,
}

impl MockSwapchain {
    fn allocate_views(&mut self, image_count: usize) {
        let mut state = self.state.lock().unwrap();
        self.image_views = (0..image_count)
            .map(|_| {
                state.next_handle += 1;
                let handle = NativeHandle::from_raw(0x1000 + state.next_handle);
                state.objects.insert(handle, MockObject {
                    kind: ObjectKind::SwapchainImageView,
                    name: "Swapchain Image".to_string(),
                });
                handle
            })
            .collect();
    }
}

impl Swapchain for MockSwapchain {
    fn acquire_next_image(&mut self, signal_semaphore: NativeHandle, _timeout_ns: u64) -> Result<AcquireResult> {
        let mut state = self.state.lock().unwrap();
        if state.acquire_out_of_date {
            return Ok(AcquireResult::OutOfDate);
        }
        state.signal(signal_semaphore)?;
        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_views.len() as u32;
        state.events.push(MockEvent::Acquire { semaphore: signal_semaphore, image_index });
        Ok(AcquireResult::Acquired { image_index, suboptimal: state.acquire_suboptimal })
    }

    fn present(&mut self, image_index: u32, wait_semaphores: &[NativeHandle]) -> Result<PresentResult> {
        let mut state = self.state.lock().unwrap();
        for semaphore in wait_semaphores {
            state.consume(*semaphore)?;
        }
        state.events.push(MockEvent::Present { image_index, wait_semaphores: wait_semaphores.to_vec() });
        if state.present_out_of_date {
            return Ok(PresentResult::OutOfDate);
        }
        if state.present_suboptimal {
            return Ok(PresentResult::Suboptimal);
        }
        Ok(PresentResult::Presented)
    }

    fn recreate(&mut self, extent: Extent2D) -> Result<()> {
        let count = self.image_views.len();
        {
            let mut state = self.state.lock().unwrap();
            if !state.in_flight.is_empty() {
                return Err(Error::InvalidState("Recreating swapchain while GPU work is pending".to_string()));
            }
            for view in &self.image_views {
                state.objects.remove(view);
            }
            state.events.push(MockEvent::RecreateSwapchain(extent));
        }
        self.extent = extent;
        self.next_image = 0;
        self.allocate_views(count);
        Ok(())
    }

    fn image_count(&self) -> usize {
        self.image_views.len()
    }

    fn extent(&self) -> Extent2D {
        self.extent
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn image_view(&self, image_index: usize) -> NativeHandle {
        self.image_views[image_index]
    }
}

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
