/// Primary command buffer.
///
/// Thin recording facade over the device's `cmd_*` entry points so that
/// passes record through the resource they own instead of raw handles.

use std::sync::Arc;
use bytemuck::Pod;
use crate::error::Result;
use crate::graphics_device::{
    GraphicsContext, GraphicsDevice, NativeHandle, RenderPassBegin, ShaderStageFlags, SubmitInfo,
};
use crate::resource::Fence;
use crate::{engine_warn, impl_resource};

pub struct CommandBuffer {
    name: String,
    device: Arc<dyn GraphicsDevice>,
    handle: NativeHandle,
}

impl CommandBuffer {
    pub fn new(ctx: &GraphicsContext, name: &str) -> Result<Self> {
        let handle = ctx.device().allocate_command_buffer(name)?;
        Ok(Self {
            name: name.to_string(),
            device: Arc::clone(ctx.device()),
            handle,
        })
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    /// Reset and begin recording
    pub fn begin(&self) -> Result<()> {
        self.device.begin_command_buffer(self.handle)
    }

    pub fn end(&self) -> Result<()> {
        self.device.end_command_buffer(self.handle)
    }

    pub fn begin_render_pass(&self, begin: &RenderPassBegin) -> Result<()> {
        self.device.cmd_begin_render_pass(self.handle, begin)
    }

    pub fn end_render_pass(&self) -> Result<()> {
        self.device.cmd_end_render_pass(self.handle)
    }

    pub fn bind_pipeline(&self, pipeline: NativeHandle) -> Result<()> {
        self.device.cmd_bind_pipeline(self.handle, pipeline)
    }

    pub fn bind_material(&self, pipeline_layout: NativeHandle, set_index: u32, material: NativeHandle) -> Result<()> {
        self.device.cmd_bind_material(self.handle, pipeline_layout, set_index, material)
    }

    pub fn bind_vertex_buffer(&self, buffer: NativeHandle, offset: u64) -> Result<()> {
        self.device.cmd_bind_vertex_buffer(self.handle, buffer, offset)
    }

    pub fn bind_index_buffer(&self, buffer: NativeHandle, offset: u64) -> Result<()> {
        self.device.cmd_bind_index_buffer(self.handle, buffer, offset)
    }

    pub fn push_constants<T: Pod>(&self, pipeline_layout: NativeHandle, stages: ShaderStageFlags, value: &T) -> Result<()> {
        self.device.cmd_push_constants(self.handle, pipeline_layout, stages, 0, bytemuck::bytes_of(value))
    }

    pub fn draw(&self, vertex_count: u32, first_vertex: u32) -> Result<()> {
        self.device.cmd_draw(self.handle, vertex_count, first_vertex)
    }

    pub fn draw_indexed(&self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()> {
        self.device.cmd_draw_indexed(self.handle, index_count, first_index, vertex_offset)
    }

    /// Submit this command buffer alone on the graphics queue
    pub fn submit(
        &self,
        wait_semaphores: &[NativeHandle],
        signal_semaphores: &[NativeHandle],
        fence: Option<&Fence>,
    ) -> Result<()> {
        self.device.submit(&SubmitInfo {
            command_buffers: vec![self.handle],
            wait_semaphores: wait_semaphores.to_vec(),
            signal_semaphores: signal_semaphores.to_vec(),
            fence: fence.map(Fence::handle),
        })
    }
}

impl_resource!(CommandBuffer);

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.device.free_command_buffer(self.handle) {
            engine_warn!("lumina::CommandBuffer", "Failed to free command buffer '{}': {}", self.name, e);
        }
    }
}
