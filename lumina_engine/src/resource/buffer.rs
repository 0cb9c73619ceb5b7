/// GPU buffer owned by the resource registry.
///
/// Host-visible buffers (`MemoryLocation::CpuToGpu`) can be written from the
/// CPU; the camera uniform buffer is one per frame slot so that writing slot
/// N never touches memory the GPU may still be reading for slot N-1.

use std::sync::Arc;
use bytemuck::Pod;
use crate::error::{Error, Result};
use crate::graphics_device::{
    BufferDesc, BufferUsage, GraphicsContext, GraphicsDevice, MemoryLocation, NativeHandle,
};
use crate::{engine_bail, engine_fail, engine_warn, impl_resource};

pub struct Buffer {
    name: String,
    device: Arc<dyn GraphicsDevice>,
    handle: NativeHandle,
    size: u64,
    usage: BufferUsage,
    location: MemoryLocation,
}

impl Buffer {
    /// Create a buffer from a descriptor
    pub fn new(ctx: &GraphicsContext, name: &str, desc: &BufferDesc) -> Result<Self> {
        if desc.size == 0 {
            engine_bail!("lumina::Buffer", "Buffer '{}' cannot be zero-sized", name);
        }
        let handle = ctx.device().create_buffer(name, desc)?;
        Ok(Self {
            name: name.to_string(),
            device: Arc::clone(ctx.device()),
            handle,
            size: desc.size,
            usage: desc.usage,
            location: desc.location,
        })
    }

    /// Host-visible uniform buffer sized for `T`
    pub fn uniform<T: Pod>(ctx: &GraphicsContext, name: &str) -> Result<Self> {
        Self::new(ctx, name, &BufferDesc {
            size: std::mem::size_of::<T>() as u64,
            usage: BufferUsage::UNIFORM,
            location: MemoryLocation::CpuToGpu,
        })
    }

    /// Host-visible buffer initialized with `data` (vertex or index data)
    pub fn with_data<T: Pod>(ctx: &GraphicsContext, name: &str, usage: BufferUsage, data: &[T]) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let buffer = Self::new(ctx, name, &BufferDesc {
            size: bytes.len() as u64,
            usage,
            location: MemoryLocation::CpuToGpu,
        })?;
        buffer.write(0, bytes)?;
        Ok(buffer)
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn location(&self) -> MemoryLocation {
        self.location
    }

    /// Write raw bytes at `offset`
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        if self.location == MemoryLocation::GpuOnly {
            return Err(engine_fail!("lumina::Buffer",
                Error::InvalidState(format!("Buffer '{}' is not host-visible", self.name))));
        }
        let end = offset.checked_add(data.len() as u64);
        if end.map_or(true, |end| end > self.size) {
            engine_bail!("lumina::Buffer",
                "Write of {} bytes at offset {} exceeds size {} of buffer '{}'",
                data.len(), offset, self.size, self.name);
        }
        self.device.write_buffer(self.handle, offset, data)
    }

    /// Write a plain-old-data value at offset 0
    pub fn write_pod<T: Pod>(&self, value: &T) -> Result<()> {
        self.write(0, bytemuck::bytes_of(value))
    }

    /// Read back `len` bytes at `offset`
    pub fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        self.device.read_buffer(self.handle, offset, len)
    }
}

impl_resource!(Buffer);

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_buffer(self.handle) {
            engine_warn!("lumina::Buffer", "Failed to destroy buffer '{}': {}", self.name, e);
        }
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
