/// Synchronization primitives: fences (GPU -> CPU) and binary semaphores
/// (GPU -> GPU).

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{GraphicsContext, GraphicsDevice, NativeHandle};
use crate::{engine_warn, impl_resource};

// ===== FENCE =====

pub struct Fence {
    name: String,
    device: Arc<dyn GraphicsDevice>,
    handle: NativeHandle,
}

impl Fence {
    /// Create a fence, optionally already signaled so the first wait
    /// returns immediately
    pub fn new(ctx: &GraphicsContext, name: &str, signaled: bool) -> Result<Self> {
        let handle = ctx.device().create_fence(name, signaled)?;
        Ok(Self {
            name: name.to_string(),
            device: Arc::clone(ctx.device()),
            handle,
        })
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn wait(&self, timeout_ns: u64) -> Result<()> {
        self.device.wait_for_fences(&[self.handle], timeout_ns)
    }

    pub fn reset(&self) -> Result<()> {
        self.device.reset_fences(&[self.handle])
    }
}

impl_resource!(Fence);

impl Drop for Fence {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_fence(self.handle) {
            engine_warn!("lumina::Fence", "Failed to destroy fence '{}': {}", self.name, e);
        }
    }
}

// ===== SEMAPHORE =====

pub struct Semaphore {
    name: String,
    device: Arc<dyn GraphicsDevice>,
    handle: NativeHandle,
}

impl Semaphore {
    pub fn new(ctx: &GraphicsContext, name: &str) -> Result<Self> {
        let handle = ctx.device().create_semaphore(name)?;
        Ok(Self {
            name: name.to_string(),
            device: Arc::clone(ctx.device()),
            handle,
        })
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }
}

impl_resource!(Semaphore);

impl Drop for Semaphore {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_semaphore(self.handle) {
            engine_warn!("lumina::Semaphore", "Failed to destroy semaphore '{}': {}", self.name, e);
        }
    }
}
