/// Frame synchronization.
///
/// Each frame-in-flight slot owns a fence (signaled when every submission
/// of the slot's last frame has completed) and an "image available"
/// semaphore (signaled by swapchain acquisition). Each swapchain image
/// remembers the frame fence of the last frame that rendered into it, so a
/// slot never renders into an image another slot is still using.

use crate::error::{Error, Result};
use crate::graphics_device::{
    AcquireResult, GraphicsContext, NativeHandle, PresentResult, SubmitInfo, Swapchain,
};
use crate::render_graph::{ResourceHandle, ResourceRegistry};
use crate::resource::{Fence, Semaphore};
use crate::{engine_debug, engine_trace};

/// Registry group of the per-slot frame fences
pub const FRAME_FENCE_GROUP: &str = "Frame In Flight Fence";

/// Registry group of the per-slot acquisition semaphores
pub const IMAGE_AVAILABLE_GROUP: &str = "Image Available Semaphore";

/// Outcome of `FrameSync::begin_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBegin {
    /// An image was acquired; `suboptimal` asks for recreation after present
    Ready { image_index: u32, suboptimal: bool },
    /// The swapchain must be recreated before rendering
    OutOfDate,
}

pub struct FrameSync {
    ctx: GraphicsContext,
    frame_fences: Vec<ResourceHandle<Fence>>,
    image_available: Vec<ResourceHandle<Semaphore>>,
    /// Frame fence last bound to each swapchain image
    images_in_flight: Vec<Option<NativeHandle>>,
    current_frame: usize,
    frame_number: u64,
}

impl FrameSync {
    /// Create the per-slot fences (signaled) and semaphores in `registry`
    pub fn new(ctx: &GraphicsContext, registry: &mut ResourceRegistry, image_count: usize) -> Result<Self> {
        let frames = ctx.max_frames_in_flight() as u32;
        let frame_fences = registry.create_resources(frames, FRAME_FENCE_GROUP, |_, name| {
            Fence::new(ctx, name, true)
        })?;
        let image_available = registry.create_resources(frames, IMAGE_AVAILABLE_GROUP, |_, name| {
            Semaphore::new(ctx, name)
        })?;
        engine_debug!("lumina::FrameSync", "{} frames in flight over {} swapchain images", frames, image_count);
        Ok(Self {
            ctx: ctx.clone(),
            frame_fences,
            image_available,
            images_in_flight: vec![None; image_count],
            current_frame: 0,
            frame_number: 0,
        })
    }

    /// Frame-in-flight slot of the frame being rendered
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Frames completed since creation
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn images_in_flight(&self) -> &[Option<NativeHandle>] {
        &self.images_in_flight
    }

    pub fn frame_fence<'a>(&self, registry: &'a ResourceRegistry) -> Result<&'a Fence> {
        self.frame_fences[self.current_frame].get(registry)
    }

    pub fn image_available_semaphore(&self, registry: &ResourceRegistry) -> Result<NativeHandle> {
        Ok(self.image_available[self.current_frame].get(registry)?.handle())
    }

    /// Wait for the current slot's fence, then acquire the next image
    pub fn begin_frame(&mut self, swapchain: &mut dyn Swapchain, registry: &ResourceRegistry) -> Result<FrameBegin> {
        self.frame_fence(registry)?.wait(self.ctx.fence_timeout_ns())?;
        let semaphore = self.image_available_semaphore(registry)?;
        match swapchain.acquire_next_image(semaphore, self.ctx.fence_timeout_ns())? {
            AcquireResult::Acquired { image_index, suboptimal } => {
                engine_trace!("lumina::FrameSync", "Frame slot {} acquired image {}", self.current_frame, image_index);
                Ok(FrameBegin::Ready { image_index, suboptimal })
            }
            AcquireResult::OutOfDate => Ok(FrameBegin::OutOfDate),
        }
    }

    /// Wait until no other slot renders into `image_index`, then bind the
    /// current slot's fence to it
    pub fn claim_image(&mut self, image_index: u32, registry: &ResourceRegistry) -> Result<()> {
        let len = self.images_in_flight.len();
        let entry = self.images_in_flight.get_mut(image_index as usize).ok_or(Error::OutOfRange {
            index: image_index,
            len: len as u32,
        })?;
        let fence = self.frame_fences[self.current_frame].get(registry)?.handle();
        if let Some(previous) = *entry {
            if previous != fence {
                self.ctx.device().wait_for_fences(&[previous], self.ctx.fence_timeout_ns())?;
            }
        }
        *entry = Some(fence);
        Ok(())
    }

    /// Reset the current slot's fence and submit it behind every pass of
    /// the frame
    pub fn submit_frame_fence(&self, registry: &ResourceRegistry) -> Result<()> {
        let fence = self.frame_fence(registry)?;
        fence.reset()?;
        self.ctx.device().submit(&SubmitInfo {
            fence: Some(fence.handle()),
            ..Default::default()
        })
    }

    /// Present `image_index` once every semaphore in `wait_semaphores` is
    /// signaled
    pub fn end_frame(
        &self,
        swapchain: &mut dyn Swapchain,
        image_index: u32,
        wait_semaphores: &[NativeHandle],
    ) -> Result<PresentResult> {
        swapchain.present(image_index, wait_semaphores)
    }

    /// Move to the next frame-in-flight slot
    pub fn advance(&mut self) {
        self.current_frame = (self.current_frame + 1) % self.frame_fences.len();
        self.frame_number += 1;
    }

    /// Forget image bindings after swapchain recreation and restart at slot 0
    pub fn reset(&mut self, image_count: usize) {
        self.images_in_flight = vec![None; image_count];
        self.current_frame = 0;
    }
}

#[cfg(test)]
#[path = "frame_sync_tests.rs"]
mod tests;
