/// Swapchain trait - for window presentation

use crate::error::Result;
use crate::graphics_device::{Extent2D, NativeHandle, TextureFormat};

/// Outcome of acquiring the next presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// An image was acquired; the semaphore will be signaled when it is ready
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface and must be recreated.
    /// The semaphore was not signaled.
    OutOfDate,
}

/// Outcome of presenting an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentResult {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentResult {
    /// Whether the swapchain should be recreated after this present
    pub fn needs_recreation(self) -> bool {
        !matches!(self, PresentResult::Presented)
    }
}

/// Snapshot of the swapchain handed to passes at creation and resize time
#[derive(Debug, Clone, PartialEq)]
pub struct SwapchainInfo {
    pub extent: Extent2D,
    pub format: TextureFormat,
    /// One view per swapchain image slot
    pub image_views: Vec<NativeHandle>,
}

impl SwapchainInfo {
    pub fn image_count(&self) -> usize {
        self.image_views.len()
    }
}

/// Swapchain for presenting rendered images to a window
///
/// Manages the set of presentable images. Swapchain images are owned by
/// the swapchain itself; the render graph never destroys them.
pub trait Swapchain: Send {
    /// Acquire the next image, signaling `signal_semaphore` when it is ready
    fn acquire_next_image(&mut self, signal_semaphore: NativeHandle, timeout_ns: u64) -> Result<AcquireResult>;

    /// Present `image_index` once all `wait_semaphores` are signaled
    fn present(&mut self, image_index: u32, wait_semaphores: &[NativeHandle]) -> Result<PresentResult>;

    /// Recreate the swapchain at a new extent (device must be idle)
    fn recreate(&mut self, extent: Extent2D) -> Result<()>;

    /// Number of images in the swapchain
    fn image_count(&self) -> usize;

    /// Current extent of the swapchain images
    fn extent(&self) -> Extent2D;

    /// Pixel format of the swapchain images
    fn format(&self) -> TextureFormat;

    /// Image view of one swapchain image slot
    fn image_view(&self, image_index: usize) -> NativeHandle;

    /// Snapshot for pass creation/resize
    fn info(&self) -> SwapchainInfo {
        SwapchainInfo {
            extent: self.extent(),
            format: self.format(),
            image_views: (0..self.image_count()).map(|i| self.image_view(i)).collect(),
        }
    }
}
