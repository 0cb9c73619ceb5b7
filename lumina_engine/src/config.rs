/// Renderer configuration

/// Number of frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Renderer configuration
///
/// Read once when the device and the renderer are created. The backend
/// consumes `app_name`, `enable_validation` and `vsync`; the core consumes
/// the rest.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Application name (reported to the driver)
    pub app_name: String,
    /// Enable validation/debug layers
    pub enable_validation: bool,
    /// Frames in flight (CPU/GPU pipelining depth), must be at least 1
    pub max_frames_in_flight: usize,
    /// Timeout used for every fence wait, in nanoseconds
    pub fence_timeout_ns: u64,
    /// Prefer FIFO presentation (true) over MAILBOX (false)
    pub vsync: bool,
    /// Clear color of the color attachments (RGBA)
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "Lumina Application".to_string(),
            enable_validation: cfg!(debug_assertions),
            max_frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            fence_timeout_ns: u64::MAX,
            vsync: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}
