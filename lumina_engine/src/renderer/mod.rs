//! Frame loop: per-slot synchronization and the renderer that drives the
//! render graph once per frame

pub mod frame_sync;
pub mod renderer;

pub use frame_sync::{FrameBegin, FrameSync, FRAME_FENCE_GROUP, IMAGE_AVAILABLE_GROUP};
pub use renderer::{FrameStatus, Renderer};
