//! Render graph module
//!
//! The resource registry, typed handles, the pass abstraction, dependency
//! construction and scheduling, and the graph that executes passes.

pub mod handle;
pub mod registry;
pub mod pass;
pub mod dependency;
pub mod render_graph;

pub use handle::ResourceHandle;
pub use registry::{ResourceRegistry, ResourceGroup};
pub use pass::{
    Pass, PassBase, PassId, PassState, PassDescriptor,
    DependencyDeclaration, FrameInfo, SubmitSync,
};
pub use dependency::{DependencyGraph, DependencyEdge};
pub use render_graph::{RenderGraph, SWAPCHAIN_IMAGE};
