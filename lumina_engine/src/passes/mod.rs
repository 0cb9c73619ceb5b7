//! Concrete passes of the deferred pipeline
//!
//! ```text
//! G-Buffer -> Lighting -> Scene Composition -> Swapchain/UI
//! ```
//!
//! Passes communicate only through the named resources below; the render
//! graph derives their order and semaphore chain from those names.

mod target;
mod gbuffer_pass;
mod lighting_pass;
mod composition_pass;
mod swapchain_pass;

use std::sync::{Arc, RwLock};
use crate::error::Result;
use crate::render_graph::{PassId, RenderGraph};
use crate::scene::Scene;

pub use target::{FullscreenTarget, PassShaders};
pub use gbuffer_pass::{GBufferPass, GBUFFER_VERTEX_STRIDE};
pub use lighting_pass::{LightingPass, LIGHTING_FORMAT};
pub use composition_pass::{CompositionPass, COMPOSITION_FORMAT};
pub use swapchain_pass::{SwapchainPass, OverlayCallback};
pub use crate::render_graph::SWAPCHAIN_IMAGE;

// ===== RESOURCE NAMES =====

/// Per-slot camera block, written by the renderer before recording
pub const CAMERA_UNIFORM_BUFFER: &str = "Camera Uniform Buffer";
pub const GBUFFER_POSITION: &str = "G-Buffer Position Attachment";
pub const GBUFFER_NORMAL: &str = "G-Buffer Normal Attachment";
pub const GBUFFER_ALBEDO: &str = "G-Buffer Albedo Attachment";
pub const GBUFFER_DEPTH: &str = "G-Buffer Depth Attachment";
pub const LIGHTING_ATTACHMENT: &str = "Lighting Attachment";
pub const SCENE_COMPOSITION_ATTACHMENT: &str = "Scene Composition Attachment";

/// Shaders of the four deferred passes
#[derive(Debug, Clone, Default)]
pub struct DeferredShaders {
    pub gbuffer: PassShaders,
    pub lighting: PassShaders,
    pub composition: PassShaders,
    pub swapchain: PassShaders,
}

/// Identities of the registered deferred passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredPasses {
    pub gbuffer: PassId,
    pub lighting: PassId,
    pub composition: PassId,
    pub swapchain: PassId,
}

/// Register the G-Buffer, Lighting, Composition and Swapchain passes.
///
/// Registration order does not matter; `compile` orders them.
pub fn add_deferred_passes(
    graph: &mut RenderGraph,
    scene: Arc<RwLock<Scene>>,
    shaders: DeferredShaders,
    clear_color: [f32; 4],
) -> Result<DeferredPasses> {
    let gbuffer = graph.add_pass(
        &[CAMERA_UNIFORM_BUFFER],
        &[GBUFFER_POSITION, GBUFFER_NORMAL, GBUFFER_ALBEDO, GBUFFER_DEPTH],
        |id| GBufferPass::new(id, "G-Buffer", scene, shaders.gbuffer, clear_color),
    )?;
    let lighting = graph.add_pass(
        &[GBUFFER_POSITION, GBUFFER_NORMAL, GBUFFER_ALBEDO, CAMERA_UNIFORM_BUFFER],
        &[LIGHTING_ATTACHMENT],
        |id| LightingPass::new(id, "Lighting", shaders.lighting),
    )?;
    let composition = graph.add_pass(
        &[LIGHTING_ATTACHMENT],
        &[SCENE_COMPOSITION_ATTACHMENT],
        |id| CompositionPass::new(id, "Scene Composition", shaders.composition, clear_color),
    )?;
    let swapchain = graph.add_pass(
        &[SCENE_COMPOSITION_ATTACHMENT],
        &[SWAPCHAIN_IMAGE],
        |id| SwapchainPass::new(id, "Swapchain", shaders.swapchain, clear_color),
    )?;
    Ok(DeferredPasses { gbuffer, lighting, composition, swapchain })
}

#[cfg(test)]
#[path = "passes_tests.rs"]
mod tests;
