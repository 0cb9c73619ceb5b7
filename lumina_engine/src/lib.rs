/*!
# Lumina Engine

Core of the Lumina deferred renderer.

This crate is backend-agnostic: everything that touches the GPU goes through
the `GraphicsDevice` and `Swapchain` traits, implemented by a backend crate
(Vulkan) or by the in-crate mock used by the tests.

## Architecture

- **ResourceRegistry**: owns every GPU object, grouped by name and frame slot
- **ResourceHandle**: generation-checked back-reference into the registry
- **Pass / PassBase**: unit of GPU work with declared reads and writes
- **RenderGraph**: derives dependencies, schedules passes (Kahn) and chains
  them with per-slot semaphores
- **FrameSync / Renderer**: frames in flight, acquisition, presentation and
  swapchain recreation
- **passes**: G-Buffer, Lighting, Scene Composition and Swapchain/UI passes
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod config;
pub mod graphics_device;
pub mod resource;
pub mod render_graph;
pub mod renderer;
pub mod scene;
pub mod passes;

#[cfg(test)]
mod test_support;

// Main lumina namespace module
pub mod lumina {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine singleton (logger)
    pub use crate::engine::Engine;

    pub use crate::config::{RendererConfig, MAX_FRAMES_IN_FLIGHT};
    pub use crate::renderer::{FrameStatus, Renderer};

    // Logging sub-module (types only, macros live at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Backend interface
    pub mod graphics_device {
        pub use crate::graphics_device::*;
    }

    pub mod resource {
        pub use crate::resource::*;
    }

    pub mod render_graph {
        pub use crate::render_graph::*;
    }

    pub mod renderer {
        pub use crate::renderer::*;
    }

    pub mod scene {
        pub use crate::scene::*;
    }

    pub mod passes {
        pub use crate::passes::*;
    }
}

// Re-export math library at crate root
pub use glam;
