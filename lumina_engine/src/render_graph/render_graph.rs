/// Render graph - passes, the resources they share and their execution
/// order.
///
/// Passes are registered with the resource names they read and write.
/// `compile` derives the dependency graph, schedules it (Kahn) and creates
/// the semaphore chain: one binary "render complete" semaphore per
/// dependency edge and one "present ready" semaphore per sink pass, each
/// per frame-in-flight slot. `execute` then records and submits every pass
/// in schedule order; the schedule is authoritative because a binary
/// semaphore wait must be submitted after its signal.

use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::graphics_device::{GraphicsContext, NativeHandle, SwapchainInfo};
use crate::resource::Semaphore;
use crate::{engine_debug, engine_error, engine_info};
use super::dependency::DependencyGraph;
use super::pass::{DependencyDeclaration, FrameInfo, Pass, PassId, SubmitSync};
use super::registry::ResourceRegistry;

/// Resource name of the acquired swapchain image
pub const SWAPCHAIN_IMAGE: &str = "Swapchain Image";

/// Per-pass semaphore groups, resolved per frame slot at execute time
#[derive(Debug, Clone, Default)]
struct SyncPlan {
    wait_groups: Vec<String>,
    signal_groups: Vec<String>,
    waits_image_available: bool,
}

pub struct RenderGraph {
    ctx: GraphicsContext,
    // Declared before the registry: passes drop first
    passes: Vec<Box<dyn Pass>>,
    registry: ResourceRegistry,
    dependencies: Option<DependencyGraph>,
    /// Indices into `passes`, in execution order
    schedule: Vec<usize>,
    plans: FxHashMap<PassId, SyncPlan>,
    present_groups: Vec<String>,
    resources_created: bool,
}

impl RenderGraph {
    pub fn new(ctx: &GraphicsContext) -> Self {
        Self {
            ctx: ctx.clone(),
            passes: Vec::new(),
            registry: ResourceRegistry::new(),
            dependencies: None,
            schedule: Vec::new(),
            plans: FxHashMap::default(),
            present_groups: Vec::new(),
            resources_created: false,
        }
    }

    pub fn context(&self) -> &GraphicsContext {
        &self.ctx
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.registry
    }

    pub fn is_compiled(&self) -> bool {
        self.dependencies.is_some()
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    // ===== PASSES =====

    /// Register a pass.
    ///
    /// `build` receives the identity assigned to the pass and must use it
    /// for the pass's `PassBase`. The pass's `declare_dependencies` hook may
    /// extend `reads`/`writes`. Pass names must be unique.
    pub fn add_pass<P, F>(&mut self, reads: &[&str], writes: &[&str], build: F) -> Result<PassId>
    where
        P: Pass,
        F: FnOnce(PassId) -> P,
    {
        if self.is_compiled() {
            engine_error!("lumina::RenderGraph", "Cannot add a pass to a compiled render graph");
            return Err(Error::InvalidState("Render graph is already compiled".to_string()));
        }

        let id = PassId::new();
        let mut pass = build(id);
        let name = pass.base().name().to_string();
        if pass.base().id() != id {
            return Err(Error::InvalidState(format!("Pass '{}' was built with a foreign identity", name)));
        }
        if self.passes.iter().any(|p| p.base().name() == name) {
            engine_error!("lumina::RenderGraph", "Pass '{}' already exists", name);
            return Err(Error::InvalidResource(format!("Pass '{}' already exists", name)));
        }

        let mut declaration = DependencyDeclaration::new(reads.iter().copied(), writes.iter().copied());
        pass.declare_dependencies(&mut declaration);
        self.registry.register_pass(id, &name, &declaration)?;
        engine_info!("lumina::RenderGraph",
            "Registered pass '{}' (reads: [{}], writes: [{}])",
            name, declaration.reads().join(", "), declaration.writes().join(", "));
        pass.base_mut().set_dependencies(declaration);
        self.passes.push(Box::new(pass));
        Ok(id)
    }

    fn pass_index(&self, id: PassId) -> Result<usize> {
        self.passes
            .iter()
            .position(|p| p.base().id() == id)
            .ok_or_else(|| Error::PassNotFound(id.to_string()))
    }

    /// Typed access to a registered pass
    pub fn pass<P: Pass>(&self, id: PassId) -> Result<&P> {
        let pass = &self.passes[self.pass_index(id)?];
        pass.as_any().downcast_ref::<P>().ok_or_else(|| Error::TypeMismatch {
            name: pass.base().name().to_string(),
            expected: std::any::type_name::<P>(),
        })
    }

    pub fn pass_mut<P: Pass>(&mut self, id: PassId) -> Result<&mut P> {
        let index = self.pass_index(id)?;
        let name = self.passes[index].base().name().to_string();
        self.passes[index].as_any_mut().downcast_mut::<P>().ok_or(Error::TypeMismatch {
            name,
            expected: std::any::type_name::<P>(),
        })
    }

    pub fn find_pass(&self, name: &str) -> Option<&dyn Pass> {
        self.passes.iter().find(|p| p.base().name() == name).map(|p| p.as_ref())
    }

    /// Passes in registration order
    pub fn passes(&self) -> impl Iterator<Item = &dyn Pass> {
        self.passes.iter().map(|p| p.as_ref())
    }

    /// Pass identities in execution order (empty until compiled)
    pub fn schedule(&self) -> Vec<PassId> {
        self.schedule.iter().map(|&i| self.passes[i].base().id()).collect()
    }

    pub fn schedule_names(&self) -> Vec<String> {
        self.schedule.iter().map(|&i| self.passes[i].base().name().to_string()).collect()
    }

    pub fn dependencies(&self) -> Option<&DependencyGraph> {
        self.dependencies.as_ref()
    }

    // ===== COMPILE =====

    /// Registry name of the semaphore group of one dependency edge
    pub fn edge_semaphore_group(producer: &str, consumer: &str) -> String {
        format!("{} -> {} Render Complete", producer, consumer)
    }

    /// Registry name of the present semaphore group of a sink pass
    pub fn present_semaphore_group(sink: &str) -> String {
        format!("{} Present Ready", sink)
    }

    /// Build dependencies, schedule the passes and create the semaphore chain
    pub fn compile(&mut self) -> Result<()> {
        if self.is_compiled() {
            return Err(Error::InvalidState("Render graph is already compiled".to_string()));
        }
        if self.passes.is_empty() {
            engine_error!("lumina::RenderGraph", "Cannot compile a render graph without passes");
            return Err(Error::InvalidState("Render graph has no passes".to_string()));
        }

        let descriptors: Vec<_> = self.passes.iter().map(|p| p.base().descriptor()).collect();
        let graph = DependencyGraph::build(&descriptors);
        let order = graph.topological_order()?;
        let schedule = order.iter().map(|id| self.pass_index(*id)).collect::<Result<Vec<_>>>()?;

        let name_of = |id: PassId| -> String {
            graph.descriptor(id).map(|d| d.name.clone()).unwrap_or_default()
        };
        let frames = self.ctx.max_frames_in_flight() as u32;
        let ctx = &self.ctx;
        let mut plans: FxHashMap<PassId, SyncPlan> = order.iter().map(|id| (*id, SyncPlan::default())).collect();

        for edge in graph.edges() {
            let group = Self::edge_semaphore_group(&name_of(edge.producer), &name_of(edge.consumer));
            self.registry.create_resources(frames, &group, |_, name| Semaphore::new(ctx, name))?;
            if let Some(plan) = plans.get_mut(&edge.producer) {
                plan.signal_groups.push(group.clone());
            }
            if let Some(plan) = plans.get_mut(&edge.consumer) {
                plan.wait_groups.push(group);
            }
        }

        let mut present_groups = Vec::new();
        for sink in graph.sinks() {
            let group = Self::present_semaphore_group(&name_of(sink));
            self.registry.create_resources(frames, &group, |_, name| Semaphore::new(ctx, name))?;
            if let Some(plan) = plans.get_mut(&sink) {
                plan.signal_groups.push(group.clone());
            }
            present_groups.push(group);
        }

        // The first writer of the swapchain image waits for acquisition
        let image_pass = order
            .iter()
            .copied()
            .find(|id| graph.descriptor(*id).is_some_and(|d| d.dependencies.is_written(SWAPCHAIN_IMAGE)))
            .or_else(|| order.first().copied());
        if let Some(plan) = image_pass.and_then(|id| plans.get_mut(&id)) {
            plan.waits_image_available = true;
        }

        engine_info!("lumina::RenderGraph", "Compiled schedule: {}",
            order.iter().map(|id| name_of(*id)).collect::<Vec<_>>().join(" -> "));
        engine_debug!("lumina::RenderGraph", "{} dependency edges, {} sink passes",
            graph.edges().len(), present_groups.len());

        self.schedule = schedule;
        self.plans = plans;
        self.present_groups = present_groups;
        self.dependencies = Some(graph);
        Ok(())
    }

    // ===== LIFECYCLE =====

    /// Create every pass's resources, producers before consumers
    pub fn create_resources(&mut self, swapchain: &SwapchainInfo) -> Result<()> {
        if !self.is_compiled() {
            return Err(Error::InvalidState("Render graph must be compiled before creating resources".to_string()));
        }
        if self.resources_created {
            return Err(Error::InvalidState("Render graph resources already created".to_string()));
        }
        for &index in &self.schedule {
            let pass = &mut self.passes[index];
            pass.base_mut().create_frame_resources(&self.ctx, &mut self.registry)?;
            pass.create_resources(&self.ctx, swapchain, &mut self.registry)?;
        }
        self.resources_created = true;
        Ok(())
    }

    /// Wait out in-flight work of every pass, then rebuild size-dependent
    /// resources in schedule order
    pub fn on_swapchain_resize(&mut self, swapchain: &SwapchainInfo) -> Result<()> {
        if !self.resources_created {
            return Err(Error::InvalidState("Render graph resources were never created".to_string()));
        }
        for pass in &mut self.passes {
            pass.base_mut().interrupt_and_reset(&self.registry)?;
        }
        for &index in &self.schedule {
            let pass = &mut self.passes[index];
            pass.on_swapchain_resize(&self.ctx, swapchain, &mut self.registry)?;
            pass.base_mut().finish_resize()?;
        }
        engine_info!("lumina::RenderGraph", "Passes resized to {}x{}",
            swapchain.extent.width, swapchain.extent.height);
        Ok(())
    }

    fn resolve_sync(
        registry: &ResourceRegistry,
        plan: &SyncPlan,
        frame_index: usize,
        image_available: NativeHandle,
    ) -> Result<SubmitSync> {
        let mut sync = SubmitSync::default();
        if plan.waits_image_available {
            sync.wait_semaphores.push(image_available);
        }
        for group in &plan.wait_groups {
            sync.wait_semaphores.push(registry.get::<Semaphore>(group, frame_index)?.handle());
        }
        for group in &plan.signal_groups {
            sync.signal_semaphores.push(registry.get::<Semaphore>(group, frame_index)?.handle());
        }
        Ok(sync)
    }

    /// Record and submit every pass in schedule order.
    ///
    /// `image_available` is the semaphore the swapchain acquisition signals.
    pub fn execute(&mut self, frame: &FrameInfo, image_available: NativeHandle) -> Result<()> {
        if !self.resources_created {
            return Err(Error::InvalidState("Render graph resources were never created".to_string()));
        }
        for &index in &self.schedule {
            let pass = &mut self.passes[index];
            let id = pass.base().id();
            let plan = self.plans.get(&id).ok_or_else(|| Error::PassNotFound(id.to_string()))?;
            let sync = Self::resolve_sync(&self.registry, plan, frame.frame_index, image_available)?;

            pass.record(frame, &mut self.registry)?;
            pass.submit(frame, &sync, &mut self.registry)?;
        }
        Ok(())
    }

    /// Semaphores presentation must wait on for a frame slot
    pub fn present_wait_semaphores(&self, frame_index: usize) -> Result<Vec<NativeHandle>> {
        self.present_groups
            .iter()
            .map(|group| Ok(self.registry.get::<Semaphore>(group, frame_index)?.handle()))
            .collect()
    }

    /// Block until every pass's last submission has completed
    pub fn wait_for_passes(&self) -> Result<()> {
        for pass in &self.passes {
            let base = pass.base();
            for frame_index in 0..self.ctx.max_frames_in_flight() {
                if self.registry.contains(&base.fence_group()) {
                    base.wait_for_completion(frame_index, &self.registry)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "render_graph_tests.rs"]
mod tests;
