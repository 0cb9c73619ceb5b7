/// Resource registry - the render graph store.
///
/// Owns every named GPU resource of a render graph in one flat slot table,
/// plus a directory mapping a base name to the contiguous run of slots
/// registered under it (`ResourceGroup`). A group of `count` members is
/// addressed by frame index as `base + (frame_index % count)`, so a global
/// resource (count 1) and a per-frame-in-flight resource (count N) share the
/// same lookup API.
///
/// Type erasure happens at storage only: lookups downcast through `Any` and
/// a mismatch is an `Error::TypeMismatch`.
///
/// The registry also keeps one access table per registered pass. Handles
/// resolved through `get_resource_handle` (reads) and `bind_output` (writes)
/// are recorded there and repaired when a group is compacted.

use std::sync::atomic::{AtomicU32, Ordering};
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::resource::Resource;
use crate::{engine_debug, engine_error, engine_warn};
use super::handle::ResourceHandle;
use super::pass::{DependencyDeclaration, PassId};

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(1);

/// Contiguous run of slots registered under one base name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceGroup {
    /// First flat index
    pub base: u32,
    /// Number of members (always >= 1)
    pub count: u32,
}

impl ResourceGroup {
    /// Flat index for a frame index
    pub fn index_for(&self, frame_index: usize) -> u32 {
        self.base + (frame_index % self.count as usize) as u32
    }

    fn contains(&self, index: u32) -> bool {
        index >= self.base && index < self.base + self.count
    }
}

struct Slot {
    generation: u32,
    resource: Option<Box<dyn Resource>>,
}

/// Declared sets of one pass plus the flat indices it resolved
struct PassAccess {
    name: String,
    reads: FxHashMap<String, Vec<u32>>,
    writes: FxHashMap<String, Vec<u32>>,
}

impl PassAccess {
    fn repair(table: &mut FxHashMap<String, Vec<u32>>, group: ResourceGroup, removed: u32) {
        for indices in table.values_mut() {
            indices.retain(|&i| i != removed);
            for index in indices.iter_mut() {
                if *index > removed && group.contains(*index) {
                    *index -= 1;
                }
            }
        }
    }
}

pub struct ResourceRegistry {
    graph_id: u32,
    slots: Vec<Slot>,
    directory: FxHashMap<String, ResourceGroup>,
    passes: FxHashMap<PassId, PassAccess>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            graph_id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            directory: FxHashMap::default(),
            passes: FxHashMap::default(),
        }
    }

    /// Identity stamped into every handle this registry issues
    pub fn graph_id(&self) -> u32 {
        self.graph_id
    }

    /// Number of live resources
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.resource.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the flat slot table (live + vacant)
    pub fn slot_count(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn contains(&self, name: &str) -> bool {
        self.directory.contains_key(name)
    }

    pub fn group(&self, name: &str) -> Option<ResourceGroup> {
        self.directory.get(name).copied()
    }

    // ===== CREATION =====

    /// Create `count` resources under `base_name`.
    ///
    /// `factory(index, member_name)` builds each member; member names are
    /// `"{base_name} #{index}"` when `count > 1` and `base_name` otherwise.
    /// If the factory fails, the members already built are destroyed and
    /// the registry is left unchanged.
    pub fn create_resources<T, F>(&mut self, count: u32, base_name: &str, mut factory: F) -> Result<Vec<ResourceHandle<T>>>
    where
        T: Resource,
        F: FnMut(u32, &str) -> Result<T>,
    {
        if count == 0 {
            engine_error!("lumina::ResourceRegistry", "Resource group '{}' must have at least one member", base_name);
            return Err(Error::InvalidResource(format!("Resource group '{}' has count 0", base_name)));
        }
        if self.directory.contains_key(base_name) {
            engine_error!("lumina::ResourceRegistry", "Resource group '{}' already exists", base_name);
            return Err(Error::InvalidResource(format!("Resource group '{}' already exists", base_name)));
        }

        let mut built: Vec<Box<dyn Resource>> = Vec::with_capacity(count as usize);
        for index in 0..count {
            let member_name = if count > 1 {
                format!("{} #{}", base_name, index)
            } else {
                base_name.to_string()
            };
            match factory(index, &member_name) {
                Ok(resource) => built.push(Box::new(resource)),
                Err(e) => {
                    engine_error!("lumina::ResourceRegistry",
                        "Failed to create '{}' ({} of {}): {}", member_name, index + 1, count, e);
                    // Destroy in reverse creation order
                    while let Some(resource) = built.pop() {
                        drop(resource);
                    }
                    return Err(e);
                }
            }
        }

        let base = self.find_vacant_run(count);
        let mut handles = Vec::with_capacity(count as usize);
        for (offset, resource) in built.into_iter().enumerate() {
            let index = base + offset as u32;
            if index as usize == self.slots.len() {
                self.slots.push(Slot { generation: 0, resource: None });
            }
            let slot = &mut self.slots[index as usize];
            slot.resource = Some(resource);
            handles.push(ResourceHandle::new(self.graph_id, index, slot.generation));
        }
        self.directory.insert(base_name.to_string(), ResourceGroup { base, count });

        engine_debug!("lumina::ResourceRegistry",
            "Created resource group '{}' ({} x {}) at index {}",
            base_name, count, std::any::type_name::<T>(), base);
        Ok(handles)
    }

    /// Create a single global resource
    pub fn create_resource<T, F>(&mut self, name: &str, factory: F) -> Result<ResourceHandle<T>>
    where
        T: Resource,
        F: FnOnce(&str) -> Result<T>,
    {
        let mut factory = Some(factory);
        let mut handles = self.create_resources(1, name, |_, member_name| match factory.take() {
            Some(factory) => factory(member_name),
            None => Err(Error::InvalidState("Factory called twice".to_string())),
        })?;
        handles.pop().ok_or_else(|| Error::InvalidState(format!("No handle created for '{}'", name)))
    }

    /// First run of `count` vacant slots, or the end of the table
    fn find_vacant_run(&self, count: u32) -> u32 {
        let mut run_start = 0usize;
        let mut run_len = 0u32;
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.resource.is_some() {
                run_len = 0;
                continue;
            }
            if run_len == 0 {
                run_start = index;
            }
            run_len += 1;
            if run_len == count {
                return run_start as u32;
            }
        }
        // A vacant tail can be extended
        if run_len > 0 {
            run_start as u32
        } else {
            self.slots.len() as u32
        }
    }

    // ===== LOOKUP =====

    fn group_or_err(&self, name: &str) -> Result<ResourceGroup> {
        self.group(name).ok_or_else(|| {
            engine_error!("lumina::ResourceRegistry", "Resource not found: '{}'", name);
            Error::ResourceNotFound(name.to_string())
        })
    }

    fn downcast<T: Resource>(resource: &dyn Resource) -> Result<&T> {
        resource.as_any().downcast_ref::<T>().ok_or_else(|| Error::TypeMismatch {
            name: resource.name().to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    fn downcast_mut<T: Resource>(resource: &mut dyn Resource) -> Result<&mut T> {
        let name = resource.name().to_string();
        resource.as_any_mut().downcast_mut::<T>().ok_or(Error::TypeMismatch {
            name,
            expected: std::any::type_name::<T>(),
        })
    }

    fn slot_resource(&self, index: u32) -> Result<&dyn Resource> {
        let len = self.slot_count();
        let slot = self.slots.get(index as usize).ok_or(Error::OutOfRange { index, len })?;
        slot.resource
            .as_deref()
            .ok_or_else(|| Error::StaleHandle(format!("Slot {} is vacant", index)))
    }

    fn slot_resource_mut(&mut self, index: u32) -> Result<&mut (dyn Resource + 'static)> {
        let len = self.slot_count();
        let slot = self.slots.get_mut(index as usize).ok_or(Error::OutOfRange { index, len })?;
        match slot.resource.as_deref_mut() {
            Some(resource) => Ok(resource),
            None => Err(Error::StaleHandle(format!("Slot {} is vacant", index))),
        }
    }

    /// Resource at a raw flat index
    pub fn get_by_index<T: Resource>(&self, index: u32) -> Result<&T> {
        Self::downcast(self.slot_resource(index)?)
    }

    /// Group member for a frame index (`base + frame_index % count`)
    pub fn get<T: Resource>(&self, name: &str, frame_index: usize) -> Result<&T> {
        let group = self.group_or_err(name)?;
        self.get_by_index(group.index_for(frame_index))
    }

    pub fn get_mut<T: Resource>(&mut self, name: &str, frame_index: usize) -> Result<&mut T> {
        let group = self.group_or_err(name)?;
        Self::downcast_mut(self.slot_resource_mut(group.index_for(frame_index))?)
    }

    /// Probe for an optional resource.
    ///
    /// `Ok(None)` when the name is unknown, `Err(TypeMismatch)` when it is
    /// registered with another type.
    pub fn find<T: Resource>(&self, name: &str, frame_index: usize) -> Result<Option<&T>> {
        match self.group(name) {
            Some(group) => self.get_by_index(group.index_for(frame_index)).map(Some),
            None => {
                engine_warn!("lumina::ResourceRegistry", "Resource '{}' is not registered", name);
                Ok(None)
            }
        }
    }

    fn handle_for<T: Resource>(&self, group: ResourceGroup, frame_index: usize) -> Result<ResourceHandle<T>> {
        let index = group.index_for(frame_index);
        // Type check up front so the handle is known to resolve
        self.get_by_index::<T>(index)?;
        Ok(ResourceHandle::new(self.graph_id, index, self.slots[index as usize].generation))
    }

    /// Handle to a group member, without access control
    pub fn get_global_resource_handle<T: Resource>(&self, name: &str, frame_index: usize) -> Result<ResourceHandle<T>> {
        let group = self.group_or_err(name)?;
        self.handle_for(group, frame_index)
    }

    /// Handle to a resource a pass declared as a read.
    ///
    /// Fails with `AccessDenied` when `name` is not in the pass's read set.
    /// The resolved index is recorded in the pass's read table.
    pub fn get_resource_handle<T: Resource>(&mut self, name: &str, pass: PassId, frame_index: usize) -> Result<ResourceHandle<T>> {
        self.checked_access(name, pass, frame_index, false)
    }

    /// Handle to a resource a pass declared as a write (its output).
    pub fn bind_output<T: Resource>(&mut self, name: &str, pass: PassId, frame_index: usize) -> Result<ResourceHandle<T>> {
        self.checked_access(name, pass, frame_index, true)
    }

    fn checked_access<T: Resource>(&mut self, name: &str, pass: PassId, frame_index: usize, write: bool) -> Result<ResourceHandle<T>> {
        let access = self.passes.get(&pass).ok_or_else(|| Error::PassNotFound(pass.to_string()))?;
        let table = if write { &access.writes } else { &access.reads };
        if !table.contains_key(name) {
            engine_error!("lumina::ResourceRegistry",
                "Pass '{}' did not declare '{}' as {}", access.name, name, if write { "a write" } else { "a read" });
            return Err(Error::AccessDenied { pass: access.name.clone(), resource: name.to_string() });
        }
        let group = self.group_or_err(name)?;
        let handle = self.handle_for::<T>(group, frame_index)?;

        if let Some(access) = self.passes.get_mut(&pass) {
            let table = if write { &mut access.writes } else { &mut access.reads };
            if let Some(indices) = table.get_mut(name) {
                if !indices.contains(&handle.index) {
                    indices.push(handle.index);
                }
            }
        }
        Ok(handle)
    }

    /// Resolve a handle issued by this registry
    pub fn resolve<T: Resource>(&self, handle: &ResourceHandle<T>) -> Result<&T> {
        self.check_handle(handle)?;
        self.get_by_index(handle.index)
    }

    pub fn resolve_mut<T: Resource>(&mut self, handle: &ResourceHandle<T>) -> Result<&mut T> {
        self.check_handle(handle)?;
        Self::downcast_mut(self.slot_resource_mut(handle.index)?)
    }

    fn check_handle<T>(&self, handle: &ResourceHandle<T>) -> Result<()> {
        if !handle.is_valid() {
            return Err(Error::StaleHandle("Handle is invalidated".to_string()));
        }
        if handle.graph_id != self.graph_id {
            return Err(Error::StaleHandle(format!(
                "Handle belongs to graph {} (this is graph {})", handle.graph_id, self.graph_id
            )));
        }
        match self.slots.get(handle.index as usize) {
            Some(slot) if slot.generation != handle.generation => Err(Error::StaleHandle(format!(
                "Slot {} is at generation {} (handle has {})", handle.index, slot.generation, handle.generation
            ))),
            Some(_) => Ok(()),
            None => Err(Error::OutOfRange { index: handle.index, len: self.slot_count() }),
        }
    }

    // ===== REMOVAL =====

    fn group_of(&self, index: u32) -> Option<(String, ResourceGroup)> {
        self.directory
            .iter()
            .find(|(_, group)| group.contains(index))
            .map(|(name, group)| (name.clone(), *group))
    }

    /// Destroy one group member and compact its group.
    ///
    /// The members after it shift left by one slot, the group count drops
    /// by one and pass access tables are repaired. Every shifted slot gets a
    /// new generation, so outstanding handles into the shifted region become
    /// stale. The handle is invalidated.
    pub fn remove_resource<T: Resource>(&mut self, handle: &mut ResourceHandle<T>) -> Result<()> {
        self.check_handle(handle)?;
        self.get_by_index::<T>(handle.index)?;
        let removed = handle.index;
        let (name, group) = self.group_of(removed).ok_or_else(|| {
            Error::StaleHandle(format!("Slot {} belongs to no group", removed))
        })?;

        let end = group.base + group.count;
        let resource = self.slots[removed as usize].resource.take();
        for index in removed..end - 1 {
            let next = self.slots[index as usize + 1].resource.take();
            let slot = &mut self.slots[index as usize];
            slot.resource = next;
            slot.generation = slot.generation.wrapping_add(1);
        }
        let last = &mut self.slots[end as usize - 1];
        last.resource = None;
        last.generation = last.generation.wrapping_add(1);
        drop(resource);

        for access in self.passes.values_mut() {
            PassAccess::repair(&mut access.reads, group, removed);
            PassAccess::repair(&mut access.writes, group, removed);
        }

        if group.count == 1 {
            self.directory.remove(&name);
            engine_debug!("lumina::ResourceRegistry", "Removed last member of '{}'", name);
        } else if let Some(entry) = self.directory.get_mut(&name) {
            entry.count -= 1;
            engine_debug!("lumina::ResourceRegistry",
                "Removed member {} of '{}' ({} left)", removed - group.base, name, entry.count);
        }

        handle.invalidate();
        Ok(())
    }

    /// Destroy every member of a group and drop its directory entry
    pub fn remove_group(&mut self, name: &str) -> Result<()> {
        let group = self.group_or_err(name)?;
        for index in group.base..group.base + group.count {
            let slot = &mut self.slots[index as usize];
            slot.resource = None;
            slot.generation = slot.generation.wrapping_add(1);
        }
        for access in self.passes.values_mut() {
            for table in [&mut access.reads, &mut access.writes] {
                if let Some(indices) = table.get_mut(name) {
                    indices.clear();
                }
            }
        }
        self.directory.remove(name);
        engine_debug!("lumina::ResourceRegistry", "Removed resource group '{}'", name);
        Ok(())
    }

    // ===== PASS ACCESS TABLES =====

    /// Register a pass's declared read/write sets (empty index lists)
    pub fn register_pass(&mut self, pass: PassId, name: &str, dependencies: &DependencyDeclaration) -> Result<()> {
        if self.passes.contains_key(&pass) {
            return Err(Error::InvalidResource(format!("Pass '{}' is already registered", name)));
        }
        let table = |names: &[String]| -> FxHashMap<String, Vec<u32>> {
            names.iter().map(|n| (n.clone(), Vec::new())).collect()
        };
        self.passes.insert(pass, PassAccess {
            name: name.to_string(),
            reads: table(dependencies.reads()),
            writes: table(dependencies.writes()),
        });
        Ok(())
    }

    /// Flat indices a pass resolved for a declared read
    pub fn pass_reads(&self, pass: PassId, name: &str) -> Option<&[u32]> {
        self.passes.get(&pass)?.reads.get(name).map(Vec::as_slice)
    }

    /// Flat indices a pass bound for a declared write
    pub fn pass_writes(&self, pass: PassId, name: &str) -> Option<&[u32]> {
        self.passes.get(&pass)?.writes.get(name).map(Vec::as_slice)
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
