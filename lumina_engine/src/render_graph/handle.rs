/// Typed resource handle.
///
/// A handle is a back-reference into one `ResourceRegistry`: the id of the
/// registry it came from, a flat slot index and the generation of that slot
/// when the handle was issued. It never owns the resource. Removing or
/// compacting a group bumps the generation of every affected slot, so stale
/// handles fail to resolve instead of aliasing a different resource.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use crate::error::Result;
use crate::resource::Resource;
use super::registry::ResourceRegistry;

pub struct ResourceHandle<T> {
    pub(crate) graph_id: u32,
    pub(crate) index: u32,
    pub(crate) generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResourceHandle<T> {
    /// Sentinel index of an invalidated handle
    pub const INVALID_INDEX: u32 = u32::MAX;

    pub(crate) fn new(graph_id: u32, index: u32, generation: u32) -> Self {
        Self { graph_id, index, generation, _marker: PhantomData }
    }

    /// A handle that resolves to nothing
    pub fn invalid() -> Self {
        Self::new(0, Self::INVALID_INDEX, 0)
    }

    pub fn is_valid(&self) -> bool {
        self.index != Self::INVALID_INDEX
    }

    /// Flat registry index
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub(crate) fn invalidate(&mut self) {
        self.index = Self::INVALID_INDEX;
    }
}

impl<T: Resource> ResourceHandle<T> {
    /// Resolve through the registry
    pub fn get<'a>(&self, registry: &'a ResourceRegistry) -> Result<&'a T> {
        registry.resolve(self)
    }

    pub fn get_mut<'a>(&self, registry: &'a mut ResourceRegistry) -> Result<&'a mut T> {
        registry.resolve_mut(self)
    }
}

// Manual impls: derives would require T: Clone/PartialEq/...

impl<T> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ResourceHandle<T> {}

impl<T> PartialEq for ResourceHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.graph_id == other.graph_id
            && self.index == other.index
            && self.generation == other.generation
    }
}

impl<T> Eq for ResourceHandle<T> {}

impl<T> Hash for ResourceHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.graph_id.hash(state);
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Default for ResourceHandle<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T> fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "ResourceHandle(g{}:{}.v{})", self.graph_id, self.index, self.generation)
        } else {
            write!(f, "ResourceHandle(INVALID)")
        }
    }
}
