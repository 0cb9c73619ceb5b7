/// Scene - the renderable objects the G-Buffer pass draws.
///
/// Uses a SlotMap for O(1) insert/remove with stable keys. The scene is
/// owned by the application and shared with the G-Buffer pass through
/// `Arc<RwLock<Scene>>`; the render graph only reads it.

use std::sync::Arc;
use glam::Mat4;
use slotmap::{new_key_type, SlotMap};
use crate::error::{Error, Result};
use crate::graphics_device::BufferUsage;
use crate::resource::{Buffer, Resource};
use crate::engine_error;

new_key_type! {
    /// Stable key of a RenderObject within a Scene.
    ///
    /// A key becomes invalid only when its own object is removed.
    pub struct RenderObjectKey;
}

/// One indexed draw: geometry buffers, transform and material sort key
#[derive(Clone)]
pub struct RenderObject {
    pub vertex_buffer: Arc<Buffer>,
    /// 32-bit indices
    pub index_buffer: Arc<Buffer>,
    pub index_count: u32,
    pub transform: Mat4,
    /// Draws are issued in ascending key order
    pub material_key: u32,
}

impl RenderObject {
    /// Validate the buffers and build an object with an identity transform
    pub fn new(vertex_buffer: Arc<Buffer>, index_buffer: Arc<Buffer>, index_count: u32) -> Result<Self> {
        if !vertex_buffer.usage().contains(BufferUsage::VERTEX) {
            engine_error!("lumina::Scene", "Buffer '{}' is not a vertex buffer", vertex_buffer.name());
            return Err(Error::InvalidResource(format!("Buffer '{}' is not a vertex buffer", vertex_buffer.name())));
        }
        if !index_buffer.usage().contains(BufferUsage::INDEX) {
            engine_error!("lumina::Scene", "Buffer '{}' is not an index buffer", index_buffer.name());
            return Err(Error::InvalidResource(format!("Buffer '{}' is not an index buffer", index_buffer.name())));
        }
        let capacity = index_buffer.size() / std::mem::size_of::<u32>() as u64;
        if index_count as u64 > capacity {
            return Err(Error::OutOfRange { index: index_count, len: capacity as u32 });
        }
        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count,
            transform: Mat4::IDENTITY,
            material_key: 0,
        })
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_material_key(mut self, material_key: u32) -> Self {
        self.material_key = material_key;
        self
    }
}

#[derive(Default)]
pub struct Scene {
    objects: SlotMap<RenderObjectKey, RenderObject>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, object: RenderObject) -> RenderObjectKey {
        self.objects.insert(object)
    }

    /// Remove an object, returning it if the key was valid
    pub fn remove_object(&mut self, key: RenderObjectKey) -> Option<RenderObject> {
        self.objects.remove(key)
    }

    pub fn object(&self, key: RenderObjectKey) -> Option<&RenderObject> {
        self.objects.get(key)
    }

    /// Set the transform of an object. Returns false if the key is invalid.
    pub fn set_transform(&mut self, key: RenderObjectKey, transform: Mat4) -> bool {
        match self.objects.get_mut(key) {
            Some(object) => {
                object.transform = transform;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RenderObjectKey, &RenderObject)> {
        self.objects.iter()
    }

    /// Objects in draw order (ascending material key, stable otherwise)
    pub fn draw_order(&self) -> Vec<&RenderObject> {
        let mut objects: Vec<&RenderObject> = self.objects.values().collect();
        objects.sort_by_key(|o| o.material_key);
        objects
    }
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
