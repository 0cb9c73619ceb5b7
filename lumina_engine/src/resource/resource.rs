/// Resource trait - anything the resource registry can own.
///
/// Resources are heterogeneous GPU-side objects (buffers, images, pipelines,
/// sync primitives...). The registry stores them as `Box<dyn Resource>` and
/// recovers the concrete type through `as_any` when a typed lookup is made.
/// Dropping a resource releases its backend object.

use std::any::Any;

pub trait Resource: Any + Send + Sync {
    /// Debug name (the registry member name, e.g. "Pass Fence #1")
    fn name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Implement `Resource` for a struct with a `name: String` field
#[macro_export]
macro_rules! impl_resource {
    ($ty:ty) => {
        impl $crate::resource::Resource for $ty {
            fn name(&self) -> &str {
                &self.name
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    };
}
