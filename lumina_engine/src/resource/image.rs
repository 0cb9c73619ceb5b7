/// 2D image with a default view, used as a render attachment.
///
/// The image tracks the layout it was last left in. Passes update it after
/// recording so that the next reader knows what the render pass transitioned
/// the image to.

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{
    Extent2D, GraphicsContext, GraphicsDevice, ImageDesc, ImageHandles, ImageLayout, ImageUsage,
    NativeHandle, TextureFormat,
};
use crate::{engine_bail, engine_warn, impl_resource};

pub struct Image {
    name: String,
    device: Arc<dyn GraphicsDevice>,
    handles: ImageHandles,
    extent: Extent2D,
    format: TextureFormat,
    usage: ImageUsage,
    layout: ImageLayout,
}

impl Image {
    pub fn new(ctx: &GraphicsContext, name: &str, desc: &ImageDesc) -> Result<Self> {
        if desc.extent.is_empty() {
            engine_bail!("lumina::Image", "Image '{}' cannot have an empty extent", name);
        }
        let handles = ctx.device().create_image(name, desc)?;
        Ok(Self {
            name: name.to_string(),
            device: Arc::clone(ctx.device()),
            handles,
            extent: desc.extent,
            format: desc.format,
            usage: desc.usage,
            layout: ImageLayout::Undefined,
        })
    }

    pub fn image(&self) -> NativeHandle {
        self.handles.image
    }

    pub fn view(&self) -> NativeHandle {
        self.handles.view
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn usage(&self) -> ImageUsage {
        self.usage
    }

    /// Layout the image was last transitioned to
    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub fn set_layout(&mut self, layout: ImageLayout) {
        self.layout = layout;
    }
}

impl_resource!(Image);

impl Drop for Image {
    fn drop(&mut self) {
        if let Err(e) = self.device.destroy_image(self.handles) {
            engine_warn!("lumina::Image", "Failed to destroy image '{}': {}", self.name, e);
        }
    }
}
