//! Vulkan texture allocation for render targets and history buffers.

use std::sync::Arc;

use crate::error::Result;
use crate::targets::TextureAllocator;
use ash::vk;
use glam::UVec2;
use radiance_core::TextureType;
use radiance_gpu::command::transition_image;
use radiance_gpu::{GpuContext, GpuTexture};

/// Layout every render pass expects its storage images in.
pub const TARGET_LAYOUT: vk::ImageLayout = vk::ImageLayout::GENERAL;

/// Allocates render textures through the context's allocator.
pub struct VulkanTextureAllocator {
    context: Arc<GpuContext>,
}

impl VulkanTextureAllocator {
    pub fn new(context: Arc<GpuContext>) -> Self {
        Self { context }
    }
}

impl TextureAllocator for VulkanTextureAllocator {
    type Texture = GpuTexture;

    fn allocate(&mut self, ty: TextureType, size: UVec2) -> Result<GpuTexture> {
        let texture = self.context.allocator().lock().create_texture(
            ty.format(),
            size.x.max(1),
            size.y.max(1),
            ty.name(),
        )?;
        Ok(texture)
    }

    fn release(&mut self, texture: &mut GpuTexture) -> Result<()> {
        self.context.allocator().lock().free_texture(texture)?;
        Ok(())
    }

    fn prepare(&mut self, texture: &mut GpuTexture) -> Result<()> {
        // Discarding contents is allowed, so always transition from UNDEFINED.
        let image = texture.image;
        self.context.submit_and_wait(|device, cmd| unsafe {
            transition_image(device, cmd, image, vk::ImageLayout::UNDEFINED, TARGET_LAYOUT);
        })?;
        texture.layout = TARGET_LAYOUT;
        Ok(())
    }
}
