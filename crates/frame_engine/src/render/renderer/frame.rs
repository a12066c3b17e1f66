//! Frame-in-flight slots
//!
//! Everything the CPU writes for one frame lives in its slot and is reused only
//! after the slot's fence reports the GPU is done with it.

use ash::vk;

use crate::config::RendererConfig;
use crate::render::backends::vulkan::{Fence, Semaphore, SharedDevice, VulkanResult};
use crate::render::displays::ViewportUniform;
use crate::render::gpu::{DescriptorPool, GpuVector};

/// Resources owned by one element of the frame ring
pub struct FrameSlot {
    device: SharedDevice,
    /// Primary command buffer, re-recorded every use
    pub command_buffer: vk::CommandBuffer,
    /// Signaled when the slot's last submission completes
    pub in_flight: Fence,
    /// Signaled when rendering finishes, for presentation
    pub render_finished: Semaphore,
    /// Descriptor arena reset at the start of every use
    pub descriptor_pool: DescriptorPool,
    /// One [`ViewportUniform`] per active viewport
    pub viewport_uniforms: GpuVector,
}

impl FrameSlot {
    /// Allocate a slot; its fence starts signaled so the first wait passes
    pub fn new(device: SharedDevice, config: &RendererConfig) -> VulkanResult<Self> {
        let in_flight = Fence::new(device.clone(), true)?;
        let render_finished = Semaphore::new(device.clone())?;
        let descriptor_pool = DescriptorPool::new(device.clone(), &config.descriptor_pool)?;

        let mut viewport_uniforms = GpuVector::new(
            device.clone(),
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            std::mem::size_of::<ViewportUniform>() as u64,
        );
        viewport_uniforms.reserve(1)?;

        let command_buffer = device.allocate_command_buffer()?;

        Ok(Self {
            device,
            command_buffer,
            in_flight,
            render_finished,
            descriptor_pool,
            viewport_uniforms,
        })
    }
}

impl Drop for FrameSlot {
    fn drop(&mut self) {
        self.device.free_command_buffer(self.command_buffer);
    }
}
