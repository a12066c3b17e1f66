//! Render pass plugin interface
//!
//! The renderer calls every attached pass, in attachment order:
//! `allocate_descriptors` for all passes, then `pre_render` for all passes,
//! then `render` for all passes once per active viewport.

use ash::vk;

use crate::render::backends::vulkan::VulkanResult;
use crate::render::gpu::{DescriptorPool, DescriptorSet};

/// What a pass can see of the renderer while creating its resources
#[derive(Debug, Clone, Copy)]
pub struct RenderPassContext {
    /// Shared composite render pass, for pipeline compatibility
    pub composite_pass: vk::RenderPass,
    /// Layout of the per-viewport camera descriptor
    pub viewport_layout: vk::DescriptorSetLayout,
    /// Number of frame slots; per-frame data is indexed by slot
    pub frames_in_flight: usize,
}

/// Plugin drawing into every viewport
pub trait RenderPass {
    /// Create per-slot resources
    fn create_frame_data(&mut self, context: &RenderPassContext) -> VulkanResult<()>;

    /// Release per-slot resources; the device is idle
    fn destroy_frame_data(&mut self);

    /// Allocate this frame's descriptor sets from the slot's freshly reset pool
    fn allocate_descriptors(&mut self, frame_index: usize, pool: &mut DescriptorPool) -> VulkanResult<()>;

    /// Record viewport-independent work, outside any render pass instance
    fn pre_render(&mut self, frame_index: usize, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Record draws for the current viewport inside the composite pass
    ///
    /// `viewport_descriptor` already carries this viewport's dynamic offset.
    fn render(
        &mut self,
        frame_index: usize,
        command_buffer: vk::CommandBuffer,
        viewport_descriptor: &DescriptorSet,
    ) -> VulkanResult<()>;
}
