//! Shared composite render pass
//!
//! One color attachment (cleared, stored, ending in the display's final layout)
//! plus an optional depth attachment, in a single subpass.

use ash::vk;

use crate::render::backends::vulkan::{CompositePassDesc, SharedDevice, VulkanResult};
use crate::render::displays::Display;

/// Render pass every viewport framebuffer is built against
pub struct CompositePass {
    device: SharedDevice,
    render_pass: vk::RenderPass,
    desc: CompositePassDesc,
}

impl CompositePass {
    /// Create the pass from the display's formats
    pub fn new(device: SharedDevice, display: &dyn Display) -> VulkanResult<Self> {
        let desc = CompositePassDesc {
            color_format: display.swapchain_format(),
            final_layout: display.final_layout(),
            depth_format: display.depth_format(),
        };
        let render_pass = device.create_render_pass(&desc)?;
        log::debug!(
            "Created composite pass ({:?} -> {:?}, depth {:?})",
            desc.color_format,
            desc.final_layout,
            desc.depth_format
        );

        Ok(Self {
            device,
            render_pass,
            desc,
        })
    }

    /// Get the render pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Formats the pass was built with
    pub fn desc(&self) -> &CompositePassDesc {
        &self.desc
    }
}

impl Drop for CompositePass {
    fn drop(&mut self) {
        self.device.destroy_render_pass(self.render_pass);
    }
}
