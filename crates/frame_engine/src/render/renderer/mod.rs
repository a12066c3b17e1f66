//! Frame submission protocol
//!
//! The [`Renderer`] owns the composite render pass, the viewport descriptor
//! layout, the ring of frame slots and the attached render passes. Each call to
//! [`Renderer::render_frame`] records and submits exactly one command buffer
//! covering every active viewport.

pub mod composite_pass;
pub mod frame;
pub mod overlay_pass;
pub mod render_pass;


use ash::vk;

use crate::config::RendererConfig;
use crate::render::backends::vulkan::{FrameSubmission, SharedDevice, VulkanError, VulkanResult};
use crate::render::displays::{Display, ViewportUniform};
use crate::render::gpu::DescriptorSetLayout;

pub use composite_pass::CompositePass;
pub use frame::FrameSlot;
pub use overlay_pass::{LineVertex, OverlayPass};
pub use render_pass::{RenderPass, RenderPassContext};

/// Binding of the camera block inside the viewport descriptor set
pub const VIEWPORT_UNIFORM_BINDING: u32 = 0;

/// Drives one display through the frame-in-flight ring
pub struct Renderer<D: Display> {
    // Drop order: passes and viewports go before the objects they were built against
    passes: Vec<Box<dyn RenderPass>>,
    display: D,
    frames: Vec<FrameSlot>,
    viewport_layout: DescriptorSetLayout,
    composite_pass: CompositePass,
    device: SharedDevice,
    context: RenderPassContext,
    config: RendererConfig,
    current_frame: usize,
    frame_count: u64,
}

impl<D: Display> Renderer<D> {
    /// Build the composite pass, viewport framebuffers and frame slots
    pub fn new(device: SharedDevice, mut display: D, config: RendererConfig) -> VulkanResult<Self> {
        config.validate().map_err(|e| VulkanError::InvalidOperation {
            reason: format!("invalid renderer config: {}", e),
        })?;

        let composite_pass = CompositePass::new(device.clone(), &display)?;
        display.create_images(composite_pass.handle())?;

        let mut viewport_layout = DescriptorSetLayout::new(device.clone());
        let binding = viewport_layout.add_dynamic_uniform_buffer(std::mem::size_of::<ViewportUniform>() as u64)?;
        debug_assert_eq!(binding, VIEWPORT_UNIFORM_BINDING);
        let viewport_layout_handle = viewport_layout.layout()?;

        let frames = (0..config.frames_in_flight)
            .map(|_| FrameSlot::new(device.clone(), &config))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::info!(
            "Renderer ready: {} frames in flight, {:?} color, depth {:?}",
            frames.len(),
            composite_pass.desc().color_format,
            composite_pass.desc().depth_format
        );

        Ok(Self {
            passes: Vec::new(),
            display,
            context: RenderPassContext {
                composite_pass: composite_pass.handle(),
                viewport_layout: viewport_layout_handle,
                frames_in_flight: frames.len(),
            },
            // First frame advances to slot 0
            current_frame: frames.len() - 1,
            frames,
            viewport_layout,
            composite_pass,
            device,
            config,
            frame_count: 0,
        })
    }

    /// Attach a render pass; attachment order is render order
    ///
    /// Only allowed before the first frame.
    pub fn add_render_pass(&mut self, mut pass: Box<dyn RenderPass>) -> VulkanResult<()> {
        if self.frame_count > 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "render passes must be attached before the first frame".to_string(),
            });
        }
        pass.create_frame_data(&self.context)?;
        self.passes.push(pass);
        log::debug!("Attached render pass #{}", self.passes.len());
        Ok(())
    }

    /// Record and submit one frame for every active viewport
    ///
    /// Blocks until the next frame slot is free. Any error is fatal to the
    /// frame loop.
    pub fn render_frame(&mut self) -> VulkanResult<()> {
        self.submit_frame().map_err(|e| {
            log::error!("Frame {} failed: {}", self.frame_count, e);
            e
        })
    }

    fn submit_frame(&mut self) -> VulkanResult<()> {
        self.current_frame = (self.current_frame + 1) % self.frames.len();
        let frame_index = self.current_frame;
        let clear_color = self.config.clear_color;
        let composite_pass = self.composite_pass.handle();
        let device = &self.device;
        let passes = &mut self.passes;
        let frame = &mut self.frames[frame_index];

        frame.in_flight.wait(self.config.fence_timeout())?;
        frame.descriptor_pool.reset()?;

        let mut viewports = self.display.acquire_viewports();
        let mut wait_semaphores = Vec::with_capacity(viewports.len());
        let mut signal_required = false;
        for viewport in viewports.iter_mut() {
            if let Some(semaphore) = viewport.acquire()? {
                wait_semaphores.push(semaphore);
            }
            signal_required |= viewport.is_signal_required();
        }

        frame.viewport_uniforms.reserve(viewports.len())?;
        let mut viewport_descriptor = frame.descriptor_pool.allocate(&mut self.viewport_layout)?;
        viewport_descriptor.update_dynamic_buffer(VIEWPORT_UNIFORM_BINDING, frame.viewport_uniforms.buffer())?;
        for pass in passes.iter_mut() {
            pass.allocate_descriptors(frame_index, &mut frame.descriptor_pool)?;
        }

        let command_buffer = frame.command_buffer;
        device.begin_command_buffer(command_buffer)?;

        for pass in passes.iter_mut() {
            pass.pre_render(frame_index, command_buffer)?;
        }

        for (index, viewport) in viewports.iter().enumerate() {
            let offset = u32::try_from(frame.viewport_uniforms.offset_of(index)).map_err(|_| {
                VulkanError::InvalidOperation {
                    reason: format!("viewport {} uniform offset exceeds u32", index),
                }
            })?;
            viewport_descriptor.set_dynamic_offset(VIEWPORT_UNIFORM_BINDING, offset)?;

            viewport.begin_render_pass(command_buffer, composite_pass, clear_color)?;
            for pass in passes.iter_mut() {
                pass.render(frame_index, command_buffer, &viewport_descriptor)?;
            }
            device.cmd_end_render_pass(command_buffer);
        }

        device.end_command_buffer(command_buffer)?;

        // The GPU reads uniforms only once the submission below is visible
        for (index, viewport) in viewports.iter().enumerate() {
            let mut uniform = ViewportUniform::default();
            viewport.write_uniform(&mut uniform);
            frame.viewport_uniforms.write_element(index, &uniform)?;
        }

        let render_finished = frame.render_finished.handle();
        frame.in_flight.reset()?;
        device.queue_submit(&FrameSubmission {
            command_buffer,
            wait_semaphores: &wait_semaphores,
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal_semaphore: signal_required.then_some(render_finished),
            fence: frame.in_flight.handle(),
        })?;

        for viewport in viewports.iter_mut() {
            viewport.release(render_finished)?;
        }

        self.frame_count += 1;
        Ok(())
    }

    /// Shared composite render pass
    pub fn composite_pass(&self) -> vk::RenderPass {
        self.context.composite_pass
    }

    /// Layout of the per-viewport camera descriptor set
    pub fn viewport_layout(&self) -> vk::DescriptorSetLayout {
        self.context.viewport_layout
    }

    /// What attached passes were created against
    pub fn context(&self) -> &RenderPassContext {
        &self.context
    }

    /// Frame slot ring size
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Slot used by the most recent frame
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Frames submitted so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Attached render passes
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Display collaborator
    pub fn display(&self) -> &D {
        &self.display
    }

    /// Display collaborator, mutably
    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }
}

impl<D: Display> Drop for Renderer<D> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("wait_idle failed while dropping renderer: {}", e);
        }
        for pass in self.passes.iter_mut() {
            pass.destroy_frame_data();
        }
        log::debug!("Renderer destroyed after {} frames", self.frame_count);
    }
}
