//! Presentable render targets
//!
//! A [`Viewport`] variant only supplies acquisition, presentation and camera
//! state. The image set, framebuffers, depth attachment and the acquire/release
//! bookkeeping live in [`ViewportImages`], which every variant holds by value.

use ash::vk;

use super::ViewportUniform;
use crate::render::backends::vulkan::{GpuImage, RenderPassBegin, SharedDevice, VulkanError, VulkanResult};

/// Result of a variant-specific image acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Index of the acquired image
    pub index: u32,
    /// Semaphore the GPU must wait on before writing the image
    pub wait_semaphore: Option<vk::Semaphore>,
}

/// One presentable image with its view and framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportImage {
    /// Image owned by the presentation backend
    pub image: vk::Image,
    /// Color view
    pub view: vk::ImageView,
    /// Framebuffer over [view, depth]
    pub framebuffer: vk::Framebuffer,
}

/// Shared image and framebuffer management for viewports
pub struct ViewportImages {
    device: SharedDevice,
    format: vk::Format,
    depth_format: Option<vk::Format>,
    extent: vk::Extent2D,
    source_images: Vec<vk::Image>,
    images: Vec<ViewportImage>,
    depth: Option<GpuImage>,
    acquired: Option<u32>,
}

impl ViewportImages {
    /// Create an empty image set
    pub fn new(device: SharedDevice, format: vk::Format, depth_format: Option<vk::Format>) -> Self {
        Self {
            device,
            format,
            depth_format,
            extent: vk::Extent2D::default(),
            source_images: Vec::new(),
            images: Vec::new(),
            depth: None,
            acquired: None,
        }
    }

    /// Provide the backend images and their extent
    pub fn set_images(&mut self, images: Vec<vk::Image>, extent: vk::Extent2D) -> VulkanResult<()> {
        if self.is_ready() {
            return Err(VulkanError::InvalidOperation {
                reason: "viewport images replaced while framebuffers exist".to_string(),
            });
        }
        self.source_images = images;
        self.extent = extent;
        Ok(())
    }

    /// Build views, the depth attachment and framebuffers for `render_pass`
    ///
    /// Requires [`Self::set_images`] first. Does nothing if already created.
    pub fn create_images(&mut self, render_pass: vk::RenderPass) -> VulkanResult<()> {
        if self.is_ready() {
            return Ok(());
        }
        if self.source_images.is_empty() || self.extent.width == 0 || self.extent.height == 0 {
            return Err(VulkanError::ViewportNotReady);
        }

        if let Err(e) = self.build_images(render_pass) {
            // Partial sets are never kept; a retry starts from scratch
            self.destroy_images();
            return Err(e);
        }

        log::debug!(
            "Created {} viewport images ({}x{}, depth: {})",
            self.images.len(),
            self.extent.width,
            self.extent.height,
            self.depth.is_some()
        );
        Ok(())
    }

    fn build_images(&mut self, render_pass: vk::RenderPass) -> VulkanResult<()> {
        if let Some(depth_format) = self.depth_format {
            self.depth = Some(self.device.create_depth_image(depth_format, self.extent)?);
        }
        let depth_view = self.depth.map(|depth| depth.view);

        for &image in &self.source_images {
            let view = self
                .device
                .create_image_view(image, self.format, vk::ImageAspectFlags::COLOR)?;

            let attachments: Vec<_> = std::iter::once(view).chain(depth_view).collect();
            let framebuffer = match self.device.create_framebuffer(render_pass, &attachments, self.extent) {
                Ok(framebuffer) => framebuffer,
                Err(e) => {
                    self.device.destroy_image_view(view);
                    return Err(e);
                }
            };

            self.images.push(ViewportImage {
                image,
                view,
                framebuffer,
            });
        }
        Ok(())
    }

    /// Destroy framebuffers, views and depth; safe to call repeatedly
    pub fn destroy_images(&mut self) {
        for image in self.images.drain(..) {
            self.device.destroy_framebuffer(image.framebuffer);
            self.device.destroy_image_view(image.view);
        }
        if let Some(depth) = self.depth.take() {
            self.device.destroy_image(&depth);
        }
        self.acquired = None;
    }

    /// Whether framebuffers exist for every image
    pub fn is_ready(&self) -> bool {
        !self.images.is_empty() && self.images.len() == self.source_images.len()
    }

    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Color format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Number of images
    pub fn len(&self) -> usize {
        self.source_images.len()
    }

    /// Whether no images were provided
    pub fn is_empty(&self) -> bool {
        self.source_images.is_empty()
    }

    /// Created images
    pub fn images(&self) -> &[ViewportImage] {
        &self.images
    }

    /// Index of the currently acquired image
    pub fn acquired(&self) -> Option<u32> {
        self.acquired
    }

    /// Record `index` as acquired
    pub fn mark_acquired(&mut self, index: u32) -> VulkanResult<()> {
        if let Some(held) = self.acquired {
            return Err(VulkanError::ViewportAlreadyAcquired { index: held });
        }
        if index as usize >= self.images.len() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("acquired image {} of {}", index, self.images.len()),
            });
        }
        self.acquired = Some(index);
        Ok(())
    }

    /// Clear and return the acquired index
    pub fn take_acquired(&mut self) -> VulkanResult<u32> {
        self.acquired.take().ok_or(VulkanError::ViewportNotAcquired)
    }

    /// Begin `render_pass` on the acquired image with full viewport and scissor
    pub fn begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        clear_color: [f32; 4],
    ) -> VulkanResult<()> {
        let index = self.acquired.ok_or(VulkanError::ViewportNotAcquired)?;
        let image = self.images.get(index as usize).ok_or(VulkanError::ViewportNotReady)?;

        let mut clear_values = vec![vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        }];
        if self.depth.is_some() {
            clear_values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            });
        }

        self.device.cmd_begin_render_pass(
            command_buffer,
            &RenderPassBegin {
                render_pass,
                framebuffer: image.framebuffer,
                extent: self.extent,
                clear_values: &clear_values,
            },
        );
        self.device.cmd_set_viewport_and_scissor(command_buffer, self.extent);
        Ok(())
    }
}

impl Drop for ViewportImages {
    fn drop(&mut self) {
        self.destroy_images();
    }
}

/// Presentable render target
///
/// Implementors provide image acquisition, presentation and camera state; the
/// acquire/release pairing and render pass setup are provided on top.
pub trait Viewport {
    /// Shared image set
    fn images(&self) -> &ViewportImages;

    /// Shared image set, mutably
    fn images_mut(&mut self) -> &mut ViewportImages;

    /// Obtain the next image from the presentation backend
    fn acquire_image(&mut self) -> VulkanResult<AcquiredImage>;

    /// Hand `index` back for presentation, waiting on `signal` if given
    fn release_image(&mut self, index: u32, signal: Option<vk::Semaphore>) -> VulkanResult<()>;

    /// Whether presentation must wait on the frame's render-finished semaphore
    fn is_signal_required(&self) -> bool;

    /// Fill the camera block for this viewport
    fn write_uniform(&self, uniform: &mut ViewportUniform);

    /// Acquire the next image; returns the semaphore to wait on, if any
    fn acquire(&mut self) -> VulkanResult<Option<vk::Semaphore>> {
        let images = self.images();
        if !images.is_ready() {
            return Err(VulkanError::ViewportNotReady);
        }
        if let Some(index) = images.acquired() {
            return Err(VulkanError::ViewportAlreadyAcquired { index });
        }

        let acquired = self.acquire_image()?;
        self.images_mut().mark_acquired(acquired.index)?;
        Ok(acquired.wait_semaphore)
    }

    /// Present the acquired image
    fn release(&mut self, signal: vk::Semaphore) -> VulkanResult<()> {
        let index = self.images_mut().take_acquired()?;
        let wait = self.is_signal_required().then_some(signal);
        self.release_image(index, wait)
    }

    /// Begin the composite pass on the acquired image
    fn begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        clear_color: [f32; 4],
    ) -> VulkanResult<()> {
        self.images()
            .begin_render_pass(command_buffer, render_pass, clear_color)
    }

    /// Image extent
    fn extent(&self) -> vk::Extent2D {
        self.images().extent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::mock::{Call, MockDevice};

    fn images(mock: &std::sync::Arc<MockDevice>, depth: bool) -> ViewportImages {
        let mut images = ViewportImages::new(
            mock.shared(),
            vk::Format::B8G8R8A8_SRGB,
            depth.then_some(vk::Format::D32_SFLOAT),
        );
        let backing = (1..=3).map(vk::Handle::from_raw).collect();
        images
            .set_images(backing, vk::Extent2D { width: 640, height: 480 })
            .unwrap();
        images
    }

    #[test]
    fn test_create_requires_images() {
        let mock = MockDevice::new();
        let mut empty = ViewportImages::new(mock.shared(), vk::Format::B8G8R8A8_SRGB, None);
        assert_eq!(
            empty.create_images(vk::RenderPass::null()),
            Err(VulkanError::ViewportNotReady)
        );
    }

    #[test]
    fn test_create_and_destroy_are_idempotent() {
        let mock = MockDevice::new();
        let mut images = images(&mock, true);
        images.create_images(vk::RenderPass::null()).unwrap();
        images.create_images(vk::RenderPass::null()).unwrap();
        // 3 views + 3 framebuffers + depth image
        assert_eq!(mock.live_objects(), 7);

        images.destroy_images();
        images.destroy_images();
        assert_eq!(mock.live_objects(), 0);
        assert!(!images.is_ready());
    }

    #[test]
    fn test_failed_create_keeps_nothing_and_can_retry() {
        let mock = MockDevice::new();
        let mut images = images(&mock, true);
        mock.fail_image_views_after(Some(1));

        assert!(matches!(
            images.create_images(vk::RenderPass::null()),
            Err(VulkanError::CreationFailed { object: "image view", .. })
        ));
        assert!(images.images().is_empty());
        assert!(!images.is_ready());
        assert_eq!(mock.live_objects(), 0);

        mock.fail_image_views_after(None);
        images.create_images(vk::RenderPass::null()).unwrap();
        assert!(images.is_ready());
        assert_eq!(images.images().len(), 3);
        assert_eq!(mock.live_objects(), 7);
    }

    #[test]
    fn test_acquire_bookkeeping() {
        let mock = MockDevice::new();
        let mut images = images(&mock, false);
        images.create_images(vk::RenderPass::null()).unwrap();

        assert_eq!(images.take_acquired(), Err(VulkanError::ViewportNotAcquired));
        images.mark_acquired(2).unwrap();
        assert_eq!(images.mark_acquired(0), Err(VulkanError::ViewportAlreadyAcquired { index: 2 }));
        assert_eq!(images.take_acquired(), Ok(2));
        assert!(images.mark_acquired(3).is_err());
    }

    #[test]
    fn test_begin_render_pass_clears_and_sets_viewport() {
        let mock = MockDevice::new();
        let mut images = images(&mock, true);
        images.create_images(vk::RenderPass::null()).unwrap();
        images.mark_acquired(1).unwrap();

        images
            .begin_render_pass(vk::CommandBuffer::null(), vk::RenderPass::null(), [0.2, 0.0, 0.0, 1.0])
            .unwrap();

        let framebuffer = images.images()[1].framebuffer;
        assert_eq!(
            mock.calls(),
            vec![
                Call::BeginRenderPass {
                    framebuffer,
                    clear_color: [0.2, 0.0, 0.0, 1.0]
                },
                Call::SetViewport(vk::Extent2D { width: 640, height: 480 }),
            ]
        );
    }
}
