//! Swapchain-backed viewport for a native window surface

use ash::vk;

use super::camera::{self, Fov};
use super::viewport::{AcquiredImage, Viewport, ViewportImages};
use super::ViewportUniform;
use crate::config::{CameraConfig, RendererConfig};
use crate::render::backends::vulkan::{Semaphore, SharedDevice, SwapchainDesc, VulkanResult};

/// Surface properties chosen by the windowing collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowTarget {
    /// Window surface
    pub surface: vk::SurfaceKHR,
    /// Minimum image count the surface supports
    pub min_image_count: u32,
    /// Maximum image count, 0 for unlimited
    pub max_image_count: u32,
    /// Surface format
    pub format: vk::Format,
    /// Surface color space
    pub color_space: vk::ColorSpaceKHR,
    /// Current surface extent
    pub extent: vk::Extent2D,
    /// Current surface transform
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    /// Present mode
    pub present_mode: vk::PresentModeKHR,
}

/// Windowed viewport presenting through a swapchain
pub struct WindowViewport {
    images: ViewportImages,
    device: SharedDevice,
    swapchain: vk::SwapchainKHR,
    acquire_semaphores: Vec<Semaphore>,
    next_semaphore: usize,
    acquire_timeout: u64,
    camera: CameraConfig,
}

impl WindowViewport {
    /// Create the swapchain and acquire semaphore ring
    ///
    /// Framebuffers are built later by the renderer, once the composite pass exists.
    pub fn new(
        device: SharedDevice,
        target: &WindowTarget,
        depth_format: Option<vk::Format>,
        config: &RendererConfig,
        camera: CameraConfig,
    ) -> VulkanResult<Self> {
        let mut image_count = target.min_image_count + config.extra_swapchain_images;
        if target.max_image_count > 0 {
            image_count = image_count.min(target.max_image_count);
        }

        let swapchain = device.create_swapchain(&SwapchainDesc {
            surface: target.surface,
            min_image_count: image_count,
            format: target.format,
            color_space: target.color_space,
            extent: target.extent,
            pre_transform: target.pre_transform,
            present_mode: target.present_mode,
        })?;

        // From here on Drop cleans up whatever was created
        let mut viewport = Self {
            images: ViewportImages::new(device.clone(), target.format, depth_format),
            device: device.clone(),
            swapchain,
            acquire_semaphores: Vec::with_capacity(config.acquire_semaphore_count),
            next_semaphore: 0,
            acquire_timeout: config.acquire_timeout(),
            camera,
        };

        for _ in 0..config.acquire_semaphore_count.max(1) {
            viewport.acquire_semaphores.push(Semaphore::new(device.clone())?);
        }

        let images = device.swapchain_images(swapchain)?;
        log::info!(
            "Window viewport: {} swapchain images at {}x{}",
            images.len(),
            target.extent.width,
            target.extent.height
        );
        viewport.images.set_images(images, target.extent)?;

        Ok(viewport)
    }

    /// Swapchain handle
    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Camera settings
    pub fn camera(&self) -> &CameraConfig {
        &self.camera
    }

    /// Replace the camera settings
    pub fn set_camera(&mut self, camera: CameraConfig) {
        self.camera = camera;
    }
}

impl Viewport for WindowViewport {
    fn images(&self) -> &ViewportImages {
        &self.images
    }

    fn images_mut(&mut self) -> &mut ViewportImages {
        &mut self.images
    }

    fn acquire_image(&mut self) -> VulkanResult<AcquiredImage> {
        // Ring is sized independently of the image count
        let semaphore = self.acquire_semaphores[self.next_semaphore].handle();
        self.next_semaphore = (self.next_semaphore + 1) % self.acquire_semaphores.len();

        let index = self
            .device
            .acquire_next_image(self.swapchain, semaphore, self.acquire_timeout)?;

        Ok(AcquiredImage {
            index,
            wait_semaphore: Some(semaphore),
        })
    }

    fn release_image(&mut self, index: u32, signal: Option<vk::Semaphore>) -> VulkanResult<()> {
        self.device.queue_present(self.swapchain, index, signal)
    }

    fn is_signal_required(&self) -> bool {
        true
    }

    fn write_uniform(&self, uniform: &mut ViewportUniform) {
        let extent = self.images.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;

        let view = camera::look_at(self.camera.eye, self.camera.target, self.camera.up);
        let fov = Fov::symmetric(self.camera.fov_y_degrees.to_radians(), aspect);
        let projection = camera::projection(&fov, self.camera.near, self.camera.far);

        *uniform = ViewportUniform::from_matrices(view, projection);
    }
}

impl Drop for WindowViewport {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("wait_idle failed while dropping window viewport: {}", e);
        }
        self.images.destroy_images();
        self.acquire_semaphores.clear();
        self.device.destroy_swapchain(self.swapchain);
    }
}
