//! Viewport backed by a headset session swapchain
//!
//! The session runtime owns the images and synchronizes presentation itself,
//! so this variant never asks the frame for a render-finished semaphore.

use ash::vk;

use super::camera::{self, Fov, Pose};
use super::viewport::{AcquiredImage, Viewport, ViewportImages};
use super::ViewportUniform;
use crate::config::CameraConfig;
use crate::render::backends::vulkan::{SharedDevice, VulkanResult};

/// Per-eye swapchain provided by a session runtime
pub trait SessionSwapchain {
    /// Images owned by the runtime
    fn images(&self) -> Vec<vk::Image>;

    /// Image extent
    fn extent(&self) -> vk::Extent2D;

    /// Acquire the next image and wait until it is writable
    fn acquire_image(&mut self) -> VulkanResult<u32>;

    /// Release the last acquired image back to the runtime
    fn release_image(&mut self) -> VulkanResult<()>;

    /// Pose and field of view of this eye for the current frame
    fn view(&self) -> (Pose, Fov);
}

/// Session-backed viewport
pub struct SessionViewport {
    images: ViewportImages,
    swapchain: Box<dyn SessionSwapchain>,
    near: f32,
    far: f32,
}

impl SessionViewport {
    /// Wrap a session swapchain; clip planes come from `camera`
    pub fn new(
        device: SharedDevice,
        swapchain: Box<dyn SessionSwapchain>,
        format: vk::Format,
        depth_format: Option<vk::Format>,
        camera: &CameraConfig,
    ) -> VulkanResult<Self> {
        let mut images = ViewportImages::new(device, format, depth_format);
        images.set_images(swapchain.images(), swapchain.extent())?;

        Ok(Self {
            images,
            swapchain,
            near: camera.near,
            far: camera.far,
        })
    }
}

impl Viewport for SessionViewport {
    fn images(&self) -> &ViewportImages {
        &self.images
    }

    fn images_mut(&mut self) -> &mut ViewportImages {
        &mut self.images
    }

    fn acquire_image(&mut self) -> VulkanResult<AcquiredImage> {
        let index = self.swapchain.acquire_image()?;
        Ok(AcquiredImage {
            index,
            wait_semaphore: None,
        })
    }

    fn release_image(&mut self, _index: u32, _signal: Option<vk::Semaphore>) -> VulkanResult<()> {
        self.swapchain.release_image()
    }

    fn is_signal_required(&self) -> bool {
        false
    }

    fn write_uniform(&self, uniform: &mut ViewportUniform) {
        let (pose, fov) = self.swapchain.view();
        let view = camera::pose_view(&pose);
        let projection = camera::projection(&fov, self.near, self.far);

        *uniform = ViewportUniform::from_matrices(view, projection);
        uniform.position = [pose.position[0], pose.position[1], pose.position[2], 1.0];
    }
}

impl Drop for SessionViewport {
    fn drop(&mut self) {
        // Framebuffers reference runtime images; tear down before the swapchain
        self.images.destroy_images();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::mock::{Call, MockDevice};
    use approx::assert_relative_eq;
    use ash::vk::Handle;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        acquired: u32,
        released: u32,
    }

    struct FakeEye {
        log: Arc<Mutex<Log>>,
        next: u32,
    }

    impl SessionSwapchain for FakeEye {
        fn images(&self) -> Vec<vk::Image> {
            (10..13).map(vk::Image::from_raw).collect()
        }

        fn extent(&self) -> vk::Extent2D {
            vk::Extent2D { width: 1000, height: 1000 }
        }

        fn acquire_image(&mut self) -> VulkanResult<u32> {
            self.log.lock().unwrap().acquired += 1;
            let index = self.next;
            self.next = (self.next + 1) % 3;
            Ok(index)
        }

        fn release_image(&mut self) -> VulkanResult<()> {
            self.log.lock().unwrap().released += 1;
            Ok(())
        }

        fn view(&self) -> (Pose, Fov) {
            let pose = Pose {
                orientation: [0.0, 0.0, 0.0, 1.0],
                position: [0.0, 1.6, 0.0],
            };
            let fov = Fov {
                angle_left: -0.8,
                angle_right: 0.7,
                angle_up: 0.75,
                angle_down: -0.85,
            };
            (pose, fov)
        }
    }

    fn viewport(mock: &Arc<MockDevice>, log: &Arc<Mutex<Log>>) -> SessionViewport {
        let eye = FakeEye {
            log: log.clone(),
            next: 0,
        };
        SessionViewport::new(
            mock.shared(),
            Box::new(eye),
            vk::Format::R8G8B8A8_SRGB,
            Some(vk::Format::D32_SFLOAT),
            &CameraConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_session_needs_no_semaphores() {
        let mock = MockDevice::new();
        let log = Arc::new(Mutex::new(Log::default()));
        let mut viewport = viewport(&mock, &log);
        viewport.images_mut().create_images(vk::RenderPass::null()).unwrap();

        assert!(!viewport.is_signal_required());
        assert_eq!(viewport.acquire().unwrap(), None);
        viewport.release(vk::Semaphore::from_raw(7)).unwrap();

        let log = log.lock().unwrap();
        assert_eq!((log.acquired, log.released), (1, 1));
        assert!(!mock.calls().iter().any(|call| matches!(call, Call::Present { .. })));
    }

    #[test]
    fn test_uniform_uses_eye_pose_and_fov() {
        let mock = MockDevice::new();
        let log = Arc::new(Mutex::new(Log::default()));
        let viewport = viewport(&mock, &log);

        let mut uniform = ViewportUniform::default();
        viewport.write_uniform(&mut uniform);

        assert_eq!(uniform.position, [0.0, 1.6, 0.0, 1.0]);
        // View translates by the inverse eye height
        assert_relative_eq!(uniform.view[3][1], -1.6, epsilon = 1e-6);
        // Off-center frustum puts a non-zero term in the third column
        assert!(uniform.projection[2][0].abs() > 1e-3);
    }
}
