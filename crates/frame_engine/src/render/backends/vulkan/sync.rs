//! Vulkan synchronization primitives
//!
//! RAII wrappers over semaphores and fences. Each wrapper holds the shared
//! device so it can destroy its handle on drop.

use ash::vk;

use super::{SharedDevice, VulkanError, VulkanResult};

/// Semaphore wrapper with RAII cleanup
pub struct Semaphore {
    device: SharedDevice,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: SharedDevice) -> VulkanResult<Self> {
        let semaphore = device.create_semaphore()?;
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.semaphore);
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: SharedDevice,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: SharedDevice, signaled: bool) -> VulkanResult<Self> {
        let fence = device.create_fence(signaled)?;
        Ok(Self { device, fence })
    }

    /// Wait for the fence, failing with [`VulkanError::Timeout`] on expiry
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        if self.device.wait_for_fence(self.fence, timeout)? {
            Ok(())
        } else {
            Err(VulkanError::Timeout { what: "frame fence" })
        }
    }

    /// Reset fence
    pub fn reset(&self) -> VulkanResult<()> {
        self.device.reset_fence(self.fence)
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.fence);
    }
}
