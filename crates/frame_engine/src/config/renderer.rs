//! Renderer configuration

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Largest supported frame-in-flight ring
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// Descriptor capacity of one frame slot's pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorPoolConfig {
    /// Sets allocatable between resets
    pub max_sets: u32,
    /// Plain uniform buffer descriptors
    pub uniform_buffers: u32,
    /// Dynamic uniform buffer descriptors
    pub dynamic_uniform_buffers: u32,
    /// Storage buffer descriptors
    pub storage_buffers: u32,
    /// Combined image sampler descriptors
    pub combined_image_samplers: u32,
}

impl Default for DescriptorPoolConfig {
    fn default() -> Self {
        Self {
            max_sets: 64,
            uniform_buffers: 64,
            dynamic_uniform_buffers: 64,
            storage_buffers: 64,
            combined_image_samplers: 256,
        }
    }
}

/// Frame protocol settings
///
/// `frames_in_flight` trades latency for throughput headroom: a larger ring lets
/// the CPU record further ahead of the GPU before the fence wait blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Frame slot ring size
    pub frames_in_flight: usize,
    /// Acquire semaphore ring size of windowed viewports
    pub acquire_semaphore_count: usize,
    /// Swapchain images requested beyond the surface minimum
    pub extra_swapchain_images: u32,
    /// Frame fence wait bound; unbounded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fence_timeout_ns: Option<u64>,
    /// Image acquire wait bound; unbounded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquire_timeout_ns: Option<u64>,
    /// Composite pass clear color [R, G, B, A]
    pub clear_color: [f32; 4],
    /// Per-slot descriptor pool capacity
    pub descriptor_pool: DescriptorPoolConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            acquire_semaphore_count: 10,
            extra_swapchain_images: 2,
            fence_timeout_ns: None,
            acquire_timeout_ns: None,
            clear_color: [0.2, 0.0, 0.0, 1.0],
            descriptor_pool: DescriptorPoolConfig::default(),
        }
    }
}

impl RendererConfig {
    /// Set the frame slot ring size
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Set the composite pass clear color
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Bound the frame fence wait
    pub fn with_fence_timeout_ns(mut self, timeout: u64) -> Self {
        self.fence_timeout_ns = Some(timeout);
        self
    }

    /// Bound the swapchain image acquire wait
    pub fn with_acquire_timeout_ns(mut self, timeout: u64) -> Self {
        self.acquire_timeout_ns = Some(timeout);
        self
    }

    /// Set the per-slot descriptor pool capacity
    pub fn with_descriptor_pool(mut self, pool: DescriptorPoolConfig) -> Self {
        self.descriptor_pool = pool;
        self
    }

    /// Fence wait timeout in nanoseconds
    pub fn fence_timeout(&self) -> u64 {
        self.fence_timeout_ns.unwrap_or(u64::MAX)
    }

    /// Acquire wait timeout in nanoseconds
    pub fn acquire_timeout(&self) -> u64 {
        self.acquire_timeout_ns.unwrap_or(u64::MAX)
    }

    /// Check ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(ConfigError::Invalid(format!(
                "frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frames_in_flight
            )));
        }
        if self.acquire_semaphore_count == 0 {
            return Err(ConfigError::Invalid("acquire_semaphore_count must be at least 1".to_string()));
        }
        if self.descriptor_pool.max_sets == 0 {
            return Err(ConfigError::Invalid("descriptor_pool.max_sets must be at least 1".to_string()));
        }
        if self.descriptor_pool.dynamic_uniform_buffers == 0 {
            return Err(ConfigError::Invalid(
                "descriptor_pool.dynamic_uniform_buffers must cover the viewport descriptor".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_frame_protocol() {
        let config = RendererConfig::default();
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.acquire_semaphore_count, 10);
        assert_eq!(config.fence_timeout(), u64::MAX);
        assert_eq!(config.clear_color, [0.2, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_frames_in_flight_range() {
        assert!(RendererConfig::default().with_frames_in_flight(0).validate().is_err());
        assert!(RendererConfig::default().with_frames_in_flight(9).validate().is_err());
        assert!(RendererConfig::default().with_frames_in_flight(8).validate().is_ok());
    }

    #[test]
    fn test_empty_pool_rejected() {
        let config = RendererConfig::default().with_descriptor_pool(DescriptorPoolConfig {
            max_sets: 0,
            ..DescriptorPoolConfig::default()
        });
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
