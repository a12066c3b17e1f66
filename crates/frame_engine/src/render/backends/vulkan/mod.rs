//! Vulkan backend
//!
//! The [`GpuDevice`] seam, its `ash` implementation, and the RAII wrappers
//! built on top of it.

pub mod ash_device;
pub mod device;
pub mod error;
pub mod shader;
pub mod sync;

pub use ash_device::VulkanDevice;
pub use device::{
    CompositePassDesc, DeviceLimits, FrameSubmission, GpuBuffer, GpuDevice, GpuImage, GraphicsPipelineDesc,
    LayoutBinding, RenderPassBegin, ShaderStage, SharedDevice, SwapchainDesc,
};
pub use error::{VulkanError, VulkanResult};
pub use shader::{PipelineLayout, ShaderModule};
pub use sync::{Fence, Semaphore};
