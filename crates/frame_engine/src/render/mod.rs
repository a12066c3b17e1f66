//! Rendering: backend seam, GPU resources, displays and the frame renderer

pub mod backends;
pub mod displays;
pub mod gpu;
pub mod renderer;

pub use backends::vulkan::{SharedDevice, VulkanDevice, VulkanError, VulkanResult};
pub use displays::{Display, Viewport, ViewportSet};
pub use renderer::{OverlayPass, RenderPass, RenderPassContext, Renderer};
