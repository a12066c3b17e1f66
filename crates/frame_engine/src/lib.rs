//! # Frame Engine
//!
//! Per-frame command submission and render-pass orchestration over Vulkan.
//!
//! ## Features
//!
//! - **Frame ring**: fence-gated frame slots bound how far the CPU runs ahead
//! - **Viewports**: windowed swapchains and headset session eyes behind one trait
//! - **Pipeline cache**: one compiled pipeline per distinct graphics state
//! - **Per-frame descriptors**: one pool per slot, reset every frame
//! - **Render pass plugins**: attach passes, they are called in attachment order
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use frame_engine::prelude::*;
//!
//! fn run(device: SharedDevice, target: &WindowTarget) -> VulkanResult<()> {
//!     let config = EngineConfig::default();
//!     let depth = Some(ash::vk::Format::D32_SFLOAT);
//!
//!     let window = WindowViewport::new(device.clone(), target, depth, &config.renderer, config.camera.clone())?;
//!     let mut display = ViewportSet::new(target.format, depth);
//!     display.push(Box::new(window));
//!
//!     let mut renderer = Renderer::new(device, display, config.renderer)?;
//!     loop {
//!         renderer.render_frame()?;
//!     }
//! }
//! # fn main() {}
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod render;

/// Common imports for applications driving the renderer
pub mod prelude {
    pub use crate::config::{
        init_logging, CameraConfig, Config, ConfigError, DescriptorPoolConfig, EngineConfig, LoggingConfig,
        RendererConfig,
    };
    pub use crate::render::backends::vulkan::{GpuDevice, SharedDevice, VulkanDevice, VulkanError, VulkanResult};
    pub use crate::render::displays::{
        Display, Fov, Pose, SessionSwapchain, SessionViewport, Viewport, ViewportSet, ViewportUniform, WindowTarget,
        WindowViewport,
    };
    pub use crate::render::gpu::{
        CompareOp, CullMode, DescriptorPool, DescriptorSet, DescriptorSetLayout, GpuPipeline, GpuVector, GraphicsState,
        PipelineKey, PipelineProgram, PolygonMode, PrimitiveTopology,
    };
    pub use crate::render::renderer::{LineVertex, OverlayPass, RenderPass, RenderPassContext, Renderer};
}
