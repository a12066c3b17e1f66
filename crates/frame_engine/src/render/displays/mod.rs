//! Display layer: viewports and the collaborator that owns them
//!
//! The renderer queries a [`Display`] for formats once at start-up and for the
//! active viewports every frame. Viewport order is draw order.

pub mod camera;
pub mod session_viewport;
pub mod viewport;
pub mod window_viewport;

use ash::vk;
use nalgebra::Matrix4;

use crate::render::backends::vulkan::VulkanResult;

pub use camera::{Fov, Pose};
pub use session_viewport::{SessionSwapchain, SessionViewport};
pub use viewport::{AcquiredImage, Viewport, ViewportImage, ViewportImages};
pub use window_viewport::{WindowTarget, WindowViewport};

/// Per-viewport camera block, std140 layout
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportUniform {
    /// World to view transform
    pub view: [[f32; 4]; 4],
    /// View to clip transform
    pub projection: [[f32; 4]; 4],
    /// Camera position in world space (w = 1)
    pub position: [f32; 4],
}

unsafe impl bytemuck::Pod for ViewportUniform {}
unsafe impl bytemuck::Zeroable for ViewportUniform {}

impl Default for ViewportUniform {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

impl ViewportUniform {
    /// Build from matrices, deriving the position from the view transform
    pub fn from_matrices(view: Matrix4<f32>, projection: Matrix4<f32>) -> Self {
        let position = view
            .try_inverse()
            .map(|inverse| inverse.column(3).into_owned())
            .map(|c| [c[0], c[1], c[2], 1.0])
            .unwrap_or([0.0, 0.0, 0.0, 1.0]);

        Self {
            view: view.into(),
            projection: projection.into(),
            position,
        }
    }
}

/// Display collaborator supplying viewports to the renderer
pub trait Display {
    /// Color format of every viewport
    fn swapchain_format(&self) -> vk::Format;

    /// Depth format, if viewports carry a depth attachment
    fn depth_format(&self) -> Option<vk::Format>;

    /// Layout color images end the composite pass in
    fn final_layout(&self) -> vk::ImageLayout;

    /// Build framebuffers of every viewport against the composite pass
    fn create_images(&mut self, composite_pass: vk::RenderPass) -> VulkanResult<()>;

    /// Viewports to draw this frame, in draw order
    fn acquire_viewports(&mut self) -> Vec<&mut dyn Viewport>;
}

/// Display owning a fixed list of always-active viewports
pub struct ViewportSet {
    swapchain_format: vk::Format,
    depth_format: Option<vk::Format>,
    final_layout: vk::ImageLayout,
    viewports: Vec<Box<dyn Viewport>>,
}

impl ViewportSet {
    /// Create an empty set for presentable images of `swapchain_format`
    pub fn new(swapchain_format: vk::Format, depth_format: Option<vk::Format>) -> Self {
        Self {
            swapchain_format,
            depth_format,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            viewports: Vec::new(),
        }
    }

    /// Override the final color layout (e.g. for session images)
    pub fn with_final_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.final_layout = layout;
        self
    }

    /// Append a viewport; it draws after those already present
    pub fn push(&mut self, viewport: Box<dyn Viewport>) {
        self.viewports.push(viewport);
    }

    /// Number of viewports
    pub fn len(&self) -> usize {
        self.viewports.len()
    }

    /// Whether the set has no viewports
    pub fn is_empty(&self) -> bool {
        self.viewports.is_empty()
    }

    /// Viewport by index
    pub fn get(&self, index: usize) -> Option<&dyn Viewport> {
        self.viewports.get(index).map(|viewport| &**viewport)
    }
}

impl Display for ViewportSet {
    fn swapchain_format(&self) -> vk::Format {
        self.swapchain_format
    }

    fn depth_format(&self) -> Option<vk::Format> {
        self.depth_format
    }

    fn final_layout(&self) -> vk::ImageLayout {
        self.final_layout
    }

    fn create_images(&mut self, composite_pass: vk::RenderPass) -> VulkanResult<()> {
        for viewport in &mut self.viewports {
            viewport.images_mut().create_images(composite_pass)?;
        }
        Ok(())
    }

    fn acquire_viewports(&mut self) -> Vec<&mut dyn Viewport> {
        self.viewports
            .iter_mut()
            .map(|viewport| &mut **viewport as &mut dyn Viewport)
            .collect()
    }
}
