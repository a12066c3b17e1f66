//! Backend device seam
//!
//! Everything the frame core asks of the GPU goes through [`GpuDevice`]. The
//! production implementation is [`super::VulkanDevice`] over `ash`; tests drive
//! the same code paths against a recording mock.
//!
//! Handles are plain `ash::vk` handles. Ownership of each created object lies
//! with the RAII wrapper that asked for it, never with the device.

use std::sync::Arc;

use ash::vk;

use super::VulkanResult;
use crate::render::gpu::GraphicsState;

/// Shared device handle held by every RAII wrapper
pub type SharedDevice = Arc<dyn GpuDevice>;

/// Physical device limits the core cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Required alignment of dynamic uniform buffer offsets
    pub min_uniform_buffer_offset_alignment: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_uniform_buffer_offset_alignment: 256,
        }
    }
}

/// Formats and layouts of the shared composite pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositePassDesc {
    /// Color attachment format (swapchain format)
    pub color_format: vk::Format,
    /// Layout the color attachment ends in (e.g. `PRESENT_SRC_KHR`)
    pub final_layout: vk::ImageLayout,
    /// Depth attachment format, if the display wants depth
    pub depth_format: Option<vk::Format>,
}

/// One binding of a descriptor set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    /// Binding index
    pub binding: u32,
    /// Descriptor type
    pub descriptor_type: vk::DescriptorType,
    /// Shader stages the binding is visible to
    pub stages: vk::ShaderStageFlags,
    /// Immutable sampler baked into the layout
    pub immutable_sampler: Option<vk::Sampler>,
}

/// Shader stage attached to a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderStage {
    /// Stage flag (vertex, fragment, ...)
    pub stage: vk::ShaderStageFlags,
    /// Compiled module, entry point `main`
    pub module: vk::ShaderModule,
}

/// Everything needed to compile one graphics pipeline
#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    /// Pipeline layout
    pub layout: vk::PipelineLayout,
    /// Render pass the pipeline is compatible with
    pub render_pass: vk::RenderPass,
    /// Subpass index
    pub subpass: u32,
    /// Shader stages
    pub stages: &'a [ShaderStage],
    /// Vertex buffer bindings
    pub vertex_bindings: &'a [vk::VertexInputBindingDescription],
    /// Vertex attributes
    pub vertex_attributes: &'a [vk::VertexInputAttributeDescription],
    /// Variable fixed-function state
    pub state: &'a GraphicsState,
}

/// Arguments to begin a render pass instance
#[derive(Clone, Copy)]
pub struct RenderPassBegin<'a> {
    /// Render pass
    pub render_pass: vk::RenderPass,
    /// Target framebuffer
    pub framebuffer: vk::Framebuffer,
    /// Render area, from the origin
    pub extent: vk::Extent2D,
    /// One clear value per attachment
    pub clear_values: &'a [vk::ClearValue],
}

/// One queue submission carrying a frame's command buffer
#[derive(Debug, Clone, Copy)]
pub struct FrameSubmission<'a> {
    /// Recorded command buffer
    pub command_buffer: vk::CommandBuffer,
    /// Semaphores to wait on before color output
    pub wait_semaphores: &'a [vk::Semaphore],
    /// Stage at which the waits apply
    pub wait_stage: vk::PipelineStageFlags,
    /// Semaphore signaled on completion, if anyone needs it
    pub signal_semaphore: Option<vk::Semaphore>,
    /// Fence signaled on completion
    pub fence: vk::Fence,
}

/// Host-visible buffer and its backing memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuBuffer {
    /// Buffer handle
    pub buffer: vk::Buffer,
    /// Backing allocation
    pub memory: vk::DeviceMemory,
    /// Size in bytes
    pub size: u64,
}

/// Device-local image with a default view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuImage {
    /// Image handle
    pub image: vk::Image,
    /// Backing allocation
    pub memory: vk::DeviceMemory,
    /// View covering the whole image
    pub view: vk::ImageView,
    /// Format
    pub format: vk::Format,
}

/// Swapchain creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    /// Target surface
    pub surface: vk::SurfaceKHR,
    /// Number of images to request
    pub min_image_count: u32,
    /// Image format
    pub format: vk::Format,
    /// Color space
    pub color_space: vk::ColorSpaceKHR,
    /// Image extent
    pub extent: vk::Extent2D,
    /// Surface transform
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    /// Presentation mode
    pub present_mode: vk::PresentModeKHR,
}

/// GPU operations used by the frame core
///
/// Implementations must be callable from the render thread only; `Send + Sync`
/// lets wrappers share the device behind an `Arc`.
pub trait GpuDevice: Send + Sync {
    /// Device limits
    fn limits(&self) -> DeviceLimits;

    /// Create the composite render pass
    fn create_render_pass(&self, desc: &CompositePassDesc) -> VulkanResult<vk::RenderPass>;
    /// Destroy a render pass
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    /// Create a descriptor set layout
    fn create_descriptor_set_layout(&self, bindings: &[LayoutBinding]) -> VulkanResult<vk::DescriptorSetLayout>;
    /// Destroy a descriptor set layout
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    /// Create a descriptor pool
    fn create_descriptor_pool(&self, max_sets: u32, sizes: &[vk::DescriptorPoolSize]) -> VulkanResult<vk::DescriptorPool>;
    /// Free every set allocated from `pool`
    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VulkanResult<()>;
    /// Destroy a descriptor pool
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    /// Allocate one set
    fn allocate_descriptor_set(&self, pool: vk::DescriptorPool, layout: vk::DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet>;
    /// Point a buffer binding at `buffer[offset..offset + range]`
    fn write_buffer_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    );
    /// Point a combined image sampler binding at `view`
    fn write_image_descriptor(&self, set: vk::DescriptorSet, binding: u32, view: vk::ImageView, layout: vk::ImageLayout);

    /// Create a shader module from SPIR-V words
    fn create_shader_module(&self, code: &[u32]) -> VulkanResult<vk::ShaderModule>;
    /// Destroy a shader module
    fn destroy_shader_module(&self, module: vk::ShaderModule);

    /// Create a pipeline layout
    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> VulkanResult<vk::PipelineLayout>;
    /// Destroy a pipeline layout
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    /// Compile a graphics pipeline
    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> VulkanResult<vk::Pipeline>;
    /// Destroy a pipeline
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    /// Create a binary semaphore
    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore>;
    /// Destroy a semaphore
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    /// Create a fence, optionally already signaled
    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence>;
    /// Wait for a fence; `Ok(false)` means the timeout expired
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VulkanResult<bool>;
    /// Return a fence to the unsignaled state
    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()>;
    /// Destroy a fence
    fn destroy_fence(&self, fence: vk::Fence);

    /// Allocate a primary command buffer from the device's graphics pool
    fn allocate_command_buffer(&self) -> VulkanResult<vk::CommandBuffer>;
    /// Return a command buffer to the pool
    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer);
    /// Begin one-time-submit recording
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;
    /// Finish recording
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Record a render pass begin with inline contents
    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, begin: &RenderPassBegin<'_>);
    /// Record a render pass end
    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);
    /// Record a full-extent viewport and scissor
    fn cmd_set_viewport_and_scissor(&self, command_buffer: vk::CommandBuffer, extent: vk::Extent2D);
    /// Record a graphics pipeline bind
    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline);
    /// Record a descriptor set bind
    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    );
    /// Record a vertex buffer bind at binding 0
    fn cmd_bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer, offset: u64);
    /// Record an index buffer bind
    fn cmd_bind_index_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer, offset: u64, index_type: vk::IndexType);
    /// Record an indexed draw
    fn cmd_draw_indexed(&self, command_buffer: vk::CommandBuffer, index_count: u32, first_index: u32, vertex_offset: i32);

    /// Submit to the graphics queue
    fn queue_submit(&self, submission: &FrameSubmission<'_>) -> VulkanResult<()>;
    /// Block until the device is idle
    fn wait_idle(&self) -> VulkanResult<()>;

    /// Create a host-visible, host-coherent buffer
    fn create_buffer(&self, size: u64, usage: vk::BufferUsageFlags) -> VulkanResult<GpuBuffer>;
    /// Copy `data` into a buffer at `offset`
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> VulkanResult<()>;
    /// Destroy a buffer and free its memory
    fn destroy_buffer(&self, buffer: &GpuBuffer);

    /// Create a 2D view over `image`
    fn create_image_view(&self, image: vk::Image, format: vk::Format, aspect: vk::ImageAspectFlags) -> VulkanResult<vk::ImageView>;
    /// Destroy an image view
    fn destroy_image_view(&self, view: vk::ImageView);
    /// Create a device-local depth image with its view
    fn create_depth_image(&self, format: vk::Format, extent: vk::Extent2D) -> VulkanResult<GpuImage>;
    /// Destroy an image created by [`GpuDevice::create_depth_image`]
    fn destroy_image(&self, image: &GpuImage);

    /// Create a framebuffer
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<vk::Framebuffer>;
    /// Destroy a framebuffer
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    /// Create a swapchain
    fn create_swapchain(&self, desc: &SwapchainDesc) -> VulkanResult<vk::SwapchainKHR>;
    /// Images owned by a swapchain
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VulkanResult<Vec<vk::Image>>;
    /// Acquire the next image, signaling `semaphore` when it is ready
    fn acquire_next_image(&self, swapchain: vk::SwapchainKHR, semaphore: vk::Semaphore, timeout_ns: u64) -> VulkanResult<u32>;
    /// Queue an image for presentation
    fn queue_present(&self, swapchain: vk::SwapchainKHR, image_index: u32, wait: Option<vk::Semaphore>) -> VulkanResult<()>;
    /// Destroy a swapchain
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
}
