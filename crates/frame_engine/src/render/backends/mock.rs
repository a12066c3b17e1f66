//! Recording mock of [`GpuDevice`] for unit tests
//!
//! Hands out unique handles, records every command and queue operation, and
//! simulates fences. With the GPU stalled, submissions leave their fence
//! unsignaled until [`MockDevice::signal_all_fences`] is called.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use ash::vk::{self, Handle};

use super::vulkan::device::{
    CompositePassDesc, DeviceLimits, FrameSubmission, GpuBuffer, GpuDevice, GpuImage, GraphicsPipelineDesc,
    LayoutBinding, RenderPassBegin, SwapchainDesc,
};
use super::vulkan::{SharedDevice, VulkanError, VulkanResult};
use crate::render::gpu::PipelineKey;

/// Recorded device operation
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ResetDescriptorPool(vk::DescriptorPool),
    AllocateDescriptorSet(vk::DescriptorSet),
    WriteBufferDescriptor { set: vk::DescriptorSet, binding: u32, buffer: vk::Buffer, range: u64 },
    WriteImageDescriptor { set: vk::DescriptorSet, binding: u32, view: vk::ImageView, layout: vk::ImageLayout },
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    BeginRenderPass { framebuffer: vk::Framebuffer, clear_color: [f32; 4] },
    EndRenderPass,
    SetViewport(vk::Extent2D),
    BindPipeline(vk::Pipeline),
    BindDescriptorSet { set_index: u32, set: vk::DescriptorSet, dynamic_offsets: Vec<u32> },
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer),
    DrawIndexed { index_count: u32 },
    WaitFence(vk::Fence),
    ResetFence(vk::Fence),
    Submit {
        command_buffer: vk::CommandBuffer,
        wait_semaphores: Vec<vk::Semaphore>,
        signal_semaphore: Option<vk::Semaphore>,
        fence: vk::Fence,
    },
    WriteBuffer { buffer: vk::Buffer, offset: u64, len: usize },
    Acquire { swapchain: vk::SwapchainKHR, index: u32, semaphore: vk::Semaphore },
    Present { swapchain: vk::SwapchainKHR, index: u32, wait: Option<vk::Semaphore> },
    WaitIdle,
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    live: HashSet<u64>,
    fences: HashMap<u64, bool>,
    stalled: bool,
    blocked_waits: usize,
    fail_pipeline_creation: bool,
    stall_acquire: bool,
    image_views_before_failure: Option<usize>,
    pipelines_built: usize,
    pipeline_states: HashMap<u64, PipelineKey>,
    pools: HashMap<u64, (u32, u32)>,
    swapchains: HashMap<u64, (Vec<vk::Image>, u32)>,
    swapchain_image_count: u32,
    buffers: HashMap<u64, Vec<u8>>,
}

/// Mock GPU device
pub struct MockDevice {
    next_handle: AtomicU64,
    limits: DeviceLimits,
    state: Mutex<MockState>,
    fence_signaled: Condvar,
}

impl MockDevice {
    /// Create a mock with 256-byte uniform alignment and 3-image swapchains
    pub fn new() -> Arc<Self> {
        Self::with_alignment(256)
    }

    /// Create a mock with a specific uniform offset alignment
    pub fn with_alignment(alignment: u64) -> Arc<Self> {
        Arc::new(Self {
            next_handle: AtomicU64::new(0x1000),
            limits: DeviceLimits {
                min_uniform_buffer_offset_alignment: alignment,
            },
            state: Mutex::new(MockState {
                swapchain_image_count: 3,
                ..MockState::default()
            }),
            fence_signaled: Condvar::new(),
        })
    }

    /// Shared trait-object handle
    pub fn shared(self: &Arc<Self>) -> SharedDevice {
        self.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn next<H: Handle>(&self) -> H {
        H::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn create<H: Handle + Copy>(&self) -> H {
        let handle: H = self.next();
        self.lock().live.insert(handle.as_raw());
        handle
    }

    fn destroy<H: Handle>(&self, handle: H) {
        let raw = handle.as_raw();
        assert!(self.lock().live.remove(&raw), "double destroy of 0x{:x}", raw);
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }

    /// Snapshot of recorded calls
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Drop recorded calls
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Number of objects created and not yet destroyed
    pub fn live_objects(&self) -> usize {
        self.lock().live.len()
    }

    /// Stop (or resume) completing submitted work
    pub fn stall_gpu(&self, stalled: bool) {
        self.lock().stalled = stalled;
    }

    /// Complete all outstanding work
    pub fn signal_all_fences(&self) {
        let mut state = self.lock();
        state.fences.values_mut().for_each(|signaled| *signaled = true);
        self.fence_signaled.notify_all();
    }

    /// Number of fence waits that had to block
    pub fn blocked_waits(&self) -> usize {
        self.lock().blocked_waits
    }

    /// Make every following pipeline creation fail
    pub fn fail_pipeline_creation(&self, fail: bool) {
        self.lock().fail_pipeline_creation = fail;
    }

    /// Make swapchain acquisition with a bounded timeout time out
    pub fn stall_acquire(&self, stalled: bool) {
        self.lock().stall_acquire = stalled;
    }

    /// Let `count` more image views succeed, then fail every creation
    pub fn fail_image_views_after(&self, count: Option<usize>) {
        self.lock().image_views_before_failure = count;
    }

    /// Number of pipelines compiled so far
    pub fn pipelines_built(&self) -> usize {
        self.lock().pipelines_built
    }

    /// Graphics state a pipeline was compiled with
    pub fn pipeline_state(&self, pipeline: vk::Pipeline) -> Option<PipelineKey> {
        self.lock().pipeline_states.get(&pipeline.as_raw()).copied()
    }

    /// Image count for swapchains created from now on
    pub fn set_swapchain_image_count(&self, count: u32) {
        self.lock().swapchain_image_count = count;
    }

    /// Current contents of a buffer
    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Vec<u8> {
        self.lock().buffers.get(&buffer.as_raw()).cloned().unwrap_or_default()
    }
}

impl GpuDevice for MockDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_render_pass(&self, _desc: &CompositePassDesc) -> VulkanResult<vk::RenderPass> {
        Ok(self.create())
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.destroy(render_pass)
    }

    fn create_descriptor_set_layout(&self, _bindings: &[LayoutBinding]) -> VulkanResult<vk::DescriptorSetLayout> {
        Ok(self.create())
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.destroy(layout)
    }

    fn create_descriptor_pool(&self, max_sets: u32, _sizes: &[vk::DescriptorPoolSize]) -> VulkanResult<vk::DescriptorPool> {
        let pool: vk::DescriptorPool = self.create();
        self.lock().pools.insert(pool.as_raw(), (max_sets, 0));
        Ok(pool)
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VulkanResult<()> {
        let mut state = self.lock();
        if let Some((_, allocated)) = state.pools.get_mut(&pool.as_raw()) {
            *allocated = 0;
        }
        state.calls.push(Call::ResetDescriptorPool(pool));
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.lock().pools.remove(&pool.as_raw());
        self.destroy(pool)
    }

    fn allocate_descriptor_set(&self, pool: vk::DescriptorPool, _layout: vk::DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        let set: vk::DescriptorSet = self.next();
        let mut state = self.lock();
        let (max_sets, allocated) = state
            .pools
            .get_mut(&pool.as_raw())
            .ok_or(VulkanError::Api(vk::Result::ERROR_UNKNOWN))?;
        if *allocated >= *max_sets {
            return Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_POOL_MEMORY));
        }
        *allocated += 1;
        state.calls.push(Call::AllocateDescriptorSet(set));
        Ok(set)
    }

    fn write_buffer_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        _descriptor_type: vk::DescriptorType,
        buffer: vk::Buffer,
        _offset: u64,
        range: u64,
    ) {
        self.record(Call::WriteBufferDescriptor {
            set,
            binding,
            buffer,
            range,
        });
    }

    fn write_image_descriptor(&self, set: vk::DescriptorSet, binding: u32, view: vk::ImageView, layout: vk::ImageLayout) {
        self.record(Call::WriteImageDescriptor {
            set,
            binding,
            view,
            layout,
        });
    }

    fn create_shader_module(&self, _code: &[u32]) -> VulkanResult<vk::ShaderModule> {
        Ok(self.create())
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.destroy(module)
    }

    fn create_pipeline_layout(
        &self,
        _set_layouts: &[vk::DescriptorSetLayout],
        _push_constants: &[vk::PushConstantRange],
    ) -> VulkanResult<vk::PipelineLayout> {
        Ok(self.create())
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.destroy(layout)
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> VulkanResult<vk::Pipeline> {
        if self.lock().fail_pipeline_creation {
            return Err(VulkanError::CreationFailed {
                object: "graphics pipeline",
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            });
        }
        let pipeline: vk::Pipeline = self.create();
        let mut state = self.lock();
        state.pipelines_built += 1;
        state.pipeline_states.insert(pipeline.as_raw(), desc.state.key());
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.destroy(pipeline)
    }

    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore> {
        Ok(self.create())
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.destroy(semaphore)
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let fence: vk::Fence = self.create();
        self.lock().fences.insert(fence.as_raw(), signaled);
        Ok(fence)
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VulkanResult<bool> {
        let deadline = Instant::now().checked_add(Duration::from_nanos(timeout_ns));
        let mut state = self.lock();
        state.calls.push(Call::WaitFence(fence));

        let mut counted = false;
        loop {
            if state.fences.get(&fence.as_raw()).copied().unwrap_or(false) {
                return Ok(true);
            }
            if !counted {
                state.blocked_waits += 1;
                counted = true;
            }
            state = match deadline {
                None => self.fence_signaled.wait(state).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    self.fence_signaled.wait_timeout(state, deadline - now).unwrap().0
                }
            };
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        let mut state = self.lock();
        state.fences.insert(fence.as_raw(), false);
        state.calls.push(Call::ResetFence(fence));
        Ok(())
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.lock().fences.remove(&fence.as_raw());
        self.destroy(fence)
    }

    fn allocate_command_buffer(&self) -> VulkanResult<vk::CommandBuffer> {
        Ok(self.create())
    }

    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        self.destroy(command_buffer)
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        self.record(Call::BeginCommandBuffer(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        self.record(Call::EndCommandBuffer(command_buffer));
        Ok(())
    }

    fn cmd_begin_render_pass(&self, _command_buffer: vk::CommandBuffer, begin: &RenderPassBegin<'_>) {
        let clear_color = begin
            .clear_values
            .first()
            .map(|value| unsafe { value.color.float32 })
            .unwrap_or_default();
        self.record(Call::BeginRenderPass {
            framebuffer: begin.framebuffer,
            clear_color,
        });
    }

    fn cmd_end_render_pass(&self, _command_buffer: vk::CommandBuffer) {
        self.record(Call::EndRenderPass);
    }

    fn cmd_set_viewport_and_scissor(&self, _command_buffer: vk::CommandBuffer, extent: vk::Extent2D) {
        self.record(Call::SetViewport(extent));
    }

    fn cmd_bind_pipeline(&self, _command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.record(Call::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_set(
        &self,
        _command_buffer: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    ) {
        self.record(Call::BindDescriptorSet {
            set_index,
            set,
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
    }

    fn cmd_bind_vertex_buffer(&self, _command_buffer: vk::CommandBuffer, buffer: vk::Buffer, _offset: u64) {
        self.record(Call::BindVertexBuffer(buffer));
    }

    fn cmd_bind_index_buffer(&self, _command_buffer: vk::CommandBuffer, buffer: vk::Buffer, _offset: u64, _index_type: vk::IndexType) {
        self.record(Call::BindIndexBuffer(buffer));
    }

    fn cmd_draw_indexed(&self, _command_buffer: vk::CommandBuffer, index_count: u32, _first_index: u32, _vertex_offset: i32) {
        self.record(Call::DrawIndexed { index_count });
    }

    fn queue_submit(&self, submission: &FrameSubmission<'_>) -> VulkanResult<()> {
        let mut state = self.lock();
        if !state.stalled {
            state.fences.insert(submission.fence.as_raw(), true);
            self.fence_signaled.notify_all();
        }
        state.calls.push(Call::Submit {
            command_buffer: submission.command_buffer,
            wait_semaphores: submission.wait_semaphores.to_vec(),
            signal_semaphore: submission.signal_semaphore,
            fence: submission.fence,
        });
        Ok(())
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        self.record(Call::WaitIdle);
        Ok(())
    }

    fn create_buffer(&self, size: u64, _usage: vk::BufferUsageFlags) -> VulkanResult<GpuBuffer> {
        let buffer: vk::Buffer = self.create();
        self.lock().buffers.insert(buffer.as_raw(), vec![0; size as usize]);
        Ok(GpuBuffer {
            buffer,
            memory: self.next(),
            size,
        })
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> VulkanResult<()> {
        let mut state = self.lock();
        let contents = state
            .buffers
            .get_mut(&buffer.buffer.as_raw())
            .ok_or(VulkanError::InvalidOperation {
                reason: "write to destroyed buffer".to_string(),
            })?;
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("write of {} bytes at {} overflows buffer", data.len(), offset),
            });
        }
        contents[start..end].copy_from_slice(data);
        state.calls.push(Call::WriteBuffer {
            buffer: buffer.buffer,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn destroy_buffer(&self, buffer: &GpuBuffer) {
        self.lock().buffers.remove(&buffer.buffer.as_raw());
        self.destroy(buffer.buffer)
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format, _aspect: vk::ImageAspectFlags) -> VulkanResult<vk::ImageView> {
        if let Some(remaining) = self.lock().image_views_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(VulkanError::CreationFailed {
                    object: "image view",
                    result: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
                });
            }
            *remaining -= 1;
        }
        Ok(self.create())
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.destroy(view)
    }

    fn create_depth_image(&self, format: vk::Format, _extent: vk::Extent2D) -> VulkanResult<GpuImage> {
        Ok(GpuImage {
            image: self.create(),
            memory: self.next(),
            view: self.next(),
            format,
        })
    }

    fn destroy_image(&self, image: &GpuImage) {
        self.destroy(image.image)
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        _attachments: &[vk::ImageView],
        _extent: vk::Extent2D,
    ) -> VulkanResult<vk::Framebuffer> {
        Ok(self.create())
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.destroy(framebuffer)
    }

    fn create_swapchain(&self, _desc: &SwapchainDesc) -> VulkanResult<vk::SwapchainKHR> {
        let swapchain: vk::SwapchainKHR = self.create();
        let count = self.lock().swapchain_image_count;
        let images = (0..count).map(|_| self.next()).collect();
        self.lock().swapchains.insert(swapchain.as_raw(), (images, 0));
        Ok(swapchain)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VulkanResult<Vec<vk::Image>> {
        self.lock()
            .swapchains
            .get(&swapchain.as_raw())
            .map(|(images, _)| images.clone())
            .ok_or(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))
    }

    fn acquire_next_image(&self, swapchain: vk::SwapchainKHR, semaphore: vk::Semaphore, timeout_ns: u64) -> VulkanResult<u32> {
        let mut state = self.lock();
        if state.stall_acquire && timeout_ns != u64::MAX {
            return Err(VulkanError::Timeout { what: "swapchain image" });
        }
        let (images, next) = state
            .swapchains
            .get_mut(&swapchain.as_raw())
            .ok_or(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))?;
        let index = *next;
        *next = (*next + 1) % images.len() as u32;
        state.calls.push(Call::Acquire {
            swapchain,
            index,
            semaphore,
        });
        Ok(index)
    }

    fn queue_present(&self, swapchain: vk::SwapchainKHR, image_index: u32, wait: Option<vk::Semaphore>) -> VulkanResult<()> {
        self.record(Call::Present {
            swapchain,
            index: image_index,
            wait,
        });
        Ok(())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.lock().swapchains.remove(&swapchain.as_raw());
        self.destroy(swapchain)
    }
}
