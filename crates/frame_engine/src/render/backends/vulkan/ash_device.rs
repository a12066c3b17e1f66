//! `ash` implementation of [`GpuDevice`]
//!
//! Wraps a logical device created by the display collaborator. The device
//! owns the graphics command pool and the swapchain loader; the `ash::Device`
//! itself stays owned by the caller and must outlive this wrapper.

use std::ffi::CStr;

use ash::extensions::khr;
use ash::vk;

use super::device::{
    CompositePassDesc, DeviceLimits, FrameSubmission, GpuBuffer, GpuDevice, GpuImage, GraphicsPipelineDesc,
    LayoutBinding, RenderPassBegin, SwapchainDesc,
};
use super::{VulkanError, VulkanResult};

const SHADER_ENTRY_POINT: &[u8] = b"main\0";

/// Production device over `ash` 0.37
pub struct VulkanDevice {
    device: ash::Device,
    swapchain_loader: khr::Swapchain,
    graphics_queue: vk::Queue,
    command_pool: vk::CommandPool,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    limits: DeviceLimits,
}

impl VulkanDevice {
    /// Wrap an existing logical device
    ///
    /// `queue_family` must support graphics and presentation; queue 0 of that
    /// family is used for both.
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue_family: u32,
    ) -> VulkanResult<Self> {
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let limits = DeviceLimits {
            min_uniform_buffer_offset_alignment: properties.limits.min_uniform_buffer_offset_alignment.max(1),
        };

        let graphics_queue = unsafe { device.get_device_queue(queue_family, 0) };

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);
        let command_pool = unsafe {
            device
                .create_command_pool(&pool_info, None)
                .map_err(VulkanError::creation("command pool"))?
        };

        let swapchain_loader = khr::Swapchain::new(instance, &device);

        log::debug!(
            "Vulkan device ready (queue family {}, uniform offset alignment {})",
            queue_family,
            limits.min_uniform_buffer_offset_alignment
        );

        Ok(Self {
            device,
            swapchain_loader,
            graphics_queue,
            command_pool,
            memory_properties,
            limits,
        })
    }

    /// Underlying `ash` device
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        (0..self.memory_properties.memory_type_count)
            .find(|&i| {
                (type_filter & (1 << i)) != 0
                    && self.memory_properties.memory_types[i as usize]
                        .property_flags
                        .contains(properties)
            })
            .ok_or(VulkanError::NoSuitableMemoryType)
    }

    fn allocate(&self, requirements: vk::MemoryRequirements, properties: vk::MemoryPropertyFlags) -> VulkanResult<vk::DeviceMemory> {
        let memory_type_index = self.find_memory_type(requirements.memory_type_bits, properties)?;
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        unsafe {
            self.device
                .allocate_memory(&alloc_info, None)
                .map_err(VulkanError::creation("device memory"))
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

impl GpuDevice for VulkanDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_render_pass(&self, desc: &CompositePassDesc) -> VulkanResult<vk::RenderPass> {
        let mut attachments = vec![vk::AttachmentDescription::builder()
            .format(desc.color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(desc.final_layout)
            .build()];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);

        if let Some(depth_format) = desc.depth_format {
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(depth_format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .build(),
            );
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }

        let subpasses = [subpass.build()];
        let dependencies = [vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .build()];

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        unsafe {
            self.device
                .create_render_pass(&create_info, None)
                .map_err(VulkanError::creation("render pass"))
        }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_descriptor_set_layout(&self, bindings: &[LayoutBinding]) -> VulkanResult<vk::DescriptorSetLayout> {
        // Immutable sampler pointers must stay valid until the create call
        let samplers: Vec<[vk::Sampler; 1]> = bindings
            .iter()
            .map(|b| [b.immutable_sampler.unwrap_or_default()])
            .collect();

        let vk_bindings: Vec<_> = bindings
            .iter()
            .zip(&samplers)
            .map(|(binding, sampler)| {
                let mut builder = vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding.binding)
                    .descriptor_type(binding.descriptor_type)
                    .stage_flags(binding.stages);
                if binding.immutable_sampler.is_some() {
                    builder = builder.immutable_samplers(sampler);
                }
                builder.descriptor_count(1).build()
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&vk_bindings);

        unsafe {
            self.device
                .create_descriptor_set_layout(&create_info, None)
                .map_err(VulkanError::creation("descriptor set layout"))
        }
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_descriptor_pool(&self, max_sets: u32, sizes: &[vk::DescriptorPoolSize]) -> VulkanResult<vk::DescriptorPool> {
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(sizes);

        unsafe {
            self.device
                .create_descriptor_pool(&create_info, None)
                .map_err(VulkanError::creation("descriptor pool"))
        }
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
                .map_err(VulkanError::Api)
        }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_set(&self, pool: vk::DescriptorPool, layout: vk::DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info).map_err(VulkanError::Api)? };
        sets.into_iter().next().ok_or(VulkanError::Api(vk::Result::ERROR_OUT_OF_POOL_MEMORY))
    }

    fn write_buffer_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    ) {
        let buffer_info = [vk::DescriptorBufferInfo {
            buffer,
            offset,
            range,
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(descriptor_type)
            .buffer_info(&buffer_info)
            .build();

        unsafe { self.device.update_descriptor_sets(&[write], &[]) }
    }

    fn write_image_descriptor(&self, set: vk::DescriptorSet, binding: u32, view: vk::ImageView, layout: vk::ImageLayout) {
        let image_info = [vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: view,
            image_layout: layout,
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info)
            .build();

        unsafe { self.device.update_descriptor_sets(&[write], &[]) }
    }

    fn create_shader_module(&self, code: &[u32]) -> VulkanResult<vk::ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe {
            self.device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::creation("shader module"))
        }
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) }
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> VulkanResult<vk::PipelineLayout> {
        let create_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constants);

        unsafe {
            self.device
                .create_pipeline_layout(&create_info, None)
                .map_err(VulkanError::creation("pipeline layout"))
        }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> VulkanResult<vk::Pipeline> {
        let entry_point = CStr::from_bytes_with_nul(SHADER_ENTRY_POINT).map_err(|e| VulkanError::InvalidOperation {
            reason: format!("Bad shader entry point: {}", e),
        })?;

        let stages: Vec<_> = desc
            .stages
            .iter()
            .map(|stage| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage.stage)
                    .module(stage.module)
                    .name(entry_point)
                    .build()
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(desc.vertex_bindings)
            .vertex_attribute_descriptions(desc.vertex_attributes);

        let ia = &desc.state.input_assembly_state;
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(ia.primitive_topology.to_vk())
            .primitive_restart_enable(ia.primitive_restart_enable);

        // Viewport and scissor are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rs = &desc.state.rasterization_state;
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(rs.polygon_mode.to_vk())
            .line_width(1.0)
            .cull_mode(rs.cull_mode.to_vk())
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let ds = &desc.state.depth_state;
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(ds.test_enable)
            .depth_write_enable(ds.write_enable)
            .depth_compare_op(ds.compare_op.to_vk())
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(desc.subpass)
            .build();

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| VulkanError::CreationFailed {
                    object: "graphics pipeline",
                    result,
                })?
        };

        pipelines.into_iter().next().ok_or(VulkanError::CreationFailed {
            object: "graphics pipeline",
            result: vk::Result::ERROR_UNKNOWN,
        })
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        unsafe {
            self.device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::creation("semaphore"))
        }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        unsafe {
            self.device
                .create_fence(&create_info, None)
                .map_err(VulkanError::creation("fence"))
        }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VulkanResult<bool> {
        match unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[fence]).map_err(VulkanError::Api) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn allocate_command_buffer(&self) -> VulkanResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::creation("command buffer"))?
        };
        buffers.into_iter().next().ok_or(VulkanError::CreationFailed {
            object: "command buffer",
            result: vk::Result::ERROR_UNKNOWN,
        })
    }

    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.free_command_buffers(self.command_pool, &[command_buffer]) }
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)
        }
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer).map_err(VulkanError::Api) }
    }

    fn cmd_begin_render_pass(&self, command_buffer: vk::CommandBuffer, begin: &RenderPassBegin<'_>) {
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: begin.extent,
            })
            .clear_values(begin.clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(command_buffer, &begin_info, vk::SubpassContents::INLINE)
        }
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(command_buffer) }
    }

    fn cmd_set_viewport_and_scissor(&self, command_buffer: vk::CommandBuffer, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        unsafe {
            self.device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(command_buffer, 0, &[scissor]);
        }
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline)
        }
    }

    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                set_index,
                &[set],
                dynamic_offsets,
            )
        }
    }

    fn cmd_bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer, offset: u64) {
        unsafe { self.device.cmd_bind_vertex_buffers(command_buffer, 0, &[buffer], &[offset]) }
    }

    fn cmd_bind_index_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer, offset: u64, index_type: vk::IndexType) {
        unsafe { self.device.cmd_bind_index_buffer(command_buffer, buffer, offset, index_type) }
    }

    fn cmd_draw_indexed(&self, command_buffer: vk::CommandBuffer, index_count: u32, first_index: u32, vertex_offset: i32) {
        unsafe {
            self.device
                .cmd_draw_indexed(command_buffer, index_count, 1, first_index, vertex_offset, 0)
        }
    }

    fn queue_submit(&self, submission: &FrameSubmission<'_>) -> VulkanResult<()> {
        let wait_stages = vec![submission.wait_stage; submission.wait_semaphores.len()];
        let command_buffers = [submission.command_buffer];
        let signal_semaphores: Vec<_> = submission.signal_semaphore.into_iter().collect();

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(submission.wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], submission.fence)
                .map_err(VulkanError::Api)
        }
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }

    fn create_buffer(&self, size: u64, usage: vk::BufferUsageFlags) -> VulkanResult<GpuBuffer> {
        let create_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            self.device
                .create_buffer(&create_info, None)
                .map_err(VulkanError::creation("buffer"))?
        };

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let memory = match self.allocate(
            requirements,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let bound = unsafe { self.device.bind_buffer_memory(buffer, memory, 0) }.map_err(VulkanError::Api);
        release_on_error(bound, || unsafe {
            self.device.destroy_buffer(buffer, None);
            self.device.free_memory(memory, None);
        })?;

        Ok(GpuBuffer { buffer, memory, size })
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> VulkanResult<()> {
        if offset + data.len() as u64 > buffer.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Write of {} bytes at offset {} overflows buffer of {} bytes",
                    data.len(),
                    offset,
                    buffer.size
                ),
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(buffer.memory, offset, data.len() as u64, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
            self.device.unmap_memory(buffer.memory);
        }
        Ok(())
    }

    fn destroy_buffer(&self, buffer: &GpuBuffer) {
        unsafe {
            self.device.destroy_buffer(buffer.buffer, None);
            self.device.free_memory(buffer.memory, None);
        }
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format, aspect: vk::ImageAspectFlags) -> VulkanResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe {
            self.device
                .create_image_view(&create_info, None)
                .map_err(VulkanError::creation("image view"))
        }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_depth_image(&self, format: vk::Format, extent: vk::Extent2D) -> VulkanResult<GpuImage> {
        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            self.device
                .create_image(&create_info, None)
                .map_err(VulkanError::creation("depth image"))?
        };

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let memory = match self.allocate(requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let bound = unsafe { self.device.bind_image_memory(image, memory, 0) }.map_err(VulkanError::Api);
        let view = release_on_error(
            bound.and_then(|()| self.create_image_view(image, format, vk::ImageAspectFlags::DEPTH)),
            || unsafe {
                self.device.destroy_image(image, None);
                self.device.free_memory(memory, None);
            },
        )?;

        Ok(GpuImage {
            image,
            memory,
            view,
            format,
        })
    }

    fn destroy_image(&self, image: &GpuImage) {
        unsafe {
            self.device.destroy_image_view(image.view, None);
            self.device.destroy_image(image.image, None);
            self.device.free_memory(image.memory, None);
        }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<vk::Framebuffer> {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        unsafe {
            self.device
                .create_framebuffer(&create_info, None)
                .map_err(VulkanError::creation("framebuffer"))
        }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VulkanResult<vk::SwapchainKHR> {
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(desc.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.format)
            .image_color_space(desc.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true);

        unsafe {
            self.swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::creation("swapchain"))
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VulkanResult<Vec<vk::Image>> {
        unsafe {
            self.swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)
        }
    }

    fn acquire_next_image(&self, swapchain: vk::SwapchainKHR, semaphore: vk::Semaphore, timeout_ns: u64) -> VulkanResult<u32> {
        match unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, semaphore, vk::Fence::null())
        } {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::warn!("Swapchain suboptimal during acquire_next_image");
                }
                Ok(index)
            }
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Err(VulkanError::Timeout {
                what: "swapchain image",
            }),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    fn queue_present(&self, swapchain: vk::SwapchainKHR, image_index: u32, wait: Option<vk::Semaphore>) -> VulkanResult<()> {
        let wait_semaphores: Vec<_> = wait.into_iter().collect();
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(self.graphics_queue, &present_info) } {
            Ok(suboptimal) => {
                if suboptimal {
                    log::warn!("Swapchain suboptimal during queue_present");
                }
                Ok(())
            }
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }
}

/// Run `release` if `result` is an error
fn release_on_error<T>(result: VulkanResult<T>, release: impl FnOnce()) -> VulkanResult<T> {
    if result.is_err() {
        release();
    }
    result
}
