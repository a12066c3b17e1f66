//! Debug line overlay
//!
//! Queue world-space line segments with [`OverlayPass::add_line`]; the next
//! frame uploads them and draws them into every viewport with the viewport's
//! camera. The queue is drained each frame.

use ash::vk;

use super::render_pass::{RenderPass, RenderPassContext};
use crate::render::backends::vulkan::{PipelineLayout, ShaderModule, SharedDevice, VulkanError, VulkanResult};
use crate::render::gpu::{
    CompareOp, DescriptorPool, DescriptorSet, GpuPipeline, GpuVector, GraphicsState, PipelineProgram, PrimitiveTopology,
};

/// Highest line count one frame can index with 16-bit indices
pub const MAX_LINES: usize = (u16::MAX as usize + 1) / 2;

/// Overlay vertex: position and RGBA color
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineVertex {
    /// World-space position
    pub position: [f32; 3],
    /// Linear RGBA color
    pub color: [f32; 4],
}

unsafe impl bytemuck::Pod for LineVertex {}
unsafe impl bytemuck::Zeroable for LineVertex {}

impl LineVertex {
    fn bindings() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<LineVertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    fn attributes() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 12,
            },
        ]
    }
}

struct OverlayFrame {
    vertices: GpuVector,
    indices: GpuVector,
    index_count: u32,
}

/// Render pass drawing queued debug lines
pub struct OverlayPass {
    device: SharedDevice,
    vertex_code: Vec<u32>,
    fragment_code: Vec<u32>,
    state: GraphicsState,
    pipeline: Option<GpuPipeline>,
    frames: Vec<OverlayFrame>,
    pending: Vec<LineVertex>,
}

impl OverlayPass {
    /// Create the pass from SPIR-V words; the pipeline is built once attached
    ///
    /// The vertex shader reads the viewport camera block at set 0, binding 0.
    pub fn new(device: SharedDevice, vertex_code: Vec<u32>, fragment_code: Vec<u32>) -> Self {
        Self {
            device,
            vertex_code,
            fragment_code,
            state: GraphicsState::opaque()
                .with_topology(PrimitiveTopology::LineList)
                .with_depth(true, false, CompareOp::Less),
            pipeline: None,
            frames: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Create the pass from SPIR-V byte streams
    pub fn from_spirv_bytes(device: SharedDevice, vertex: &[u8], fragment: &[u8]) -> VulkanResult<Self> {
        let vertex_code = read_words(vertex)?;
        let fragment_code = read_words(fragment)?;
        Ok(Self::new(device, vertex_code, fragment_code))
    }

    /// Queue a line for the next frame
    pub fn add_line(&mut self, from: [f32; 3], to: [f32; 3], color: [f32; 4]) {
        self.pending.push(LineVertex { position: from, color });
        self.pending.push(LineVertex { position: to, color });
    }

    /// Lines queued for the next frame
    pub fn pending_lines(&self) -> usize {
        self.pending.len() / 2
    }

    /// Draw lines on top of geometry instead of depth testing them
    pub fn set_always_on_top(&mut self, on_top: bool) {
        self.state = if on_top {
            self.state.with_depth(false, false, CompareOp::Always)
        } else {
            self.state.with_depth(true, false, CompareOp::Less)
        };
    }

    /// Graphics state used for the next draw
    pub fn state(&self) -> &GraphicsState {
        &self.state
    }

    /// Pipelines compiled so far
    pub fn pipelines_built(&self) -> usize {
        self.pipeline.as_ref().map_or(0, GpuPipeline::len)
    }

    fn frame(&self, frame_index: usize) -> VulkanResult<&OverlayFrame> {
        self.frames.get(frame_index).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("overlay has no data for frame {}", frame_index),
        })
    }
}

fn read_words(bytes: &[u8]) -> VulkanResult<Vec<u32>> {
    ash::util::read_spv(&mut std::io::Cursor::new(bytes)).map_err(|e| VulkanError::InvalidOperation {
        reason: format!("invalid SPIR-V: {}", e),
    })
}

impl RenderPass for OverlayPass {
    fn create_frame_data(&mut self, context: &RenderPassContext) -> VulkanResult<()> {
        let program = PipelineProgram {
            shaders: vec![
                (
                    vk::ShaderStageFlags::VERTEX,
                    ShaderModule::from_words(self.device.clone(), &self.vertex_code)?,
                ),
                (
                    vk::ShaderStageFlags::FRAGMENT,
                    ShaderModule::from_words(self.device.clone(), &self.fragment_code)?,
                ),
            ],
            vertex_bindings: LineVertex::bindings(),
            vertex_attributes: LineVertex::attributes(),
        };
        let layout = PipelineLayout::new(self.device.clone(), &[context.viewport_layout], &[])?;
        self.pipeline = Some(GpuPipeline::new(
            self.device.clone(),
            layout,
            context.composite_pass,
            0,
            program,
        ));

        self.frames = (0..context.frames_in_flight)
            .map(|_| OverlayFrame {
                vertices: GpuVector::new(
                    self.device.clone(),
                    vk::BufferUsageFlags::VERTEX_BUFFER,
                    std::mem::size_of::<LineVertex>() as u64,
                ),
                indices: GpuVector::new(self.device.clone(), vk::BufferUsageFlags::INDEX_BUFFER, 2),
                index_count: 0,
            })
            .collect();
        Ok(())
    }

    fn destroy_frame_data(&mut self) {
        self.frames.clear();
        self.pipeline = None;
    }

    fn allocate_descriptors(&mut self, _frame_index: usize, _pool: &mut DescriptorPool) -> VulkanResult<()> {
        // Only the viewport descriptor is read
        Ok(())
    }

    fn pre_render(&mut self, frame_index: usize, _command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let mut vertices = std::mem::take(&mut self.pending);
        if vertices.len() > MAX_LINES * 2 {
            log::warn!(
                "Overlay dropped {} lines over the {} line limit",
                vertices.len() / 2 - MAX_LINES,
                MAX_LINES
            );
            vertices.truncate(MAX_LINES * 2);
        }

        let frame = self.frames.get_mut(frame_index).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("overlay has no data for frame {}", frame_index),
        })?;
        frame.index_count = 0;
        if vertices.is_empty() {
            return Ok(());
        }

        let indices: Vec<u16> = (0..vertices.len()).map(|index| index as u16).collect();
        frame.vertices.reserve(vertices.len())?;
        frame.indices.reserve(indices.len())?;
        frame.vertices.write_slice(&vertices)?;
        frame.indices.write_slice(&indices)?;
        frame.index_count = indices.len() as u32;
        Ok(())
    }

    fn render(
        &mut self,
        frame_index: usize,
        command_buffer: vk::CommandBuffer,
        viewport_descriptor: &DescriptorSet,
    ) -> VulkanResult<()> {
        let (vertex_buffer, index_buffer, index_count) = {
            let frame = self.frame(frame_index)?;
            (frame.vertices.buffer(), frame.indices.buffer(), frame.index_count)
        };
        if index_count == 0 {
            return Ok(());
        }

        let pipeline = self.pipeline.as_mut().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "overlay rendered before it was attached".to_string(),
        })?;
        let key = pipeline.resolve(&self.state)?;
        pipeline.cmd_bind(command_buffer, key)?;
        viewport_descriptor.cmd_bind(command_buffer, pipeline.layout(), 0)?;

        self.device.cmd_bind_vertex_buffer(command_buffer, vertex_buffer, 0);
        self.device
            .cmd_bind_index_buffer(command_buffer, index_buffer, 0, vk::IndexType::UINT16);
        self.device.cmd_draw_indexed(command_buffer, index_count, 0, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DescriptorPoolConfig;
    use crate::render::backends::mock::{Call, MockDevice};
    use crate::render::gpu::{DescriptorSetLayout, STATE_KEY_VERSION};
    use std::sync::Arc;

    fn attached(mock: &Arc<MockDevice>, layout: vk::DescriptorSetLayout) -> OverlayPass {
        let mut overlay = OverlayPass::new(mock.shared(), vec![0x0723_0203], vec![0x0723_0203]);
        overlay
            .create_frame_data(&RenderPassContext {
                composite_pass: vk::RenderPass::null(),
                viewport_layout: layout,
                frames_in_flight: 2,
            })
            .unwrap();
        overlay
    }

    #[test]
    fn test_lines_are_drained_into_the_frame() {
        let mock = MockDevice::new();
        let mut overlay = attached(&mock, vk::DescriptorSetLayout::null());
        overlay.add_line([0.0; 3], [1.0, 0.0, 0.0], [1.0, 0.0, 0.0, 1.0]);
        overlay.add_line([0.0; 3], [0.0, 1.0, 0.0], [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(overlay.pending_lines(), 2);

        overlay.pre_render(1, vk::CommandBuffer::null()).unwrap();
        assert_eq!(overlay.pending_lines(), 0);

        let frame = overlay.frame(1).unwrap();
        assert_eq!(frame.index_count, 4);
        let indices = mock.buffer_contents(frame.indices.buffer());
        assert_eq!(&indices[..8], bytemuck::cast_slice::<u16, u8>(&[0, 1, 2, 3]));
        let vertices = mock.buffer_contents(frame.vertices.buffer());
        assert_eq!(vertices.len(), 4 * std::mem::size_of::<LineVertex>());
    }

    #[test]
    fn test_empty_frame_draws_nothing() {
        let mock = MockDevice::new();
        let mut overlay = attached(&mock, vk::DescriptorSetLayout::null());
        let mut layout = DescriptorSetLayout::new(mock.shared());
        layout.add_dynamic_uniform_buffer(144).unwrap();
        let mut pool = DescriptorPool::new(mock.shared(), &DescriptorPoolConfig::default()).unwrap();
        let set = pool.allocate(&mut layout).unwrap();

        overlay.pre_render(0, vk::CommandBuffer::null()).unwrap();
        mock.clear_calls();
        overlay.render(0, vk::CommandBuffer::null(), &set).unwrap();

        assert!(mock.calls().is_empty());
        assert_eq!(overlay.pipelines_built(), 0);
    }

    #[test]
    fn test_render_binds_pipeline_camera_and_buffers() {
        let mock = MockDevice::new();
        let mut layout = DescriptorSetLayout::new(mock.shared());
        layout.add_dynamic_uniform_buffer(144).unwrap();
        let mut overlay = attached(&mock, layout.layout().unwrap());
        let mut pool = DescriptorPool::new(mock.shared(), &DescriptorPoolConfig::default()).unwrap();
        let mut set = pool.allocate(&mut layout).unwrap();
        set.set_dynamic_offset(0, 256).unwrap();

        overlay.add_line([0.0; 3], [1.0; 3], [1.0; 4]);
        overlay.pre_render(0, vk::CommandBuffer::null()).unwrap();
        mock.clear_calls();
        overlay.render(0, vk::CommandBuffer::null(), &set).unwrap();

        let calls = mock.calls();
        let Call::BindPipeline(pipeline) = calls[0] else {
            panic!("expected pipeline bind first, got {:?}", calls[0]);
        };
        let key = mock.pipeline_state(pipeline).unwrap();
        assert_eq!(key, overlay.state().key());
        assert_eq!((key.raw() >> 56) as u8, STATE_KEY_VERSION);
        assert_eq!(
            calls[1],
            Call::BindDescriptorSet {
                set_index: 0,
                set: set.handle(),
                dynamic_offsets: vec![256],
            }
        );
        assert!(matches!(calls[2], Call::BindVertexBuffer(_)));
        assert!(matches!(calls[3], Call::BindIndexBuffer(_)));
        assert_eq!(calls[4], Call::DrawIndexed { index_count: 2 });
    }

    #[test]
    fn test_state_toggle_builds_one_pipeline_per_state() {
        let mock = MockDevice::new();
        let mut layout = DescriptorSetLayout::new(mock.shared());
        layout.add_dynamic_uniform_buffer(144).unwrap();
        let mut overlay = attached(&mock, layout.layout().unwrap());
        let mut pool = DescriptorPool::new(mock.shared(), &DescriptorPoolConfig::default()).unwrap();

        for frame in 0..6 {
            pool.reset().unwrap();
            let set = pool.allocate(&mut layout).unwrap();
            overlay.set_always_on_top(frame % 2 == 1);
            overlay.add_line([0.0; 3], [1.0; 3], [1.0; 4]);
            overlay.pre_render(frame % 2, vk::CommandBuffer::null()).unwrap();
            overlay.render(frame % 2, vk::CommandBuffer::null(), &set).unwrap();
        }

        assert_eq!(overlay.pipelines_built(), 2);
        assert_eq!(mock.pipelines_built(), 2);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mock = MockDevice::new();
        let mut overlay = attached(&mock, vk::DescriptorSetLayout::null());
        overlay.add_line([0.0; 3], [1.0; 3], [1.0; 4]);
        overlay.pre_render(0, vk::CommandBuffer::null()).unwrap();
        assert!(mock.live_objects() > 0);

        overlay.destroy_frame_data();
        assert_eq!(mock.live_objects(), 0);
    }
}
