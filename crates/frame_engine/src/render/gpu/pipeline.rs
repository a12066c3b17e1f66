//! Graphics pipeline cache
//!
//! A [`GpuPipeline`] fixes the shader stages and vertex format of a program and
//! compiles one backend pipeline per distinct [`GraphicsState`] on demand.
//! Compiled pipelines live until the `GpuPipeline` is dropped.

use std::collections::HashMap;

use ash::vk;

use super::graphics_state::{GraphicsState, PipelineKey};
use crate::render::backends::vulkan::{
    GraphicsPipelineDesc, PipelineLayout, ShaderModule, ShaderStage, SharedDevice, VulkanError, VulkanResult,
};

/// Fixed part of a pipeline: shaders and vertex format
pub struct PipelineProgram {
    /// Shader modules and the stage each one runs in
    pub shaders: Vec<(vk::ShaderStageFlags, ShaderModule)>,
    /// Vertex buffer bindings
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    /// Vertex attributes
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
}

/// Program plus a cache of compiled pipelines keyed by graphics state
pub struct GpuPipeline {
    device: SharedDevice,
    layout: PipelineLayout,
    render_pass: vk::RenderPass,
    subpass: u32,
    // Keeps the modules alive for lazy compilation
    _shaders: Vec<ShaderModule>,
    stages: Vec<ShaderStage>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pipelines: HashMap<PipelineKey, vk::Pipeline>,
}

impl GpuPipeline {
    /// Create an empty cache for `program` rendering into `render_pass`
    pub fn new(
        device: SharedDevice,
        layout: PipelineLayout,
        render_pass: vk::RenderPass,
        subpass: u32,
        program: PipelineProgram,
    ) -> Self {
        let stages = program
            .shaders
            .iter()
            .map(|(stage, module)| ShaderStage {
                stage: *stage,
                module: module.handle(),
            })
            .collect();
        let shaders = program.shaders.into_iter().map(|(_, module)| module).collect();

        Self {
            device,
            layout,
            render_pass,
            subpass,
            _shaders: shaders,
            stages,
            vertex_bindings: program.vertex_bindings,
            vertex_attributes: program.vertex_attributes,
            pipelines: HashMap::new(),
        }
    }

    /// Make sure a pipeline exists for `state`, compiling it on first request
    pub fn resolve(&mut self, state: &GraphicsState) -> VulkanResult<PipelineKey> {
        let key = state.key();
        if self.pipelines.contains_key(&key) {
            return Ok(key);
        }

        let pipeline = self.device.create_graphics_pipeline(&GraphicsPipelineDesc {
            layout: self.layout.handle(),
            render_pass: self.render_pass,
            subpass: self.subpass,
            stages: &self.stages,
            vertex_bindings: &self.vertex_bindings,
            vertex_attributes: &self.vertex_attributes,
            state,
        })?;

        log::info!("Built pipeline {} ({} cached)", key, self.pipelines.len() + 1);
        self.pipelines.insert(key, pipeline);
        Ok(key)
    }

    /// Compiled pipeline for `key`, if resolved
    pub fn pipeline(&self, key: PipelineKey) -> Option<vk::Pipeline> {
        self.pipelines.get(&key).copied()
    }

    /// Record a bind of the pipeline for `key`
    ///
    /// Binding a key that was never resolved is a programming error.
    pub fn cmd_bind(&self, command_buffer: vk::CommandBuffer, key: PipelineKey) -> VulkanResult<()> {
        let pipeline = self
            .pipeline(key)
            .ok_or(VulkanError::PipelineNotResolved { key: key.raw() })?;
        self.device.cmd_bind_pipeline(command_buffer, pipeline);
        Ok(())
    }

    /// Pipeline layout shared by every cached pipeline
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }

    /// Number of compiled pipelines
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Whether nothing has been compiled yet
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

impl Drop for GpuPipeline {
    fn drop(&mut self) {
        for (_, pipeline) in self.pipelines.drain() {
            self.device.destroy_pipeline(pipeline);
        }
    }
}
