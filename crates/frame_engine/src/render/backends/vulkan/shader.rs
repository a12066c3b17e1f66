//! Shader modules and pipeline layouts
//!
//! SPIR-V loading and the layout object pipelines are compiled against, both
//! following the same RAII pattern as the sync wrappers.

use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use ash::vk;

use super::{SharedDevice, VulkanError, VulkanResult};

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: SharedDevice,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    pub fn from_bytes(device: SharedDevice, bytes: &[u8]) -> VulkanResult<Self> {
        let code = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| VulkanError::InvalidOperation {
            reason: format!("Invalid SPIR-V bytecode: {}", e),
        })?;
        Self::from_words(device, &code)
    }

    /// Create shader module from SPIR-V words
    pub fn from_words(device: SharedDevice, code: &[u32]) -> VulkanResult<Self> {
        let module = device.create_shader_module(code)?;
        Ok(Self { device, module })
    }

    /// Load shader from SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: SharedDevice, path: P) -> VulkanResult<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| VulkanError::InvalidOperation {
            reason: format!("Failed to open shader file {}: {}", path.display(), e),
        })?;
        let code = ash::util::read_spv(&mut file).map_err(|e| VulkanError::InvalidOperation {
            reason: format!("Failed to read shader file {}: {}", path.display(), e),
        })?;
        Self::from_words(device, &code)
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        self.device.destroy_shader_module(self.module);
    }
}

/// Pipeline layout wrapper with RAII cleanup
pub struct PipelineLayout {
    device: SharedDevice,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Create a pipeline layout over the given set layouts
    pub fn new(
        device: SharedDevice,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> VulkanResult<Self> {
        let layout = device.create_pipeline_layout(set_layouts, push_constants)?;
        Ok(Self { device, layout })
    }

    /// Get the pipeline layout handle
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        self.device.destroy_pipeline_layout(self.layout);
    }
}
