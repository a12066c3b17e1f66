//! GPU resource abstractions built on the backend seam

pub mod descriptor_set;
pub mod gpu_vector;
pub mod graphics_state;
pub mod pipeline;

pub use descriptor_set::{BindingKind, DescriptorPool, DescriptorSet, DescriptorSetLayout};
pub use gpu_vector::GpuVector;
pub use graphics_state::{
    CompareOp, CullMode, DepthState, GraphicsState, InputAssemblyState, PipelineKey, PolygonMode, PrimitiveTopology,
    RasterizationState, STATE_KEY_VERSION,
};
pub use pipeline::{GpuPipeline, PipelineProgram};
