//! Fixed-function graphics state
//!
//! A [`GraphicsState`] is the small set of settings that may change per draw
//! without recompiling shaders: topology, rasterization and depth testing. The
//! pipeline cache keys compiled pipelines by [`GraphicsState::key`], an explicit
//! packing of the enumerated fields rather than a hash of raw struct memory.

use ash::vk;
use serde::{Deserialize, Serialize};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Version tag stored in the top byte of every [`PipelineKey`]
pub const STATE_KEY_VERSION: u8 = 1;

macro_rules! flag_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal, $vk_type:ty {
            $($(#[$vmeta:meta])* $variant:ident = $bit:literal => $vk:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $bit),+
        }

        impl $name {
            /// Every value of this enumeration, in declaration order
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Raw flag value used in state keys
            pub const fn bits(self) -> u8 {
                self as u8
            }
        }

        impl TryFrom<u8> for $name {
            type Error = VulkanError;

            fn try_from(value: u8) -> VulkanResult<Self> {
                match value {
                    $($bit => Ok(Self::$variant),)+
                    _ => Err(VulkanError::InvalidGraphicsState { field: $field, value }),
                }
            }
        }

        impl $name {
            /// Backend equivalent of this value
            pub fn to_vk(self) -> $vk_type {
                match self {
                    $(Self::$variant => $vk),+
                }
            }
        }
    };
}

flag_enum! {
    /// Depth comparison operator
    CompareOp, "compare_op", vk::CompareOp {
        /// Never passes
        Never = 0x01 => vk::CompareOp::NEVER,
        /// Passes if incoming < stored
        Less = 0x02 => vk::CompareOp::LESS,
        /// Passes if incoming == stored
        Equal = 0x04 => vk::CompareOp::EQUAL,
        /// Passes if incoming <= stored
        LessOrEqual = 0x08 => vk::CompareOp::LESS_OR_EQUAL,
        /// Passes if incoming > stored
        Greater = 0x10 => vk::CompareOp::GREATER,
        /// Passes if incoming != stored
        NotEqual = 0x20 => vk::CompareOp::NOT_EQUAL,
        /// Passes if incoming >= stored
        GreaterOrEqual = 0x40 => vk::CompareOp::GREATER_OR_EQUAL,
        /// Always passes
        Always = 0x80 => vk::CompareOp::ALWAYS,
    }
}

flag_enum! {
    /// How vertices are assembled into primitives
    PrimitiveTopology, "primitive_topology", vk::PrimitiveTopology {
        /// Independent points
        PointList = 0x01 => vk::PrimitiveTopology::POINT_LIST,
        /// Independent line segments
        LineList = 0x02 => vk::PrimitiveTopology::LINE_LIST,
        /// Connected line segments
        LineStrip = 0x04 => vk::PrimitiveTopology::LINE_STRIP,
        /// Independent triangles
        TriangleList = 0x08 => vk::PrimitiveTopology::TRIANGLE_LIST,
        /// Connected triangle strip
        TriangleStrip = 0x10 => vk::PrimitiveTopology::TRIANGLE_STRIP,
        /// Triangle fan around the first vertex
        TriangleFan = 0x20 => vk::PrimitiveTopology::TRIANGLE_FAN,
    }
}

flag_enum! {
    /// Polygon fill mode
    PolygonMode, "polygon_mode", vk::PolygonMode {
        /// Filled polygons
        Fill = 0x01 => vk::PolygonMode::FILL,
        /// Wireframe
        Line = 0x02 => vk::PolygonMode::LINE,
        /// Vertices only
        Point = 0x04 => vk::PolygonMode::POINT,
    }
}

flag_enum! {
    /// Face culling
    CullMode, "cull_mode", vk::CullModeFlags {
        /// No culling
        None = 0x01 => vk::CullModeFlags::NONE,
        /// Cull front faces
        Front = 0x02 => vk::CullModeFlags::FRONT,
        /// Cull back faces
        Back = 0x04 => vk::CullModeFlags::BACK,
        /// Cull everything
        Both = 0x08 => vk::CullModeFlags::FRONT_AND_BACK,
    }
}

/// Primitive assembly settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputAssemblyState {
    /// Primitive topology
    pub primitive_topology: PrimitiveTopology,
    /// Whether a special index restarts strips and fans
    pub primitive_restart_enable: bool,
}

/// Rasterizer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RasterizationState {
    /// Fill mode
    pub polygon_mode: PolygonMode,
    /// Culling mode
    pub cull_mode: CullMode,
}

/// Depth test settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepthState {
    /// Enable the depth test
    pub test_enable: bool,
    /// Enable depth writes
    pub write_enable: bool,
    /// Comparison used by the depth test
    pub compare_op: CompareOp,
}

/// Per-draw fixed-function state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphicsState {
    /// Input assembly
    pub input_assembly_state: InputAssemblyState,
    /// Rasterization
    pub rasterization_state: RasterizationState,
    /// Depth
    pub depth_state: DepthState,
}

/// Cache key for a [`GraphicsState`]
///
/// Each enumerated field occupies its own byte below a version tag, so distinct
/// states always produce distinct keys and padding never leaks into the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineKey(u64);

impl PipelineKey {
    /// Raw 64-bit value
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PipelineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl GraphicsState {
    /// Filled, back-face culled triangles with a less-than depth test
    pub const fn opaque() -> Self {
        Self {
            input_assembly_state: InputAssemblyState {
                primitive_topology: PrimitiveTopology::TriangleList,
                primitive_restart_enable: false,
            },
            rasterization_state: RasterizationState {
                polygon_mode: PolygonMode::Fill,
                cull_mode: CullMode::Back,
            },
            depth_state: DepthState {
                test_enable: true,
                write_enable: true,
                compare_op: CompareOp::Less,
            },
        }
    }

    /// Set the primitive topology
    pub const fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.input_assembly_state.primitive_topology = topology;
        self
    }

    /// Set the polygon mode (e.g. wireframe)
    pub const fn with_polygon_mode(mut self, mode: PolygonMode) -> Self {
        self.rasterization_state.polygon_mode = mode;
        self
    }

    /// Set the cull mode
    pub const fn with_cull_mode(mut self, mode: CullMode) -> Self {
        self.rasterization_state.cull_mode = mode;
        self
    }

    /// Configure depth testing
    pub const fn with_depth(mut self, test_enable: bool, write_enable: bool, compare_op: CompareOp) -> Self {
        self.depth_state = DepthState {
            test_enable,
            write_enable,
            compare_op,
        };
        self
    }

    /// Pack the state into its cache key
    pub const fn key(&self) -> PipelineKey {
        let ia = &self.input_assembly_state;
        let rs = &self.rasterization_state;
        let ds = &self.depth_state;

        PipelineKey(
            (STATE_KEY_VERSION as u64) << 56
                | (ia.primitive_topology.bits() as u64) << 48
                | (ia.primitive_restart_enable as u64) << 40
                | (rs.polygon_mode.bits() as u64) << 32
                | (rs.cull_mode.bits() as u64) << 24
                | (ds.test_enable as u64) << 16
                | (ds.write_enable as u64) << 8
                | ds.compare_op.bits() as u64,
        )
    }

    /// Decode raw flag bytes, in field declaration order
    ///
    /// Boolean flags use 0x01 for false and 0x02 for true.
    pub fn from_raw(raw: [u8; 7]) -> VulkanResult<Self> {
        let flag = |field: &'static str, value: u8| match value {
            0x01 => Ok(false),
            0x02 => Ok(true),
            _ => Err(VulkanError::InvalidGraphicsState { field, value }),
        };

        Ok(Self {
            input_assembly_state: InputAssemblyState {
                primitive_topology: PrimitiveTopology::try_from(raw[0])?,
                primitive_restart_enable: flag("primitive_restart_enable", raw[1])?,
            },
            rasterization_state: RasterizationState {
                polygon_mode: PolygonMode::try_from(raw[2])?,
                cull_mode: CullMode::try_from(raw[3])?,
            },
            depth_state: DepthState {
                test_enable: flag("test_enable", raw[4])?,
                write_enable: flag("write_enable", raw[5])?,
                compare_op: CompareOp::try_from(raw[6])?,
            },
        })
    }

    /// Every valid state, for exhaustive testing and warm-up
    pub fn enumerate() -> impl Iterator<Item = Self> {
        PrimitiveTopology::ALL.iter().flat_map(|&primitive_topology| {
            [false, true].into_iter().flat_map(move |primitive_restart_enable| {
                PolygonMode::ALL.iter().flat_map(move |&polygon_mode| {
                    CullMode::ALL.iter().flat_map(move |&cull_mode| {
                        [false, true].into_iter().flat_map(move |test_enable| {
                            [false, true].into_iter().flat_map(move |write_enable| {
                                CompareOp::ALL.iter().map(move |&compare_op| Self {
                                    input_assembly_state: InputAssemblyState {
                                        primitive_topology,
                                        primitive_restart_enable,
                                    },
                                    rasterization_state: RasterizationState {
                                        polygon_mode,
                                        cull_mode,
                                    },
                                    depth_state: DepthState {
                                        test_enable,
                                        write_enable,
                                        compare_op,
                                    },
                                })
                            })
                        })
                    })
                })
            })
        })
    }
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self::opaque()
    }
}
